//! HTTP trigger surface
//!
//! `GET /` polls every HTTP-reachable group in parallel and reports the
//! aggregate outcome; `GET /healthz` is a liveness probe. Group
//! invocations serialize on each group's own lock, so concurrent
//! requests cannot overlap a group with itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::future::join_all;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::group::FeedGroup;
use crate::scheduler::SchedulerError;

type Groups = Arc<Vec<Arc<FeedGroup>>>;

pub(crate) async fn serve(groups: Vec<Arc<FeedGroup>>, port: u16) -> Result<(), SchedulerError> {
    let feeds: Vec<&str> = groups
        .iter()
        .flat_map(|group| group.feed_names().iter().copied())
        .collect();
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, feeds = %feeds.join(", "), "listening for poll requests");
    axum::serve(listener, router(groups)).await?;
    Ok(())
}

pub(crate) fn router(groups: Vec<Arc<FeedGroup>>) -> Router {
    Router::new()
        .route("/", get(poll_groups))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(groups))
}

/// Dispatches every group and aggregates counts and error strings.
async fn poll_groups(State(groups): State<Groups>) -> Response {
    let results = join_all(groups.iter().map(|group| group.poll_and_publish())).await;

    let mut num_published = 0;
    let mut errors = Vec::new();
    for result in results {
        num_published += result.num_published;
        errors.extend(result.error_strings());
    }

    if errors.is_empty() {
        return format!("{num_published} packages processed").into_response();
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!(
            "{}\n{num_published} packages processed, see log for details",
            errors.join("\n")
        ),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
