//! HTTP POST publisher
//!
//! One POST per message to a configured endpoint. Any 2xx status counts
//! as delivered; everything else is a failure for that one message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PublishError, Publisher};

pub const PUBLISHER_TYPE: &str = "http-client";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpPublisherConfig {
    pub url: String,
}

pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn from_config(config: HttpPublisherConfig) -> Self {
        Self::new(config.url)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn send(&self, body: &[u8]) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::UnsuccessfulRequest { status });
        }
        debug!(url = %self.url, "delivered message to http endpoint");
        Ok(())
    }

    fn name(&self) -> &'static str {
        PUBLISHER_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{routing::post, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_each_message_body() {
        let received = Arc::new(AtomicU32::new(0));
        let counter = received.clone();
        let router = Router::new().route(
            "/ingest",
            post(move |body: String| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(body, r#"{"name":"serde"}"#);
                    StatusCode::OK
                }
            }),
        );
        let base = spawn(router).await;

        let publisher = HttpPublisher::new(format!("{base}/ingest"));
        publisher.send(br#"{"name":"serde"}"#).await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_delivery_failure() {
        let router = Router::new().route(
            "/ingest",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn(router).await;

        let publisher = HttpPublisher::new(format!("{base}/ingest"));
        let err = publisher.send(b"{}").await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::UnsuccessfulRequest { status } if status.as_u16() == 500
        ));
    }
}
