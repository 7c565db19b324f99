//! Downstream publishers
//!
//! A publisher hands one serialized package record at a time to a
//! message bus or sink. Delivery is at-least-once and unordered;
//! backpressure is expressed by `send` blocking until the backend
//! acknowledges. Publishers never retry internally beyond what their
//! client library already does, and they must be safe for concurrent
//! `send` calls because every feed group shares one instance.

mod gcp_pubsub;
mod http;
mod kafka;
mod stdout;

use async_trait::async_trait;
use thiserror::Error;

pub use gcp_pubsub::{GcpPubSubConfig, GcpPubSubPublisher};
pub use http::{HttpPublisher, HttpPublisherConfig};
pub use kafka::{KafkaConfig, KafkaPublisher};
pub use stdout::StdoutPublisher;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publisher configuration error: {0}")]
    Config(String),

    #[error("failed to deliver message: {0}")]
    Delivery(String),

    #[error("HTTP request failed with status code: {status}")]
    UnsuccessfulRequest { status: reqwest::StatusCode },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// At-least-once hand-off to a downstream bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Delivers one message body, blocking until the backend
    /// acknowledges it or the attempt fails permanently.
    async fn send(&self, body: &[u8]) -> Result<(), PublishError>;

    /// Stable backend identifier, e.g. `"kafka"`.
    fn name(&self) -> &'static str;
}
