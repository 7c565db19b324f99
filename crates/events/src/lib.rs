//! Structured operator events
//!
//! Feed drivers raise events for conditions an operator should see but
//! that are not errors, such as a firehose feed showing a gap between
//! polls. Events flow through a [`Handler`] that applies a configurable
//! [`Filter`] before forwarding to a [`Sink`].

mod filter;
mod handler;
mod sink;

pub use filter::Filter;
pub use handler::Handler;
pub use sink::{LoggingSink, Sink, SinkError, LOGGING_SINK_TYPE};

/// Event type identifier for lossy-feed alerts.
pub const LOSSY_FEED_EVENT_TYPE: &str = "LOSSY_FEED";

/// Component identifier for the feeds subsystem.
pub const FEEDS_COMPONENT: &str = "Feeds";

/// A structured event raised by a component.
pub trait Event: Send + Sync {
    /// The subsystem that raised the event, e.g. [`FEEDS_COMPONENT`].
    fn component(&self) -> &str;
    /// The event kind, e.g. [`LOSSY_FEED_EVENT_TYPE`].
    fn event_type(&self) -> &str;
    /// Human-readable description for the operator.
    fn message(&self) -> String;
}

/// Raised when consecutive polls of a firehose feed show no overlap,
/// meaning releases fell between the polls and were lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossyFeedEvent {
    pub feed: String,
}

impl Event for LossyFeedEvent {
    fn component(&self) -> &str {
        FEEDS_COMPONENT
    }

    fn event_type(&self) -> &str {
        LOSSY_FEED_EVENT_TYPE
    }

    fn message(&self) -> String {
        format!(
            "detected potential missing package data when polling {} feed",
            self.feed
        )
    }
}
