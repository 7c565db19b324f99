//! Event sinks

use thiserror::Error;
use tracing::warn;

use crate::Event;

/// Sink type identifier for the logging sink.
pub const LOGGING_SINK_TYPE: &str = "stdout";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to deliver event: {0}")]
    Delivery(String),
}

/// Receives events that passed the handler's filter.
pub trait Sink: Send + Sync {
    fn add_event(&self, event: &dyn Event) -> Result<(), SinkError>;
}

/// Sink that records events as WARN-level log lines with `component`
/// and `event_type` fields.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl LoggingSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for LoggingSink {
    fn add_event(&self, event: &dyn Event) -> Result<(), SinkError> {
        warn!(
            event_type = event.event_type(),
            component = event.component(),
            "{}",
            event.message()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LossyFeedEvent;

    #[test]
    fn logging_sink_never_fails() {
        let sink = LoggingSink::new();
        let event = LossyFeedEvent {
            feed: "crates".to_string(),
        };
        assert!(sink.add_event(&event).is_ok());
    }
}
