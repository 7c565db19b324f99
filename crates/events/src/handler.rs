//! Event handler

use std::sync::Arc;

use crate::{Event, Filter, Sink, SinkError};

/// Routes events to a sink through a filter.
///
/// A handler without a sink drops every event, which is the default for
/// deployments that have not opted into operator alerts.
#[derive(Clone, Default)]
pub struct Handler {
    sink: Option<Arc<dyn Sink>>,
    filter: Filter,
}

impl Handler {
    pub fn new(sink: Arc<dyn Sink>, filter: Filter) -> Self {
        Self {
            sink: Some(sink),
            filter,
        }
    }

    /// A handler that discards every event.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Forwards `event` to the sink if the filter admits it.
    pub fn dispatch(&self, event: &dyn Event) -> Result<(), SinkError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        if self.filter.should_dispatch(event) {
            return sink.add_event(event);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("sink", &self.sink.is_some())
            .field("filter", &self.filter)
            .finish()
    }
}
