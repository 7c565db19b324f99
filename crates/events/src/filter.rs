//! Event filtering

use serde::{Deserialize, Serialize};

use crate::Event;

/// Decides which events reach the configured sink.
///
/// Rules are applied in order: enabled components turn dispatch on,
/// enabled event types turn it on, disabled event types turn it off.
/// A disable therefore always wins over an enable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    #[serde(default)]
    pub enabled_event_types: Vec<String>,
    #[serde(default)]
    pub disabled_event_types: Vec<String>,
    #[serde(default)]
    pub enabled_components: Vec<String>,
}

impl Filter {
    pub fn new(
        enabled_event_types: Vec<String>,
        disabled_event_types: Vec<String>,
        enabled_components: Vec<String>,
    ) -> Self {
        Self {
            enabled_event_types,
            disabled_event_types,
            enabled_components,
        }
    }

    /// Whether `event` should be forwarded to the sink.
    pub fn should_dispatch(&self, event: &dyn Event) -> bool {
        let mut dispatch = false;

        if contains(&self.enabled_components, event.component()) {
            dispatch = true;
        }
        if contains(&self.enabled_event_types, event.event_type()) {
            dispatch = true;
        }
        if contains(&self.disabled_event_types, event.event_type()) {
            dispatch = false;
        }

        dispatch
    }
}

fn contains(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s == needle)
}
