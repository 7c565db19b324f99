//! Per-feed configuration options

use serde::{Deserialize, Serialize};

/// Options recognized by every feed driver.
///
/// Deserialization is strict so a typo in a config file fails at startup
/// rather than silently polling the wrong thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedOptions {
    /// Specific package names to poll instead of the firehose. Not
    /// supported by every feed.
    #[serde(default)]
    pub packages: Option<Vec<String>>,

    /// Per-feed polling schedule as a duration string, e.g. `"2m"`.
    /// Empty means the feed follows the global schedule.
    #[serde(default)]
    pub poll_rate: String,
}

impl FeedOptions {
    /// True when the feed is configured to poll a fixed package list.
    pub fn has_packages(&self) -> bool {
        self.packages.is_some()
    }
}
