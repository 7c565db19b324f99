//! Gap detection for firehose feeds
//!
//! Firehose endpoints return a bounded window of recent releases with no
//! `since` parameter, so a busy enough registry can publish more than one
//! window between two polls. Consecutive polls of a healthy feed overlap:
//! the oldest entry of the new poll is at or before the newest entry of
//! the previous one. When that overlap disappears, releases were missed
//! and an operator event is raised.
//!
//! Feeds polled with a timestamp cursor, and any poll in named-packages
//! mode, never consult the detector.

use dashmap::DashMap;
use tracing::error;

use feedstock_events::{Handler, LossyFeedEvent};
use feedstock_types::{sort_packages_desc, Package};

/// Tracks the previous poll per feed and raises [`LossyFeedEvent`] on
/// non-overlap.
pub struct LossyFeedDetector {
    previous: DashMap<String, Vec<Package>>,
    handler: Handler,
}

impl LossyFeedDetector {
    pub fn new(handler: Handler) -> Self {
        Self {
            previous: DashMap::new(),
            handler,
        }
    }

    /// Compares a freshly polled window against the previous one and
    /// stores a sorted copy for the next comparison.
    pub fn process(&self, feed: &str, packages: &[Package]) {
        let mut latest = packages.to_vec();
        sort_packages_desc(&mut latest);

        let gap = {
            let previous = self.previous.get(feed);
            match previous.as_deref() {
                Some(previous) if !previous.is_empty() && !latest.is_empty() => {
                    !windows_overlap(&latest, previous)
                }
                _ => false,
            }
        };

        if gap {
            let event = LossyFeedEvent {
                feed: feed.to_string(),
            };
            if let Err(err) = self.handler.dispatch(&event) {
                error!(feed, error = %err, "failed to dispatch event via event handler");
            }
        }

        self.previous.insert(feed.to_string(), latest);
    }
}

/// Both slices are sorted most-recent-first and non-empty. Overlap holds
/// when the newest previously-seen release is at or after the oldest
/// newly-seen one.
fn windows_overlap(latest: &[Package], previous: &[Package]) -> bool {
    let oldest_latest = &latest[latest.len() - 1];
    let newest_previous = &previous[0];
    newest_previous.created_date >= oldest_latest.created_date
}
