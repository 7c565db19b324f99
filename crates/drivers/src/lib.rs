//! Registry feed drivers
//!
//! Each driver polls one package registry and converts its wire format
//! into normalized [`Package`] records. The scheduling engine treats all
//! drivers uniformly through the [`FeedDriver`] trait: hand in a cutoff,
//! get back newer packages, an advanced cutoff, and any partial
//! failures.
//!
//! Firehose registries (bounded recent-updates endpoints without a
//! `since` parameter) additionally run their results through the
//! [`LossyFeedDetector`] so operators hear about gaps between polls.

pub mod crates_io;
pub mod github;
pub mod goproxy;
mod http;
pub mod lossy;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod packagist;
pub mod pypi;
pub mod pypi_artifacts;
pub mod rubygems;
#[cfg(test)]
mod testing;
mod xml;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feedstock_types::{FeedError, FeedOptions, Package};

pub use http::DEFAULT_USER_AGENT;
pub use lossy::LossyFeedDetector;
pub use xml::sanitize_xml;

/// Outcome of one poll of one feed.
#[derive(Debug, Default)]
pub struct PollResult {
    /// Newly observed packages, sorted by `created_date` descending.
    pub packages: Vec<Package>,
    /// The watermark to use for the next poll. Never earlier than the
    /// cutoff the poll was given.
    pub new_cutoff: DateTime<Utc>,
    /// Partial failures. A non-empty list does not invalidate
    /// `packages`; fully failed polls leave `packages` empty and
    /// `new_cutoff` untouched.
    pub errors: Vec<FeedError>,
}

impl PollResult {
    pub fn new(packages: Vec<Package>, new_cutoff: DateTime<Utc>, errors: Vec<FeedError>) -> Self {
        Self {
            packages,
            new_cutoff,
            errors,
        }
    }

    /// A poll in which nothing was retrieved; the cutoff is preserved so
    /// the next tick retries the same window.
    pub fn failure(cutoff: DateTime<Utc>, errors: Vec<FeedError>) -> Self {
        Self {
            packages: Vec::new(),
            new_cutoff: cutoff,
            errors,
        }
    }
}

/// A polling capability over one registry.
#[async_trait]
pub trait FeedDriver: Send + Sync {
    /// Polls the registry for packages released after `cutoff`.
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult;

    /// Stable feed identifier, used as `Package::feed` and as the
    /// detector key.
    fn name(&self) -> &'static str;

    /// The options this driver was configured with.
    fn options(&self) -> &FeedOptions;
}
