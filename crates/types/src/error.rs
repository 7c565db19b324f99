//! Error taxonomy shared by the feed drivers

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Failures a feed driver can report.
///
/// Only `UnsupportedOption` is fatal, and only at startup. Everything
/// else is collected per poll, logged, and retried naturally on the next
/// tick because a failed poll never advances the watermark.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The feed does not support the requested configuration option,
    /// e.g. a `packages` list supplied to a firehose-only registry.
    #[error("unsupported option `{option}` supplied to {feed} feed")]
    UnsupportedOption { feed: &'static str, option: &'static str },

    /// The feed cannot poll without an explicit package list.
    #[error("{feed} feed requires packages to be configured as a feed option")]
    PackagesRequired { feed: &'static str },

    /// Polling one specific package failed; other packages in the same
    /// tick continue.
    #[error("polling for package {name} returned error: {source}")]
    PackagePoll {
        name: String,
        #[source]
        source: Box<FeedError>,
    },

    /// Every request in the poll failed. The cutoff is preserved so the
    /// next tick retries the same window.
    #[error("no packages were successfully polled")]
    NoPackagesPolled,

    /// The registry answered outside the 2xx range.
    #[error("unsuccessful request: {status}")]
    UnsuccessfulRequest { status: StatusCode },

    /// Transport-level HTTP failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry returned a body the driver could not decode.
    #[error("failed to decode {feed} response: {message}")]
    Decode { feed: &'static str, message: String },

    /// The registry rate-limited us past the driver's retry budget.
    #[error("maximum retries reached due to rate limiting")]
    MaxRetriesReached,
}

impl FeedError {
    /// Wraps a failure with the package name it occurred for.
    pub fn for_package(name: impl Into<String>, source: FeedError) -> Self {
        FeedError::PackagePoll {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Shorthand for a body-decoding failure.
    pub fn decode(feed: &'static str, err: impl std::fmt::Display) -> Self {
        FeedError::Decode {
            feed,
            message: err.to_string(),
        }
    }
}
