//! Shared HTTP client construction and response checks

use std::time::Duration;

use feedstock_types::FeedError;

/// User agent sent with every registry request.
pub const DEFAULT_USER_AGENT: &str =
    concat!("feedstock/", env!("CARGO_PKG_VERSION"), " (package release monitor)");

/// Timeout for small metadata endpoints.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the client used by most drivers: 10 s absolute timeout and the
/// shared user agent.
pub fn default_client() -> Result<reqwest::Client, FeedError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .map_err(FeedError::from)
}

/// Rejects responses outside the 2xx range.
pub fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FeedError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::UnsuccessfulRequest { status });
    }
    Ok(response)
}
