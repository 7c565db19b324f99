//! npm registry feed
//!
//! Two modes:
//!
//! - **Firehose**: fetch the recent-updates RSS, then one registry
//!   request per unique package title to recover version/timestamp
//!   detail, capped to the number of RSS events for that package.
//!   Results run through the lossy detector.
//! - **Named**: one registry request per configured package name.
//!
//! Both modes fan out over a fixed pool of 10 concurrent requests on an
//! HTTP/1.1-only client; HTTP/2 flow control consistently underperforms
//! for the large concurrent responses this feed produces.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;

use feedstock_events::Handler;
use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, DEFAULT_USER_AGENT};
use crate::lossy::LossyFeedDetector;
use crate::xml::sanitize_xml;
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "npm";

const RSS_PATH: &str = "/-/rss";

// Values above ~420 make the feed consistently fail to return data, and
// lower values sometimes fail too. 200 has been reliable in practice.
// TODO: revisit once the registry documents the actual limit semantics.
const RSS_LIMIT: u32 = 200;

/// Concurrent registry requests allowed at any one time.
const FETCH_WORKERS: usize = 10;

const FETCH_TIMEOUT: Duration = Duration::from_secs(45);

/// Failure modes of a per-package fetch. Unpublished packages are not
/// errors on the firehose path, so they stay distinguishable.
enum FetchError {
    Unpublished,
    Feed(FeedError),
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: String,
}

/// Only the `time` map is of interest: it carries every version's
/// publication timestamp, oldest to newest, and parsing nothing else
/// keeps the large registry responses cheap.
#[derive(Debug, Deserialize)]
struct PackageDetails {
    #[serde(default)]
    time: HashMap<String, serde_json::Value>,
}

pub struct NpmDriver {
    client: reqwest::Client,
    base_url: String,
    packages: Option<Vec<String>>,
    detector: LossyFeedDetector,
    options: FeedOptions,
}

impl NpmDriver {
    pub fn new(options: FeedOptions, event_handler: Handler) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .http1_only()
            .pool_max_idle_per_host(FETCH_WORKERS)
            .timeout(FETCH_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: "https://registry.npmjs.org".to_string(),
            packages: options.packages.clone(),
            detector: LossyFeedDetector::new(event_handler),
            options,
        })
    }

    /// Fetches the RSS feed and returns the package title of every event.
    async fn fetch_package_events(&self) -> Result<Vec<String>, FeedError> {
        let url = format!("{}{RSS_PATH}", self.base_url);
        let response = check_status(
            self.client
                .get(&url)
                .query(&[("limit", RSS_LIMIT)])
                .send()
                .await?,
        )?;
        let body = response.bytes().await?;
        let rss: Rss = quick_xml::de::from_str(&sanitize_xml(&body))
            .map_err(|err| FeedError::decode(FEED_NAME, err))?;
        Ok(rss.channel.items.into_iter().map(|item| item.title).collect())
    }

    /// Fetches one package's version history, most recent first.
    async fn fetch_package(&self, title: &str) -> Result<Vec<Package>, FetchError> {
        let url = format!("{}/{title}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::Feed(err.into()))?;
        let response = check_status(response).map_err(FetchError::Feed)?;
        let details: PackageDetails = response
            .json()
            .await
            .map_err(|err| FetchError::Feed(FeedError::decode(FEED_NAME, err)))?;

        let mut times = details.time;

        // An `unpublished` entry means the package was entirely removed;
        // the events observed in the RSS window refer to versions that no
        // longer exist.
        if times.contains_key("unpublished") {
            return Err(FetchError::Unpublished);
        }
        times.remove("created");
        times.remove("modified");

        let mut versions = Vec::with_capacity(times.len());
        for (version, timestamp) in times {
            let timestamp = timestamp
                .as_str()
                .ok_or_else(|| {
                    FetchError::Feed(FeedError::decode(FEED_NAME, "non-string version timestamp"))
                })?
                .to_string();
            let created = timestamp
                .parse::<DateTime<Utc>>()
                .map_err(|err| FetchError::Feed(FeedError::decode(FEED_NAME, err)))?;
            versions.push(Package::new(created, title, version, FEED_NAME));
        }
        sort_packages_desc(&mut versions);
        Ok(versions)
    }

    async fn fetch_all_packages(&self) -> (Vec<Package>, Vec<FeedError>) {
        let mut pkgs = Vec::new();
        let mut errs = Vec::new();

        let titles = match self.fetch_package_events().await {
            Ok(titles) => titles,
            Err(err) => return (pkgs, vec![err]),
        };

        // The polled window can contain several releases of the same
        // package; fetch each package once and keep that many versions.
        let mut unique: HashMap<String, usize> = HashMap::new();
        for title in titles {
            *unique.entry(title).or_default() += 1;
        }

        let mut fetches = stream::iter(unique)
            .map(|(title, count)| async move {
                let result = self.fetch_package(&title).await;
                (title, count, result)
            })
            .buffer_unordered(FETCH_WORKERS);

        while let Some((title, count, result)) = fetches.next().await {
            match result {
                Ok(mut versions) => {
                    // Guard against versions unpublished between the RSS
                    // fetch and the package fetch: keep at most as many
                    // versions as events were observed.
                    versions.truncate(count);
                    pkgs.extend(versions);
                }
                // Unpublished packages are expected churn on the
                // firehose and carry nothing to report.
                Err(FetchError::Unpublished) => {}
                Err(FetchError::Feed(err)) => {
                    errs.push(FeedError::for_package(title, err));
                }
            }
        }

        (pkgs, errs)
    }

    async fn fetch_critical_packages(&self, packages: &[String]) -> (Vec<Package>, Vec<FeedError>) {
        let mut pkgs = Vec::new();
        let mut errs = Vec::new();

        let mut fetches = stream::iter(packages.iter().cloned())
            .map(|title| async move {
                let result = self.fetch_package(&title).await;
                (title, result)
            })
            .buffer_unordered(FETCH_WORKERS);

        while let Some((title, result)) = fetches.next().await {
            match result {
                Ok(versions) => pkgs.extend(versions),
                // For explicitly watched packages an unpublish is worth
                // surfacing.
                Err(FetchError::Unpublished) => errs.push(FeedError::decode(
                    FEED_NAME,
                    format!("{title} is currently unpublished"),
                )),
                Err(FetchError::Feed(err)) => errs.push(FeedError::for_package(title, err)),
            }
        }

        (pkgs, errs)
    }
}

#[async_trait]
impl FeedDriver for NpmDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let (mut pkgs, mut errs) = match &self.packages {
            None => self.fetch_all_packages().await,
            Some(packages) => self.fetch_critical_packages(packages).await,
        };

        if pkgs.is_empty() {
            errs.push(FeedError::NoPackagesPolled);
            return PollResult::failure(cutoff, errs);
        }

        // Fetch concurrency is not deterministic.
        sort_packages_desc(&mut pkgs);

        if self.packages.is_none() {
            self.detector.process(FEED_NAME, &pkgs);
        }

        let new_cutoff = find_cutoff(cutoff, &pkgs);
        let pkgs = apply_cutoff(pkgs, cutoff);
        PollResult::new(pkgs, new_cutoff, errs)
    }

    fn name(&self) -> &'static str {
        FEED_NAME
    }

    fn options(&self) -> &FeedOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_server;
    use axum::http::StatusCode;
    use axum::{routing::get, Router};
    use chrono::TimeZone;

    const RSS_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>npm recent updates</title>
    <item><title>left-pad</title></item>
    <item><title>left-pad</title></item>
    <item><title>chalk</title></item>
  </channel>
</rss>"#;

    const LEFT_PAD_BODY: &str = r#"{
        "name": "left-pad",
        "time": {
            "created": "2024-04-01T00:00:00.000Z",
            "modified": "2024-05-01T10:30:00.000Z",
            "1.0.0": "2024-04-01T00:00:00.000Z",
            "1.1.0": "2024-05-01T10:10:00.000Z",
            "1.2.0": "2024-05-01T10:30:00.000Z"
        }
    }"#;

    const CHALK_BODY: &str = r#"{
        "name": "chalk",
        "time": {
            "created": "2024-03-01T00:00:00.000Z",
            "modified": "2024-05-01T10:20:00.000Z",
            "5.3.1": "2024-05-01T10:20:00.000Z"
        }
    }"#;

    const UNPUBLISHED_BODY: &str = r#"{
        "name": "gone",
        "time": {
            "created": "2024-01-01T00:00:00.000Z",
            "unpublished": {"time": "2024-05-01T00:00:00.000Z"}
        }
    }"#;

    fn driver(base: String, packages: Option<Vec<String>>) -> NpmDriver {
        let options = FeedOptions {
            packages,
            poll_rate: String::new(),
        };
        let mut driver = NpmDriver::new(options, Handler::null()).unwrap();
        driver.base_url = base;
        driver
    }

    fn firehose_router() -> Router {
        Router::new()
            .route(RSS_PATH, get(|| async { RSS_BODY }))
            .route("/left-pad", get(|| async { LEFT_PAD_BODY }))
            .route("/chalk", get(|| async { CHALK_BODY }))
    }

    #[tokio::test]
    async fn firehose_caps_versions_to_rss_event_count() {
        let base = spawn_server(firehose_router()).await;
        let driver = driver(base, None);

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        // left-pad appeared twice in the RSS, so its two most recent
        // versions are kept; chalk appeared once.
        assert_eq!(result.packages.len(), 3);
        assert_eq!(result.packages[0].version, "1.2.0");
        assert_eq!(result.packages[1].version, "5.3.1");
        assert_eq!(result.packages[2].version, "1.1.0");
        assert_eq!(
            result.new_cutoff,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn firehose_skips_unpublished_packages_silently() {
        let router = Router::new()
            .route(
                RSS_PATH,
                get(|| async {
                    r#"<rss><channel>
                        <item><title>gone</title></item>
                        <item><title>chalk</title></item>
                    </channel></rss>"#
                }),
            )
            .route("/gone", get(|| async { UNPUBLISHED_BODY }))
            .route("/chalk", get(|| async { CHALK_BODY }));
        let base = spawn_server(router).await;
        let driver = driver(base, None);

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.errors.is_empty());
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].name, "chalk");
    }

    #[tokio::test]
    async fn named_mode_reports_missing_package_and_keeps_the_rest() {
        let router = Router::new()
            .route("/chalk", get(|| async { CHALK_BODY }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let base = spawn_server(router).await;
        let driver = driver(
            base,
            Some(vec!["chalk".to_string(), "missing".to_string()]),
        );

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].name, "chalk");
        assert_eq!(result.errors.len(), 1);
        let message = result.errors[0].to_string();
        assert!(message.contains("missing"), "{message}");
        assert!(matches!(result.errors[0], FeedError::PackagePoll { .. }));
    }

    #[tokio::test]
    async fn named_mode_surfaces_unpublished_packages() {
        let router = Router::new()
            .route("/gone", get(|| async { UNPUBLISHED_BODY }))
            .route("/chalk", get(|| async { CHALK_BODY }));
        let base = spawn_server(router).await;
        let driver = driver(base, Some(vec!["gone".to_string(), "chalk".to_string()]));

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].to_string().contains("unpublished"));
    }

    #[tokio::test]
    async fn total_failure_reports_no_packages_polled() {
        let router = Router::new().route(RSS_PATH, get(|| async { StatusCode::BAD_GATEWAY }));
        let base = spawn_server(router).await;
        let driver = driver(base, None);

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.packages.is_empty());
        assert_eq!(result.new_cutoff, cutoff);
        assert!(result
            .errors
            .iter()
            .any(|err| matches!(err, FeedError::NoPackagesPolled)));
    }
}
