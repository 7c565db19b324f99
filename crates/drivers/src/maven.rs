//! Maven Central feed
//!
//! Pages through the Sonatype browse API ordered by publish date,
//! newest first, and stops at the first component at or before the
//! cutoff. The API rate-limits aggressively, so requests retry on 429
//! with a fixed delay. Firehose-only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "maven-central";

const INDEX_PATH: &str = "/api/internal/browse/components";
const PAGE_SIZE: u32 = 20;
const MAX_RETRIES: usize = 5;

#[derive(Debug, Deserialize)]
struct BrowseResponse {
    components: Vec<Component>,
}

#[derive(Debug, Deserialize)]
struct Component {
    name: String,
    namespace: String,
    #[serde(rename = "latestVersionInfo")]
    latest_version: LatestVersionInfo,
}

#[derive(Debug, Deserialize)]
struct LatestVersionInfo {
    version: String,
    #[serde(rename = "timestampUnixWithMS")]
    timestamp_unix_ms: i64,
}

pub struct MavenDriver {
    client: reqwest::Client,
    base_url: String,
    retry_delay: Duration,
    options: FeedOptions,
}

impl MavenDriver {
    pub fn new(options: FeedOptions) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            base_url: format!("https://central.sonatype.com{INDEX_PATH}"),
            retry_delay: Duration::from_secs(5),
            options,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Component>, FeedError> {
        let payload = json!({
            "page": page,
            "size": PAGE_SIZE,
            "sortField": "publishedDate",
            "sortDirection": "desc",
        });
        let url = format!("{}?repository=maven-central", self.base_url);

        for attempt in 0..=MAX_RETRIES {
            let response = match self.client.post(&url).json(&payload).send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt == MAX_RETRIES {
                        return Err(err.into());
                    }
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RETRIES {
                    return Err(FeedError::MaxRetriesReached);
                }
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            let response = check_status(response)?;
            let browse: BrowseResponse = response
                .json()
                .await
                .map_err(|err| FeedError::decode(FEED_NAME, err))?;
            return Ok(browse.components);
        }

        Err(FeedError::MaxRetriesReached)
    }
}

#[async_trait]
impl FeedDriver for MavenDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let mut pkgs = Vec::new();
        let mut errs = Vec::new();
        let cutoff_ms = cutoff.timestamp_millis();

        let mut page = 0;
        loop {
            let components = match self.fetch_page(page).await {
                Ok(components) => components,
                Err(err) => {
                    errs.push(err);
                    break;
                }
            };

            let mut reached_cutoff = false;
            for component in components {
                if component.latest_version.timestamp_unix_ms > cutoff_ms {
                    // Registry timestamps are millisecond-precision but
                    // the record carries whole seconds, matching the
                    // other feeds.
                    let published = Utc
                        .timestamp_opt(component.latest_version.timestamp_unix_ms / 1000, 0)
                        .single()
                        .unwrap_or_default();
                    let name = format!("{}:{}", component.namespace, component.name);
                    pkgs.push(Package::new(
                        published,
                        name,
                        component.latest_version.version,
                        FEED_NAME,
                    ));
                } else {
                    reached_cutoff = true;
                }
            }

            page += 1;
            if pkgs.is_empty() || reached_cutoff {
                break;
            }
        }

        let new_cutoff = find_cutoff(cutoff, &pkgs);
        let mut pkgs = apply_cutoff(pkgs, cutoff);
        sort_packages_desc(&mut pkgs);
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
    use axum::{routing::post, Router};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    // Cutoff 2024-05-01T10:00:00Z = 1714557600000 ms.
    const PAGE_BODY: &str = r#"{
        "components": [
            {
                "name": "guava",
                "namespace": "com.google.guava",
                "latestVersionInfo": {"version": "33.2.0-jre", "timestampUnixWithMS": 1714558200000}
            },
            {
                "name": "commons-lang3",
                "namespace": "org.apache.commons",
                "latestVersionInfo": {"version": "3.14.0", "timestampUnixWithMS": 1714471200000}
            }
        ]
    }"#;

    #[tokio::test]
    async fn stops_paging_once_the_cutoff_is_reached() {
        let pages = Arc::new(AtomicU32::new(0));
        let counter = pages.clone();
        let router = Router::new().route(
            INDEX_PATH,
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PAGE_BODY }
            }),
        );
        let base = spawn_server(router).await;

        let mut driver = MavenDriver::new(FeedOptions::default()).unwrap();
        driver.base_url = format!("{base}{INDEX_PATH}");

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].name, "com.google.guava:guava");
        assert_eq!(result.packages[0].version, "33.2.0-jre");
        // The page contained an at-or-before-cutoff component, so no
        // second page was requested.
        assert_eq!(pages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_past_rate_limiting() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            INDEX_PATH,
            post(move || {
                let hit = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if hit == 0 {
                        Err(axum::http::StatusCode::TOO_MANY_REQUESTS)
                    } else {
                        Ok(PAGE_BODY)
                    }
                }
            }),
        );
        let base = spawn_server(router).await;

        let mut driver = MavenDriver::new(FeedOptions::default()).unwrap();
        driver.base_url = format!("{base}{INDEX_PATH}");
        driver.retry_delay = Duration::from_millis(10);

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.packages.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejects_packages_option() {
        let options = FeedOptions {
            packages: Some(vec!["com.google.guava:guava".to_string()]),
            poll_rate: String::new(),
        };
        assert!(MavenDriver::new(options).is_err());
    }
}
