//! Go module proxy feed
//!
//! The module index takes a `since` timestamp and answers with
//! newline-delimited JSON, so there is no client-side window to lose and
//! the lossy detector is not consulted.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "goproxy";

#[derive(Debug, Deserialize)]
struct IndexLine {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Timestamp")]
    timestamp: DateTime<Utc>,
}

pub struct GoProxyDriver {
    client: reqwest::Client,
    base_url: String,
    options: FeedOptions,
}

impl GoProxyDriver {
    pub fn new(options: FeedOptions) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            base_url: "https://index.golang.org/index".to_string(),
            options,
        })
    }

    async fn fetch_index(&self, since: DateTime<Utc>) -> Result<Vec<IndexLine>, FeedError> {
        let response = check_status(
            self.client
                .get(&self.base_url)
                .query(&[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))])
                .send()
                .await?,
        )?;
        let body = response.text().await?;

        let mut lines = Vec::new();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let parsed: IndexLine =
                serde_json::from_str(line).map_err(|err| FeedError::decode(FEED_NAME, err))?;
            lines.push(parsed);
        }
        Ok(lines)
    }
}

#[async_trait]
impl FeedDriver for GoProxyDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let lines = match self.fetch_index(cutoff).await {
            Ok(lines) => lines,
            Err(err) => return PollResult::failure(cutoff, vec![err]),
        };

        let pkgs: Vec<Package> = lines
            .into_iter()
            .map(|line| Package::new(line.timestamp, line.path, line.version, FEED_NAME))
            .collect();

        let new_cutoff = find_cutoff(cutoff, &pkgs);
        let mut pkgs = apply_cutoff(pkgs, cutoff);
        sort_packages_desc(&mut pkgs);
        PollResult::new(pkgs, new_cutoff, Vec::new())
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
    use axum::extract::Query;
    use axum::{routing::get, Router};
    use chrono::TimeZone;
    use std::collections::HashMap;

    const INDEX_BODY: &str = concat!(
        r#"{"Path":"github.com/spf13/cobra","Version":"v1.8.0","Timestamp":"2024-05-01T10:10:00Z"}"#,
        "\n",
        r#"{"Path":"golang.org/x/sys","Version":"v0.20.0","Timestamp":"2024-05-01T10:20:00Z"}"#,
        "\n",
    );

    #[tokio::test]
    async fn parses_index_lines_and_sends_since() {
        let router = Router::new().route(
            "/",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert!(params.get("since").is_some_and(|s| s.starts_with("2024-05-01T10:00:00")));
                INDEX_BODY
            }),
        );
        let base = spawn_server(router).await;

        let mut driver = GoProxyDriver::new(FeedOptions::default()).unwrap();
        driver.base_url = format!("{base}/");

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.errors.is_empty());
        assert_eq!(result.packages.len(), 2);
        // Most recent first.
        assert_eq!(result.packages[0].name, "golang.org/x/sys");
        assert_eq!(result.packages[1].name, "github.com/spf13/cobra");
        assert_eq!(
            result.new_cutoff,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_line_fails_the_poll() {
        let router = Router::new().route("/", get(|| async { "{not json}\n" }));
        let base = spawn_server(router).await;

        let mut driver = GoProxyDriver::new(FeedOptions::default()).unwrap();
        driver.base_url = base;

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.packages.is_empty());
        assert_eq!(result.new_cutoff, cutoff);
        assert!(matches!(result.errors[0], FeedError::Decode { .. }));
    }

    #[test]
    fn rejects_packages_option() {
        let options = FeedOptions {
            packages: Some(vec!["github.com/spf13/cobra".to_string()]),
            poll_rate: String::new(),
        };
        assert!(GoProxyDriver::new(options).is_err());
    }
}
