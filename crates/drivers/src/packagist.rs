//! Packagist feed
//!
//! The metadata changes endpoint takes a `since` cursor (unix seconds
//! scaled by 10000), so the lossy detector is not consulted. Each update
//! action is resolved to concrete versions via the repo metadata host.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "packagist";

#[derive(Debug, Deserialize)]
struct Changes {
    actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
struct Action {
    #[serde(rename = "type")]
    action_type: String,
    package: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    packages: HashMap<String, Vec<VersionInfo>>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
    time: DateTime<Utc>,
}

pub struct PackagistDriver {
    client: reqwest::Client,
    update_host: String,
    version_host: String,
    options: FeedOptions,
}

impl PackagistDriver {
    pub fn new(options: FeedOptions) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            update_host: "https://packagist.org".to_string(),
            version_host: "https://repo.packagist.org".to_string(),
            options,
        })
    }

    async fn fetch_changes(&self, since: DateTime<Utc>) -> Result<Vec<Action>, FeedError> {
        let url = format!("{}/metadata/changes.json", self.update_host);
        let since = (since.timestamp() * 10_000).to_string();
        let response = check_status(
            self.client
                .get(&url)
                .query(&[("since", since.as_str())])
                .send()
                .await?,
        )?;
        let changes: Changes = response
            .json()
            .await
            .map_err(|err| FeedError::decode(FEED_NAME, err))?;
        Ok(changes.actions)
    }

    async fn fetch_versions(&self, package: &str) -> Result<Vec<Package>, FeedError> {
        let url = format!("{}/p2/{package}.json", self.version_host);
        let response = check_status(self.client.get(&url).send().await?)?;
        let metadata: PackageMetadata = response
            .json()
            .await
            .map_err(|err| FeedError::decode(FEED_NAME, err))?;

        let mut pkgs = Vec::new();
        for (name, versions) in metadata.packages {
            for version in versions {
                pkgs.push(Package::new(version.time, name.clone(), version.version, FEED_NAME));
            }
        }
        Ok(pkgs)
    }
}

#[async_trait]
impl FeedDriver for PackagistDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let actions = match self.fetch_changes(cutoff).await {
            Ok(actions) => actions,
            Err(err) => return PollResult::failure(cutoff, vec![err]),
        };

        let mut pkgs = Vec::new();
        let mut errs = Vec::new();
        for action in actions {
            let Some(acted_at) = Utc.timestamp_opt(action.time, 0).single() else {
                continue;
            };
            if acted_at < cutoff {
                continue;
            }
            if action.action_type == "delete" {
                continue;
            }
            match self.fetch_versions(&action.package).await {
                Ok(versions) => pkgs.extend(versions),
                Err(err) => {
                    errs.push(FeedError::for_package(action.package, err));
                }
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
    use axum::http::StatusCode;
    use axum::{routing::get, Router};

    // 2024-05-01T10:00:00Z is 1714557600.
    const CHANGES_BODY: &str = r#"{
        "actions": [
            {"type": "update", "package": "monolog/monolog", "time": 1714557900},
            {"type": "delete", "package": "acme/abandoned", "time": 1714557900},
            {"type": "update", "package": "acme/stale", "time": 1714471200}
        ],
        "timestamp": 17145579000000
    }"#;

    const MONOLOG_BODY: &str = r#"{
        "packages": {
            "monolog/monolog": [
                {"version": "3.6.0", "version_normalized": "3.6.0.0", "time": "2024-05-01T10:05:00+00:00"},
                {"version": "3.5.0", "version_normalized": "3.5.0.0", "time": "2024-02-01T08:00:00+00:00"}
            ]
        }
    }"#;

    fn driver(base: String) -> PackagistDriver {
        let mut driver = PackagistDriver::new(FeedOptions::default()).unwrap();
        driver.update_host = base.clone();
        driver.version_host = base;
        driver
    }

    #[tokio::test]
    async fn resolves_update_actions_to_versions() {
        let router = Router::new()
            .route("/metadata/changes.json", get(|| async { CHANGES_BODY }))
            .route("/p2/monolog/monolog.json", get(|| async { MONOLOG_BODY }));
        let base = spawn_server(router).await;
        let driver = driver(base);

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        // The stale action is before the cutoff and the delete action is
        // skipped; only monolog versions newer than the cutoff remain.
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].name, "monolog/monolog");
        assert_eq!(result.packages[0].version, "3.6.0");
        assert_eq!(
            result.new_cutoff,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn version_lookup_failure_names_the_package() {
        let router = Router::new()
            .route("/metadata/changes.json", get(|| async { CHANGES_BODY }))
            .route(
                "/p2/monolog/monolog.json",
                get(|| async { StatusCode::NOT_FOUND }),
            );
        let base = spawn_server(router).await;
        let driver = driver(base);

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let result = driver.latest(cutoff).await;

        assert!(result.packages.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].to_string().contains("monolog/monolog"));
    }

    #[test]
    fn rejects_packages_option() {
        let options = FeedOptions {
            packages: Some(vec!["monolog/monolog".to_string()]),
            poll_rate: String::new(),
        };
        assert!(PackagistDriver::new(options).is_err());
    }
}
