//! RubyGems feed
//!
//! Merges the "latest" (new gems) and "just updated" (new versions)
//! activity endpoints, keyed by gem name. Either request may fail on its
//! own; the other still contributes. Firehose-only, with loss detection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use feedstock_events::Handler;
use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::lossy::LossyFeedDetector;
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "rubygems";

const ACTIVITY_PATH: &str = "/api/v1/activity";

#[derive(Debug, Deserialize)]
struct GemRelease {
    name: String,
    version: String,
    #[serde(rename = "version_created_at")]
    created_at: DateTime<Utc>,
}

pub struct RubyGemsDriver {
    client: reqwest::Client,
    base_url: String,
    detector: LossyFeedDetector,
    options: FeedOptions,
}

impl RubyGemsDriver {
    pub fn new(options: FeedOptions, event_handler: Handler) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            base_url: "https://rubygems.org".to_string(),
            detector: LossyFeedDetector::new(event_handler),
            options,
        })
    }

    async fn fetch_activity(&self, endpoint: &str) -> Result<Vec<GemRelease>, FeedError> {
        let url = format!("{}{ACTIVITY_PATH}/{endpoint}", self.base_url);
        let response = check_status(self.client.get(&url).send().await?)?;
        response
            .json()
            .await
            .map_err(|err| FeedError::decode(FEED_NAME, err))
    }
}

#[async_trait]
impl FeedDriver for RubyGemsDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let mut errs = Vec::new();
        let mut merged: HashMap<String, GemRelease> = HashMap::new();

        for endpoint in ["latest.json", "just_updated.json"] {
            match self.fetch_activity(endpoint).await {
                Ok(releases) => {
                    for release in releases {
                        merged.insert(release.name.clone(), release);
                    }
                }
                // The other endpoint's gems can still be processed.
                Err(err) => errs.push(err),
            }
        }

        let pkgs: Vec<Package> = merged
            .into_values()
            .map(|gem| Package::new(gem.created_at, gem.name, gem.version, FEED_NAME))
            .collect();

        self.detector.process(FEED_NAME, &pkgs);

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
