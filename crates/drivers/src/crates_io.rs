//! crates.io feed
//!
//! Polls the summary endpoint's `just_updated` list. Firehose-only: the
//! endpoint has no `since` parameter, so results run through the lossy
//! detector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use feedstock_events::Handler;
use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::lossy::LossyFeedDetector;
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "crates";

const ACTIVITY_PATH: &str = "/api/v1/summary";

#[derive(Debug, Deserialize)]
struct Summary {
    just_updated: Vec<UpdatedCrate>,
}

#[derive(Debug, Deserialize)]
struct UpdatedCrate {
    name: String,
    newest_version: String,
    updated_at: DateTime<Utc>,
}

pub struct CratesDriver {
    client: reqwest::Client,
    base_url: String,
    detector: LossyFeedDetector,
    options: FeedOptions,
}

impl CratesDriver {
    pub fn new(options: FeedOptions, event_handler: Handler) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            base_url: "https://crates.io".to_string(),
            detector: LossyFeedDetector::new(event_handler),
            options,
        })
    }

    async fn fetch_updated(&self) -> Result<Vec<UpdatedCrate>, FeedError> {
        let url = format!("{}{ACTIVITY_PATH}", self.base_url);
        let response = check_status(self.client.get(&url).send().await?)?;
        let summary: Summary = response
            .json()
            .await
            .map_err(|err| FeedError::decode(FEED_NAME, err))?;
        Ok(summary.just_updated)
    }
}

#[async_trait]
impl FeedDriver for CratesDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let updated = match self.fetch_updated().await {
            Ok(updated) => updated,
            Err(err) => return PollResult::failure(cutoff, vec![err]),
        };

        let mut pkgs: Vec<Package> = updated
            .into_iter()
            .map(|c| Package::new(c.updated_at, c.name, c.newest_version, FEED_NAME))
            .collect();

        self.detector.process(FEED_NAME, &pkgs);

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
