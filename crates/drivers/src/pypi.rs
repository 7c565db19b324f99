//! PyPI release feed
//!
//! Firehose mode reads the global updates RSS, which carries a bounded
//! window and no cursor, so results run through the lossy detector.
//! Named mode fetches each configured project's releases RSS instead;
//! one failing project does not fail the poll.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;

use feedstock_events::Handler;
use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::lossy::LossyFeedDetector;
use crate::xml::sanitize_xml;
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "pypi";

const UPDATES_PATH: &str = "/rss/updates.xml";

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
    #[serde(rename = "pubDate")]
    pub_date: String,
    link: String,
}

impl Item {
    /// The item link ends in `/<name>/<version>/`, e.g.
    /// `https://pypi.org/project/foopy/2.1/`.
    fn name_and_version(&self) -> Result<(&str, &str), FeedError> {
        let parts: Vec<&str> = self.link.split('/').collect();
        if parts.len() < 5 {
            return Err(FeedError::decode(
                FEED_NAME,
                format!("invalid link provided by pypi API: {}", self.link),
            ));
        }
        Ok((parts[parts.len() - 3], parts[parts.len() - 2]))
    }

    fn created_date(&self) -> Result<DateTime<Utc>, FeedError> {
        DateTime::parse_from_rfc2822(&self.pub_date)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| FeedError::decode(FEED_NAME, err))
    }
}

pub struct PypiDriver {
    client: reqwest::Client,
    base_url: String,
    packages: Option<Vec<String>>,
    detector: LossyFeedDetector,
    options: FeedOptions,
}

impl PypiDriver {
    pub fn new(options: FeedOptions, event_handler: Handler) -> Result<Self, FeedError> {
        Ok(Self {
            client: default_client()?,
            base_url: "https://pypi.org".to_string(),
            packages: options.packages.clone(),
            detector: LossyFeedDetector::new(event_handler),
            options,
        })
    }

    async fn fetch_rss(&self, url: &str) -> Result<Vec<Item>, FeedError> {
        let response = check_status(self.client.get(url).send().await?)?;
        let body = response.bytes().await?;
        let rss: Rss = quick_xml::de::from_str(&sanitize_xml(&body))
            .map_err(|err| FeedError::decode(FEED_NAME, err))?;
        Ok(rss.channel.items)
    }

    async fn fetch_updates(&self) -> Result<Vec<Item>, FeedError> {
        let url = format!("{}{UPDATES_PATH}", self.base_url);
        self.fetch_rss(&url).await
    }

    /// Fetches the release RSS of every configured project concurrently.
    async fn fetch_critical(&self, packages: &[String]) -> (Vec<Item>, Vec<FeedError>) {
        let fetches = packages.iter().map(|name| async move {
            let url = format!("{}/rss/project/{name}/releases.xml", self.base_url);
            (name, self.fetch_rss(&url).await)
        });

        let mut items = Vec::new();
        let mut errs = Vec::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(project_items) => items.extend(project_items),
                Err(err) => errs.push(FeedError::for_package(name.clone(), err)),
            }
        }
        (items, errs)
    }
}

#[async_trait]
impl FeedDriver for PypiDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let mut errs = Vec::new();

        let items = match &self.packages {
            None => match self.fetch_updates().await {
                Ok(items) => items,
                // The firehose request is the only data source, so its
                // failure fails the poll.
                Err(err) => return PollResult::failure(cutoff, vec![err]),
            },
            Some(packages) => {
                let (items, fetch_errs) = self.fetch_critical(packages).await;
                errs = fetch_errs;
                if items.is_empty() && !packages.is_empty() {
                    errs.push(FeedError::NoPackagesPolled);
                    return PollResult::failure(cutoff, errs);
                }
                items
            }
        };

        let mut pkgs = Vec::new();
        for item in items {
            let created = match item.created_date() {
                Ok(created) => created,
                Err(err) => {
                    errs.push(err);
                    continue;
                }
            };
            match item.name_and_version() {
                Ok((name, version)) => {
                    pkgs.push(Package::new(created, name, version, FEED_NAME));
                }
                Err(err) => errs.push(err),
            }
        }

        if self.packages.is_none() {
            self.detector.process(FEED_NAME, &pkgs);
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
