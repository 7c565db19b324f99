//! GitHub releases feed
//!
//! Named-packages only: every configured `owner/repo` is polled for its
//! recent releases. There is no firehose equivalent, so the driver
//! requires a package list and never consults the lossy detector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;

use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "github";

const RELEASES_PER_QUERY: u32 = 20;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    // Draft releases have no publication date yet.
    published_at: Option<DateTime<Utc>>,
}

pub struct GithubDriver {
    client: reqwest::Client,
    base_url: String,
    repositories: Vec<String>,
    options: FeedOptions,
}

impl GithubDriver {
    pub fn new(options: FeedOptions) -> Result<Self, FeedError> {
        let repositories = match &options.packages {
            Some(packages) if !packages.is_empty() => packages.clone(),
            _ => {
                return Err(FeedError::PackagesRequired { feed: FEED_NAME });
            }
        };
        Ok(Self {
            client: default_client()?,
            base_url: "https://api.github.com".to_string(),
            repositories,
            options,
        })
    }

    async fn fetch_releases(&self, repository: &str) -> Result<Vec<Release>, FeedError> {
        let url = format!(
            "{}/repos/{repository}/releases?per_page={RELEASES_PER_QUERY}",
            self.base_url
        );
        let response = check_status(self.client.get(&url).send().await?)?;
        response
            .json()
            .await
            .map_err(|err| FeedError::decode(FEED_NAME, err))
    }
}

#[async_trait]
impl FeedDriver for GithubDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let fetches = self.repositories.iter().map(|repository| async move {
            (repository, self.fetch_releases(repository).await)
        });

        let mut pkgs = Vec::new();
        let mut errs = Vec::new();
        for (repository, result) in join_all(fetches).await {
            match result {
                Ok(releases) => {
                    for release in releases {
                        let Some(published) = release.published_at else {
                            continue;
                        };
                        pkgs.push(Package::new(
                            published,
                            repository.clone(),
                            release.tag_name,
                            FEED_NAME,
                        ));
                    }
                }
                Err(err) => errs.push(FeedError::for_package(repository.clone(), err)),
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
