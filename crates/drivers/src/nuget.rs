//! NuGet catalog feed
//!
//! Walks the catalog resource of the nuget.org service index: service
//! index → catalog index → pages committed after the cutoff → package
//! detail leaves. Deletion events are ignored. Firehose-only.
//!
//! https://docs.microsoft.com/en-us/nuget/api/catalog-resource

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "nuget";

const INDEX_PATH: &str = "/v3/index.json";
const CATALOG_SERVICE_TYPE: &str = "Catalog/3.0.0";
const PACKAGE_DETAILS_TYPE: &str = "nuget:PackageDetails";

#[derive(Debug, Deserialize)]
struct ServiceIndex {
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    service_type: String,
}

#[derive(Debug, Deserialize)]
struct Catalog {
    items: Vec<CatalogPageRef>,
}

#[derive(Debug, Deserialize)]
struct CatalogPageRef {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "commitTimeStamp")]
    committed: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    items: Vec<CatalogLeaf>,
}

#[derive(Debug, Deserialize)]
struct CatalogLeaf {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    leaf_type: String,
    #[serde(rename = "commitTimeStamp")]
    committed: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PackageDetails {
    id: String,
    version: String,
    published: DateTime<Utc>,
}

pub struct NugetDriver {
    client: reqwest::Client,
    base_url: String,
    options: FeedOptions,
}

impl NugetDriver {
    pub fn new(options: FeedOptions) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            base_url: "https://api.nuget.org".to_string(),
            options,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FeedError> {
        let response = check_status(self.client.get(url).send().await?)?;
        response
            .json()
            .await
            .map_err(|err| FeedError::decode(FEED_NAME, err))
    }

    /// Resolves the catalog resource URL from the service index.
    async fn fetch_catalog_url(&self) -> Result<String, FeedError> {
        let url = format!("{}{INDEX_PATH}", self.base_url);
        let index: ServiceIndex = self.get_json(&url).await?;
        index
            .resources
            .into_iter()
            .find(|resource| resource.service_type == CATALOG_SERVICE_TYPE)
            .map(|resource| resource.id)
            .ok_or_else(|| {
                FeedError::decode(FEED_NAME, format!("no {CATALOG_SERVICE_TYPE} resource in service index"))
            })
    }
}

#[async_trait]
impl FeedDriver for NugetDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let mut errs = Vec::new();

        let catalog_url = match self.fetch_catalog_url().await {
            Ok(url) => url,
            Err(err) => return PollResult::failure(cutoff, vec![err]),
        };
        let catalog: Catalog = match self.get_json(&catalog_url).await {
            Ok(catalog) => catalog,
            Err(err) => return PollResult::failure(cutoff, vec![err]),
        };

        let mut pkgs = Vec::new();
        for page_ref in catalog.items {
            if page_ref.committed < cutoff {
                continue;
            }
            let page: CatalogPage = match self.get_json(&page_ref.id).await {
                Ok(page) => page,
                Err(err) => {
                    errs.push(err);
                    continue;
                }
            };

            for leaf in page.items {
                if leaf.committed < cutoff {
                    continue;
                }
                // Deletion events carry no release to report.
                if leaf.leaf_type != PACKAGE_DETAILS_TYPE {
                    continue;
                }
                let details: PackageDetails = match self.get_json(&leaf.id).await {
                    Ok(details) => details,
                    Err(err) => {
                        errs.push(err);
                        continue;
                    }
                };
                pkgs.push(Package::new(
                    details.published,
                    details.id,
                    details.version,
                    FEED_NAME,
                ));
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
