//! PyPI artifact feed
//!
//! Uses the warehouse XML-RPC `changelog(since, with_ids=false)` call,
//! which returns every project action since a unix timestamp. Actions of
//! the form `add <kind> file <filename>` correspond to uploaded
//! archives and become per-artifact packages. The `since` cursor makes
//! the lossy detector unnecessary.
//!
//! https://warehouse.pypa.io/api-reference/xml-rpc.html#changelog-since-with-ids-false

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::events::Event;
use regex::Regex;

use feedstock_types::{apply_cutoff, find_cutoff, sort_packages_desc, FeedError, FeedOptions, Package};

use crate::http::{check_status, default_client};
use crate::{FeedDriver, PollResult};

pub const FEED_NAME: &str = "pypi-artifacts";

/// Matches changelog actions recording an archive upload. The second
/// capture is the archive filename. The action strings are generated by
/// warehouse's legacy upload endpoint.
fn archive_upload_action() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("add (.*) file (.*)").expect("static regex"))
}

/// One changelog row: `(name, version|nil, unix timestamp, action)`.
#[derive(Debug)]
enum Scalar {
    Str(String),
    Int(i64),
    Nil,
}

#[derive(Debug)]
struct ChangelogEntry {
    name: String,
    version: String,
    timestamp: DateTime<Utc>,
    archive_name: Option<String>,
}

impl ChangelogEntry {
    /// Builds an entry from a raw row, tolerating missing or
    /// wrongly-typed fields the way the upstream API occasionally
    /// produces them.
    fn from_row(row: &[Scalar]) -> Self {
        let text = |idx: usize| match row.get(idx) {
            Some(Scalar::Str(s)) => s.clone(),
            _ => String::new(),
        };
        let int = |idx: usize| match row.get(idx) {
            Some(Scalar::Int(i)) => *i,
            _ => 0,
        };

        let action = text(3);
        let archive_name = archive_upload_action()
            .captures(&action)
            .map(|captures| captures[2].to_string());

        Self {
            name: text(0),
            version: text(1),
            timestamp: Utc
                .timestamp_opt(int(2), 0)
                .single()
                .unwrap_or_default(),
            archive_name,
        }
    }
}

fn changelog_request(since: DateTime<Utc>) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0"?>"#,
            "<methodCall><methodName>changelog</methodName><params>",
            "<param><value><int>{}</int></value></param>",
            "<param><value><boolean>0</boolean></value></param>",
            "</params></methodCall>"
        ),
        since.timestamp()
    )
}

/// Parses the XML-RPC response: an array of 4-element arrays of
/// strings, ints and nils. Scalar tags may be omitted, in which case
/// the value is a string.
fn parse_changelog_response(xml: &str) -> Result<Vec<Vec<Scalar>>, FeedError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rows: Vec<Vec<Scalar>> = Vec::new();
    let mut row: Vec<Scalar> = Vec::new();
    let mut array_depth = 0usize;
    let mut in_value = false;
    let mut scalar_tag: Option<String> = None;
    let mut text_seen = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
                match tag.as_str() {
                    "fault" => {
                        return Err(FeedError::decode(FEED_NAME, "xml-rpc fault response"))
                    }
                    "array" => array_depth += 1,
                    "value" if array_depth == 2 => {
                        in_value = true;
                        text_seen = false;
                        scalar_tag = None;
                    }
                    "string" | "int" | "i4" | "boolean" | "double" if in_value => {
                        scalar_tag = Some(tag);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(empty)) => {
                if empty.name().as_ref() == b"nil" && in_value {
                    row.push(Scalar::Nil);
                    text_seen = true;
                }
            }
            Ok(Event::Text(text)) => {
                if !in_value {
                    continue;
                }
                let content = text
                    .unescape()
                    .map_err(|err| FeedError::decode(FEED_NAME, err))?
                    .into_owned();
                match scalar_tag.as_deref() {
                    Some("int") | Some("i4") => {
                        let value = content
                            .trim()
                            .parse::<i64>()
                            .map_err(|err| FeedError::decode(FEED_NAME, err))?;
                        row.push(Scalar::Int(value));
                    }
                    // Untyped values and every other scalar tag decode
                    // as text.
                    _ => row.push(Scalar::Str(content)),
                }
                text_seen = true;
            }
            Ok(Event::End(end)) => {
                let tag = end.name().as_ref().to_vec();
                match tag.as_slice() {
                    b"array" => {
                        if array_depth == 2 {
                            rows.push(std::mem::take(&mut row));
                        }
                        array_depth = array_depth.saturating_sub(1);
                    }
                    b"value" if in_value => {
                        // <value></value> with no content is an empty
                        // string.
                        if !text_seen {
                            row.push(Scalar::Str(String::new()));
                        }
                        in_value = false;
                        scalar_tag = None;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(FeedError::decode(FEED_NAME, err)),
        }
    }

    Ok(rows)
}

pub struct PypiArtifactsDriver {
    client: reqwest::Client,
    base_url: String,
    options: FeedOptions,
}

impl PypiArtifactsDriver {
    pub fn new(options: FeedOptions) -> Result<Self, FeedError> {
        if options.has_packages() {
            return Err(FeedError::UnsupportedOption {
                feed: FEED_NAME,
                option: "packages",
            });
        }
        Ok(Self {
            client: default_client()?,
            base_url: "https://pypi.org/pypi".to_string(),
            options,
        })
    }

    async fn fetch_changelog(&self, since: DateTime<Utc>) -> Result<Vec<ChangelogEntry>, FeedError> {
        let response = check_status(
            self.client
                .post(&self.base_url)
                .header("Content-Type", "text/xml")
                .body(changelog_request(since))
                .send()
                .await?,
        )?;
        let body = response.text().await?;
        let rows = parse_changelog_response(&body)?;
        Ok(rows.iter().map(|row| ChangelogEntry::from_row(row)).collect())
    }
}

#[async_trait]
impl FeedDriver for PypiArtifactsDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        let entries = match self.fetch_changelog(cutoff).await {
            Ok(entries) => entries,
            Err(err) => return PollResult::failure(cutoff, vec![err]),
        };

        let pkgs: Vec<Package> = entries
            .into_iter()
            .filter_map(|entry| {
                let archive_name = entry.archive_name?;
                Some(Package::artifact(
                    entry.timestamp,
                    entry.name,
                    entry.version,
                    archive_name,
                    FEED_NAME,
                ))
            })
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
