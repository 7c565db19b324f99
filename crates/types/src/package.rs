//! Normalized package-release record
//!
//! Every feed driver converts registry-specific payloads into this one
//! structure. Downstream consumers validate the serialized form against
//! a published JSON schema, so field names and the schema version are
//! part of the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version stamped into every emitted record. Bumped only on additive
/// schema changes.
pub const SCHEMA_VERSION: &str = "1.1";

/// A single package release observed at a registry.
///
/// Immutable once created. `created_date` is the registry's own event
/// timestamp, always UTC, and is the value all cutoff comparisons use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Registry-local identifier. Ecosystem-specific syntax, opaque here.
    pub name: String,
    /// Version string exactly as the registry reported it.
    pub version: String,
    /// When the release event happened at the registry.
    pub created_date: DateTime<Utc>,
    /// Name of the feed that produced this record, e.g. `"npm"`.
    #[serde(rename = "type")]
    pub feed: String,
    /// Filename of the published archive, for feeds that surface
    /// per-artifact events. Empty otherwise.
    pub artifact_id: String,
    pub schema_ver: String,
}

impl Package {
    /// Creates a release record without an artifact id.
    pub fn new(
        created: DateTime<Utc>,
        name: impl Into<String>,
        version: impl Into<String>,
        feed: impl Into<String>,
    ) -> Self {
        Self::artifact(created, name, version, "", feed)
    }

    /// Creates a release record for a specific published archive.
    pub fn artifact(
        created: DateTime<Utc>,
        name: impl Into<String>,
        version: impl Into<String>,
        artifact_id: impl Into<String>,
        feed: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            created_date: created,
            feed: feed.into(),
            artifact_id: artifact_id.into(),
            schema_ver: SCHEMA_VERSION.to_string(),
        }
    }
}
