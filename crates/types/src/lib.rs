//! Shared types for the feedstock pipeline
//!
//! This crate holds the normalized release record emitted for every new
//! package version, the cutoff (watermark) algebra that keeps polling
//! idempotent, and the error taxonomy shared by the feed drivers.

pub mod cutoff;
pub mod error;
pub mod options;
pub mod package;

pub use cutoff::{apply_cutoff, find_cutoff, sort_packages_desc};
pub use error::{FeedError, Result};
pub use options::FeedOptions;
pub use package::{Package, SCHEMA_VERSION};
