//! Policy Harvester - Collect clinical policy bulletins from a paginated listing.
//!
//! This crate walks a category's paginated search listing, visits every
//! listed policy in its own HTTP session, extracts the detail fields and
//! body block, and verifies the number of visited items against the count
//! the listing declares.
//!
//! # Example
//!
//! ```
//! use policy_harvester::completeness::{verify, Completeness};
//! use policy_harvester::config::HarvestConfig;
//!
//! let config = HarvestConfig::default();
//! assert!(config.category("surgery").is_ok());
//! assert_eq!(verify(12, 12), Completeness::Completed);
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Site constants, categories, pacing and the identifier contract
//! - [`types`]: Item identifiers and harvested records
//! - [`error`]: Error types and Result alias
//! - [`http`]: Blocking HTTP client with retries
//! - [`listing`]: Paginated listing access
//! - [`visitor`]: Item visits with pooled, isolated contexts
//! - [`content`]: Detail page extraction
//! - [`completeness`]: Declared versus visited count verification
//! - [`criteria`]: Necessity criteria trees attached to records
//! - [`sink`]: JSON persistence of records
//! - [`harvester`]: The harvest engine
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod completeness;
pub mod config;
pub mod content;
pub mod criteria;
pub mod error;
pub mod harvester;
pub mod http;
pub mod listing;
pub mod sink;
pub mod types;
pub mod visitor;

// Re-export the engine entry points
pub use harvester::{CancellationFlag, FailedFetch, HarvestEngine, HarvestReport};

// Re-export commonly used items
pub use completeness::{verify, Completeness};
pub use config::{Category, HarvestConfig, Mode};
pub use error::{FetchFailure, HarvesterError, Result};
pub use sink::{load_records, save_records, JsonFileSink, ResultSink};
pub use types::{ItemIdentifier, RawItemPayload, Record};
