//! Error types for the harvester.
//!
//! `HarvesterError` covers run-level failures. Per-item failures use the
//! smaller [`FetchFailure`] type so they can be counted without aborting a run.

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Category is not in the configured allow-list.
    #[error("Invalid category: '{name}'. Expected one of: {}", .allowed.join(", "))]
    InvalidCategory { name: String, allowed: Vec<String> },

    /// An identifier on the listing does not have the required shape.
    ///
    /// This means the listing filter itself is wrong, so the run stops.
    #[error("Structural contract violation: '{identifier}' does not match expected {expected}")]
    StructuralContractViolation { identifier: String, expected: String },

    /// The listing could not be opened or read.
    #[error("Failed to read listing at {url}: {message}")]
    Listing { url: String, message: String },

    /// The declared item count could not be found on the first page.
    #[error("Declared item count not found on listing {url}")]
    MissingDeclaredCount { url: String },

    /// A link could not be resolved against the base origin.
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, url::ParseError),

    /// Invalid selector in the site layout configuration.
    #[error("Invalid CSS selector '{0}'")]
    InvalidSelector(String),

    /// Invalid count pattern in the site layout configuration.
    #[error("Invalid count pattern '{0}': {1}")]
    InvalidPattern(String, regex::Error),

    /// The run was cancelled from outside.
    #[error("Harvest cancelled")]
    Cancelled,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// All retry attempts were used up.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

/// Failure to fetch a single item.
///
/// Recovered locally by the engine: the item is counted as visited but
/// produces no record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The item did not load within the timeout.
    #[error("timed out")]
    Timeout,

    /// The page loaded but is not a detail page (or returned 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other transport error.
    #[error("request failed: {0}")]
    Http(String),
}

impl From<HarvesterError> for FetchFailure {
    fn from(err: HarvesterError) -> Self {
        match err {
            HarvesterError::Http(e) if e.is_timeout() => Self::Timeout,
            HarvesterError::Http(e) if e.status().is_some_and(|s| s.as_u16() == 404) => {
                Self::NotFound(e.to_string())
            }
            other => Self::Http(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_category_display() {
        let err = HarvesterError::InvalidCategory {
            name: "dentistry".to_string(),
            allowed: vec!["surgery".to_string(), "laboratory".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid category: 'dentistry'. Expected one of: surgery, laboratory"
        );
    }

    #[test]
    fn test_structural_violation_names_identifier() {
        let err = HarvesterError::StructuralContractViolation {
            identifier: "https://example.org/news/item.html".to_string(),
            expected: "prefix 'https://example.org/cpb/'".to_string(),
        };
        assert!(err.to_string().contains("https://example.org/news/item.html"));
    }

    #[test]
    fn test_fetch_failure_from_other_error() {
        let failure = FetchFailure::from(HarvesterError::Cancelled);
        assert_eq!(failure, FetchFailure::Http("Harvest cancelled".to_string()));
    }
}
