//! Core data types for the harvester.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::criteria::CriteriaAnnotation;
use crate::error::{HarvesterError, Result};

/// Absolute link uniquely identifying one detail page within a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentifier(String);

impl ItemIdentifier {
    /// Wrap an already-absolute link.
    #[must_use]
    pub fn new(link: impl Into<String>) -> Self {
        Self(link.into())
    }

    /// Resolve a possibly relative href against the base origin.
    ///
    /// # Examples
    /// ```
    /// use policy_harvester::types::ItemIdentifier;
    /// use url::Url;
    ///
    /// let base = Url::parse("https://www.aetna.com").unwrap();
    /// let id = ItemIdentifier::resolve(&base, "/cpb/medical/data/1_99/0001.html").unwrap();
    /// assert_eq!(id.as_str(), "https://www.aetna.com/cpb/medical/data/1_99/0001.html");
    /// ```
    pub fn resolve(base: &Url, href: &str) -> Result<Self> {
        let href = href.trim();
        let resolved = base
            .join(href)
            .map_err(|e| HarvesterError::InvalidUrl(href.to_string(), e))?;
        Ok(Self(resolved.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, ignoring query and fragment.
    #[must_use]
    pub fn document_name(&self) -> &str {
        let path = self.0.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for ItemIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw document returned by an item fetch, before any extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItemPayload {
    pub identifier: ItemIdentifier,
    pub html: String,
}

/// One harvested policy item.
///
/// Never mutated during the harvest; the annotation stage only appends to
/// `annotations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "url")]
    pub identifier: ItemIdentifier,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub document_number: Option<String>,

    #[serde(default)]
    pub publish_date: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub last_review_date: Option<String>,

    /// Body block the criteria are extracted from.
    #[serde(rename = "content", default)]
    pub body_text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<CriteriaAnnotation>,
}

impl Record {
    /// Create a record with only the identifier set.
    #[must_use]
    pub fn new(identifier: ItemIdentifier) -> Self {
        Self {
            identifier,
            subject: None,
            document_number: None,
            publish_date: None,
            status: None,
            last_review_date: None,
            body_text: String::new(),
            annotations: Vec::new(),
        }
    }

    /// Display label: subject when known, otherwise the link.
    #[must_use]
    pub fn label(&self) -> &str {
        self.subject.as_deref().unwrap_or(self.identifier.as_str())
    }
}
