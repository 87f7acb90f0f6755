//! Detail page extraction.
//!
//! Pulls the fixed detail fields and the body block out of a loaded detail
//! page. Extraction is purely structural: the body block is whatever sits
//! between the section heading and the next boundary element.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::config::SiteLayout;
use crate::error::{FetchFailure, HarvesterError, Result};
use crate::types::{RawItemPayload, Record};

/// Presentational wrappers removed from the body, keeping their content.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static WRAPPER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:strong|em|div|p)(?:\s[^>]*)?>").expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Compile a CSS selector from the site layout.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| HarvesterError::InvalidSelector(css.to_string()))
}

/// Text content of an element with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Unwrap `strong`, `em`, `div` and `p` tags, keeping their content.
///
/// # Examples
/// ```
/// use policy_harvester::content::clean_body_html;
///
/// assert_eq!(
///     clean_body_html("<ol><li><p>Condition <strong>A</strong>; and</p></li></ol>"),
///     "<ol><li>Condition A; and</li></ol>"
/// );
/// ```
#[must_use]
pub fn clean_body_html(html: &str) -> String {
    WRAPPER_TAG.replace_all(html, "").trim().to_string()
}

/// Which record field a detail label fills.
#[derive(Debug, Clone, Copy)]
enum DetailField {
    Subject,
    DocumentNumber,
    PublishDate,
    Status,
    LastReviewDate,
}

const DETAIL_LABELS: &[(&str, DetailField)] = &[
    ("Subject:", DetailField::Subject),
    ("Document #:", DetailField::DocumentNumber),
    ("Publish Date:", DetailField::PublishDate),
    ("Status:", DetailField::Status),
    ("Last Review Date:", DetailField::LastReviewDate),
];

/// Extracts records from detail pages.
#[derive(Debug, Clone)]
pub struct DetailExtractor {
    marker: Selector,
    fields: Selector,
    heading: Selector,
    heading_text: String,
    boundary_tag: String,
}

impl DetailExtractor {
    /// Compile the selectors of a site layout.
    pub fn new(layout: &SiteLayout) -> Result<Self> {
        Ok(Self {
            marker: selector(&layout.detail_marker_selector)?,
            fields: selector(&layout.detail_field_selector)?,
            heading: selector(&layout.body_heading_selector)?,
            heading_text: layout.body_heading_text.clone(),
            boundary_tag: layout.body_boundary_tag.to_lowercase(),
        })
    }

    /// Build a record from a loaded detail page.
    ///
    /// Missing fields leave the field empty; a missing body leaves
    /// `body_text` empty. Only a page without the detail marker is a failure.
    pub fn extract(&self, payload: &RawItemPayload) -> std::result::Result<Record, FetchFailure> {
        let doc = Html::parse_document(&payload.html);

        if doc.select(&self.marker).next().is_none() {
            return Err(FetchFailure::NotFound(format!(
                "page did not load properly: no detail marker at {}",
                payload.identifier
            )));
        }

        let mut record = Record::new(payload.identifier.clone());

        for cell in doc.select(&self.fields) {
            let text = element_text(cell);
            let Some((field, value)) = DETAIL_LABELS.iter().find_map(|(label, field)| {
                text.strip_prefix(label).map(|rest| (*field, rest.trim()))
            }) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let slot = match field {
                DetailField::Subject => &mut record.subject,
                DetailField::DocumentNumber => &mut record.document_number,
                DetailField::PublishDate => &mut record.publish_date,
                DetailField::Status => &mut record.status,
                DetailField::LastReviewDate => &mut record.last_review_date,
            };
            *slot = Some(value.to_string());
        }

        for (label, value) in [
            ("subject", &record.subject),
            ("document_number", &record.document_number),
            ("publish_date", &record.publish_date),
            ("status", &record.status),
            ("last_review_date", &record.last_review_date),
        ] {
            if value.is_none() {
                tracing::debug!(field = label, url = %payload.identifier, "Detail field missing");
            }
        }

        record.body_text = match self.body_block(&doc) {
            Some(html) => clean_body_html(&html),
            None => String::new(),
        };
        if record.body_text.is_empty() {
            tracing::warn!(
                url = %payload.identifier,
                heading = %self.heading_text,
                "Body block not found or empty; page shape differs from layout"
            );
        }

        Ok(record)
    }

    /// Raw HTML between the body heading and the next boundary.
    fn body_block(&self, doc: &Html) -> Option<String> {
        let heading = doc
            .select(&self.heading)
            .find(|h| element_text(*h).contains(&self.heading_text))?;
        let heading_tag = heading.value().name().to_string();

        let mut block = String::new();
        for sibling in heading.next_siblings() {
            match sibling.value() {
                Node::Element(el) => {
                    let name = el.name();
                    if name == self.boundary_tag || name == heading_tag {
                        break;
                    }
                    if let Some(element) = ElementRef::wrap(sibling) {
                        block.push_str(&element.html());
                    }
                }
                Node::Text(text) => block.push_str(text),
                _ => {}
            }
        }

        let block = block.trim().to_string();
        (!block.is_empty()).then_some(block)
    }
}
