//! Paginated listing access.
//!
//! [`PageSource`] is the boundary the engine drives; [`HttpListing`] is the
//! default implementation over plain HTTP and static markup.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::config::{Category, HarvestConfig, DEFAULT_COUNT_PATTERN};
use crate::content::{element_text, selector};
use crate::error::{HarvesterError, Result};
use crate::http::{create_client, download_text, is_transient};
use crate::types::ItemIdentifier;

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DEFAULT_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_COUNT_PATTERN).expect("valid regex"));

/// A paginated listing of items for one category.
///
/// The listing is a singleton per run: only the driving worker calls it.
pub trait PageSource {
    /// Open the listing and return the declared total item count.
    fn open_listing(&mut self, category: &Category) -> Result<u64>;

    /// Identifiers on the current page, in page order.
    fn current_page_identifiers(&mut self) -> Result<Vec<ItemIdentifier>>;

    /// Move to the next page. `Ok(false)` means there is no further page.
    fn advance_page(&mut self) -> Result<bool>;
}

/// Parse the declared result count using the default pattern.
///
/// Only the number after "of" counts; a page range alone is not a total.
///
/// # Examples
/// ```
/// use policy_harvester::listing::parse_declared_count;
///
/// assert_eq!(parse_declared_count("Showing 1 - 10 of 1,204 results"), Some(1204));
/// assert_eq!(parse_declared_count("Showing results 1 - 2"), None);
/// assert_eq!(parse_declared_count("No results"), None);
/// ```
#[must_use]
pub fn parse_declared_count(text: &str) -> Option<u64> {
    parse_declared_count_with(&DEFAULT_COUNT, text)
}

/// Parse the declared count from the first capture group of `pattern`.
#[must_use]
pub fn parse_declared_count_with(pattern: &Regex, text: &str) -> Option<u64> {
    let raw = pattern.captures(text)?.get(1)?;
    raw.as_str().replace(',', "").parse().ok()
}

/// Normalized form of a page URL for revisit checks.
fn page_key(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_string(), |u| u.to_string())
}

/// The page currently shown by the listing.
#[derive(Debug, Clone)]
struct ListingPage {
    url: String,
    html: String,
}

/// Listing backed by HTTP requests and static HTML.
pub struct HttpListing {
    client: Client,
    config: HarvestConfig,
    count: Selector,
    count_pattern: Regex,
    item_link: Selector,
    next_page: Selector,
    current: Option<ListingPage>,
    /// Pages loaded since the listing was opened.
    loaded: HashSet<String>,
}

impl HttpListing {
    /// Create a listing with its own HTTP session.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
            config: config.clone(),
            count: selector(&config.layout.count_selector)?,
            count_pattern: Regex::new(&config.layout.count_pattern).map_err(|e| {
                HarvesterError::InvalidPattern(config.layout.count_pattern.clone(), e)
            })?,
            item_link: selector(&config.layout.item_link_selector)?,
            next_page: selector(&config.layout.next_page_selector)?,
            current: None,
            loaded: HashSet::new(),
        })
    }

    fn base(&self) -> &Url {
        &self.config.base_origin
    }

    fn current_page(&self) -> Result<&ListingPage> {
        self.current.as_ref().ok_or_else(|| HarvesterError::Listing {
            url: String::new(),
            message: "listing not opened".to_string(),
        })
    }

    fn load(&self, url: &str) -> Result<ListingPage> {
        let html = download_text(&self.client, url)?;
        Ok(ListingPage {
            url: url.to_string(),
            html,
        })
    }
}

impl PageSource for HttpListing {
    fn open_listing(&mut self, category: &Category) -> Result<u64> {
        let url = self.config.listing_url(category);
        let page = self.load(&url).map_err(|e| HarvesterError::Listing {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let declared = {
            let doc = Html::parse_document(&page.html);
            doc.select(&self.count)
                .next()
                .map(element_text)
                .and_then(|text| parse_declared_count_with(&self.count_pattern, &text))
        };
        let declared = declared.ok_or(HarvesterError::MissingDeclaredCount { url: url.clone() })?;

        tracing::info!(category = %category, declared, url = %url, "Opened listing");
        self.loaded.clear();
        self.loaded.insert(page_key(&page.url));
        self.current = Some(page);
        Ok(declared)
    }

    fn current_page_identifiers(&mut self) -> Result<Vec<ItemIdentifier>> {
        let page = self.current_page()?;
        let doc = Html::parse_document(&page.html);

        let mut identifiers = Vec::new();
        for link in doc.select(&self.item_link) {
            let Some(href) = link.value().attr("href") else {
                tracing::debug!(text = %element_text(link), "Item link without href, skipping");
                continue;
            };
            identifiers.push(ItemIdentifier::resolve(self.base(), href)?);
        }

        tracing::debug!(url = %page.url, count = identifiers.len(), "Read listing page");
        Ok(identifiers)
    }

    fn advance_page(&mut self) -> Result<bool> {
        let page = self.current_page()?;
        let next_url = {
            let doc = Html::parse_document(&page.html);
            let Some(href) = doc
                .select(&self.next_page)
                .find_map(|a| a.value().attr("href").map(str::to_string))
            else {
                tracing::debug!(url = %page.url, "No next page control");
                return Ok(false);
            };
            let page_url = Url::parse(&page.url)
                .map_err(|e| HarvesterError::InvalidUrl(page.url.clone(), e))?;
            page_url
                .join(&href)
                .map_err(|e| HarvesterError::InvalidUrl(href.clone(), e))?
                .to_string()
        };

        if next_url == page.url {
            tracing::debug!(url = %next_url, "Next page control points at current page");
            return Ok(false);
        }
        if self.loaded.contains(&page_key(&next_url)) {
            tracing::warn!(
                url = %next_url,
                "Next page control points at an earlier page, stopping pagination"
            );
            return Ok(false);
        }

        let max_attempts = self.config.max_advance_retries + 1;
        for attempt in 1..=max_attempts {
            match self.load(&next_url) {
                Ok(next) => {
                    self.loaded.insert(page_key(&next.url));
                    self.current = Some(next);
                    return Ok(true);
                }
                Err(e) if is_transient(&e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        url = %next_url,
                        error = %e,
                        "Failed to advance page, will retry"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(url = %next_url, "Giving up on next page after {max_attempts} attempts");
        Ok(false)
    }
}
