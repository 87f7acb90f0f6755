//! Configuration constants and the immutable run configuration.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvesterError, Result};
use crate::types::ItemIdentifier;

/// Origin used to resolve relative links on the listing.
pub const BASE_ORIGIN: &str = "https://www.aetna.com";

/// Listing URL template; `{category}` is replaced by the category name.
pub const LISTING_URL_TEMPLATE: &str = "https://www.aetna.com/health-care-professionals/clinical-policy-bulletins/medical-clinical-policy-bulletins/medical-clinical-policy-bulletins-search-results.html?query={category}";

/// Every item link must start with this prefix.
pub const DOCUMENT_URL_PREFIX: &str = "https://www.aetna.com/cpb/medical/data/";

/// Categories a run may be scoped to.
pub const ALLOWED_CATEGORIES: &[&str] = &[
    "ancillarymiscellaneous",
    "medicine",
    "durablemedicalequipment",
    "surgery",
    "laboratory",
    "transplant",
    "therapeuticradiology",
    "radiology",
    "orthoticsprosthetics",
];

/// Pseudo-category selecting every allowed category.
pub const ALL_CATEGORIES: &str = "all";

/// HTTP timeout in seconds for a single page load.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Browser-like user agent; some listings serve reduced markup to unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// How many times a page advance is retried on a transient error.
pub const DEFAULT_MAX_ADVANCE_RETRIES: u32 = 3;

/// Upper bound on listing pages read in one run.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Declared count: the number following "of" in the results message.
pub const DEFAULT_COUNT_PATTERN: &str = r"(?i)\bof\s+(\d[\d,]*)";

/// A validated harvest scope.
///
/// Only obtainable through [`HarvestConfig::category`], so holding one means
/// the name is in the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the harvest runs unattended or is being watched by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Automated,
    Interactive,
}

/// Randomized pause taken before every network-facing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtesyDelay {
    pub mode: Mode,
    /// Lower bound in automated mode.
    pub min: Duration,
    /// Upper bound in automated mode.
    pub max: Duration,
    /// Fixed delay in interactive mode.
    pub interactive: Duration,
}

impl Default for CourtesyDelay {
    fn default() -> Self {
        Self {
            mode: Mode::Automated,
            min: Duration::from_millis(10),
            max: Duration::from_millis(1000),
            interactive: Duration::from_millis(500),
        }
    }
}

impl CourtesyDelay {
    /// No delay at all. Used for tests and local fixtures.
    #[must_use]
    pub fn none() -> Self {
        Self {
            mode: Mode::Automated,
            min: Duration::ZERO,
            max: Duration::ZERO,
            interactive: Duration::ZERO,
        }
    }

    /// Draw the next delay.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        match self.mode {
            Mode::Interactive => self.interactive,
            Mode::Automated => {
                let lo = self.min.as_millis() as u64;
                let hi = self.max.as_millis() as u64;
                if hi <= lo {
                    return self.min;
                }
                Duration::from_millis(rand::rng().random_range(lo..=hi))
            }
        }
    }

    /// Sleep for the next delay.
    pub fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Shape every item identifier on the listing must have.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentifierContract {
    /// Required prefix of the absolute URL.
    pub url_prefix: Option<String>,
    /// Required prefix of the final path segment (document name).
    pub document_prefix: Option<String>,
}

impl IdentifierContract {
    /// Check an identifier against the contract.
    ///
    /// # Errors
    /// `HarvesterError::StructuralContractViolation` naming the identifier.
    pub fn check(&self, identifier: &ItemIdentifier) -> Result<()> {
        if let Some(prefix) = &self.url_prefix {
            if !identifier.as_str().starts_with(prefix.as_str()) {
                return Err(HarvesterError::StructuralContractViolation {
                    identifier: identifier.to_string(),
                    expected: format!("URL prefix '{prefix}'"),
                });
            }
        }

        if let Some(prefix) = &self.document_prefix {
            if !identifier.document_name().starts_with(prefix.as_str()) {
                return Err(HarvesterError::StructuralContractViolation {
                    identifier: identifier.to_string(),
                    expected: format!("document name prefix '{prefix}'"),
                });
            }
        }

        Ok(())
    }
}

/// CSS selectors describing where things live on the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    /// Element whose text holds the declared result count.
    pub count_selector: String,
    /// Regex whose first capture group is the declared count.
    pub count_pattern: String,
    /// Anchors linking to item detail pages.
    pub item_link_selector: String,
    /// Anchor to the next listing page.
    pub next_page_selector: String,
    /// Element present on every properly loaded detail page.
    pub detail_marker_selector: String,
    /// Cells of the detail table, each holding `Label: value`.
    pub detail_field_selector: String,
    /// Heading that opens the body block.
    pub body_heading_selector: String,
    /// Text the body heading must contain.
    pub body_heading_text: String,
    /// Tag name ending the body block.
    pub body_boundary_tag: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            count_selector: "p.sr_results_message".to_string(),
            count_pattern: DEFAULT_COUNT_PATTERN.to_string(),
            item_link_selector: ".sr_list_element .link__headline".to_string(),
            next_page_selector: "a[aria-label*='Go to Next Page']".to_string(),
            detail_marker_selector: "#docDetails".to_string(),
            detail_field_selector: "#docDetails td".to_string(),
            body_heading_selector: "h2.policyHead".to_string(),
            body_heading_text: "Policy".to_string(),
            body_boundary_tag: "table".to_string(),
        }
    }
}

/// Immutable configuration for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_origin: Url,
    pub listing_url_template: String,
    pub categories: Vec<String>,
    pub identifier_contract: IdentifierContract,
    pub layout: SiteLayout,
    pub delay: CourtesyDelay,
    pub http_timeout: Duration,
    pub user_agent: String,
    /// Upper bound on concurrent item visits.
    pub workers: usize,
    pub max_advance_retries: u32,
    pub max_pages: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        #[allow(clippy::expect_used)] // Static URL that is guaranteed to be valid
        let base_origin = Url::parse(BASE_ORIGIN).expect("valid base origin");
        Self {
            base_origin,
            listing_url_template: LISTING_URL_TEMPLATE.to_string(),
            categories: ALLOWED_CATEGORIES.iter().map(|c| (*c).to_string()).collect(),
            identifier_contract: IdentifierContract {
                url_prefix: Some(DOCUMENT_URL_PREFIX.to_string()),
                document_prefix: None,
            },
            layout: SiteLayout::default(),
            delay: CourtesyDelay::default(),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            workers: 1,
            max_advance_retries: DEFAULT_MAX_ADVANCE_RETRIES,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl HarvestConfig {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
            base_origin: None,
        }
    }

    /// Validate a category name against the allow-list.
    ///
    /// # Examples
    /// ```
    /// use policy_harvester::config::HarvestConfig;
    ///
    /// let config = HarvestConfig::default();
    /// assert!(config.category("surgery").is_ok());
    /// assert!(config.category("dentistry").is_err());
    /// ```
    pub fn category(&self, name: &str) -> Result<Category> {
        if self.categories.iter().any(|c| c == name) {
            Ok(Category(name.to_string()))
        } else {
            Err(HarvesterError::InvalidCategory {
                name: name.to_string(),
                allowed: self.categories.clone(),
            })
        }
    }

    /// Resolve a category selector, where `all` expands to every allowed category.
    pub fn select_categories(&self, selector: &str) -> Result<Vec<Category>> {
        if selector == ALL_CATEGORIES {
            Ok(self.categories.iter().cloned().map(Category).collect())
        } else {
            Ok(vec![self.category(selector)?])
        }
    }

    /// Listing URL for a category.
    #[must_use]
    pub fn listing_url(&self, category: &Category) -> String {
        self.listing_url_template
            .replace("{category}", category.as_str())
    }
}

/// Builder for [`HarvestConfig`].
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
    base_origin: Option<String>,
}

impl HarvestConfigBuilder {
    pub fn base_origin(mut self, origin: impl Into<String>) -> Self {
        self.base_origin = Some(origin.into());
        self
    }

    pub fn listing_url_template(mut self, template: impl Into<String>) -> Self {
        self.config.listing_url_template = template.into();
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn identifier_contract(mut self, contract: IdentifierContract) -> Self {
        self.config.identifier_contract = contract;
        self
    }

    pub fn layout(mut self, layout: SiteLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn delay(mut self, delay: CourtesyDelay) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.delay.mode = mode;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    pub fn max_advance_retries(mut self, retries: u32) -> Self {
        self.config.max_advance_retries = retries;
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages.max(1);
        self
    }

    /// Finish the configuration.
    ///
    /// # Errors
    /// `HarvesterError::InvalidUrl` if the base origin does not parse.
    pub fn build(self) -> Result<HarvestConfig> {
        let mut config = self.config;
        if let Some(origin) = self.base_origin {
            config.base_origin =
                Url::parse(&origin).map_err(|e| HarvesterError::InvalidUrl(origin.clone(), e))?;
        }
        Ok(config)
    }
}
