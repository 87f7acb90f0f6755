//! End-to-end tests of the harvest engine against a mock site.
//!
//! The site serves a two-page listing and one detail page per policy. The
//! blocking engine runs on the test thread while the mock server runs on
//! its own runtime.

use std::fs;
use std::path::Path;

use policy_harvester::completeness::Completeness;
use policy_harvester::config::{
    CourtesyDelay, HarvestConfig, HarvestConfigBuilder, IdentifierContract,
};
use policy_harvester::error::{FetchFailure, HarvesterError};
use policy_harvester::harvester::HarvestEngine;
use policy_harvester::sink::{load_records, JsonFileSink, ResultSink};
use pretty_assertions::assert_eq;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DETAIL_PATH: &str = "/cpb/medical/data/1_99";
const FIRST_PAGE: &str = "/search?query=surgery";
const SECOND_PAGE: &str = "/search?query=surgery&amp;page=2";

/// Load fixture file content.
fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

fn detail_page(subject: &str, number: &str) -> String {
    load_fixture("detail.html")
        .replace("{{subject}}", subject)
        .replace("{{number}}", number)
}

/// A listing page with the given item links and an optional next page.
fn listing_page(declared: u64, links: &[String], next: Option<&str>) -> String {
    let message = format!("Showing results 1 - 10 of {declared} results");
    listing_page_with_message(&message, links, next)
}

fn listing_page_with_message(message: &str, links: &[String], next: Option<&str>) -> String {
    let items: String = links
        .iter()
        .map(|href| {
            format!(
                r#"<div class="sr_list_element"><a class="link__headline" href="{href}">Policy</a></div>"#
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a aria-label="Go to Next Page" href="{href}">Next</a>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
             <p class="sr_results_message">{message}</p>
             <div class="results">{items}</div>
             <nav class="pagination">{next}</nav>
           </body></html>"#
    )
}

fn detail_href(number: &str) -> String {
    format!("{DETAIL_PATH}/{number}.html")
}

/// Mock site with the given policies split over two listing pages.
struct MockSite {
    server: MockServer,
    runtime: Runtime,
}

impl MockSite {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn listing(&self, declared: u64, page_one: &[String], page_two: &[String]) {
        let first = listing_page(declared, page_one, Some(SECOND_PAGE));
        let second = listing_page(declared, page_two, None);
        self.pages(
            ResponseTemplate::new(200).set_body_string(first),
            ResponseTemplate::new(200).set_body_string(second),
        );
    }

    /// Mount the first and second listing page responses.
    fn pages(&self, first: ResponseTemplate, second: ResponseTemplate) {
        self.runtime.block_on(async {
            Mock::given(method("GET"))
                .and(path("/search"))
                .and(query_param("page", "2"))
                .respond_with(second)
                .with_priority(1)
                .mount(&self.server)
                .await;

            Mock::given(method("GET"))
                .and(path("/search"))
                .and(query_param("query", "surgery"))
                .respond_with(first)
                .mount(&self.server)
                .await;
        });
    }

    /// Requests received for listing pages, as `(page 1, page 2)` counts.
    fn listing_requests(&self) -> (usize, usize) {
        let requests = self
            .runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default();
        let listing: Vec<_> = requests
            .iter()
            .filter(|r| r.url.path() == "/search")
            .collect();
        let second = listing
            .iter()
            .filter(|r| r.url.query().is_some_and(|q| q.contains("page=2")))
            .count();
        (listing.len() - second, second)
    }

    fn detail(&self, number: &str, subject: &str) {
        let body = detail_page(subject, number);
        self.runtime.block_on(
            Mock::given(method("GET"))
                .and(path(detail_href(number)))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&self.server),
        );
    }

    fn missing(&self, number: &str) {
        self.runtime.block_on(
            Mock::given(method("GET"))
                .and(path(detail_href(number)))
                .respond_with(ResponseTemplate::new(404))
                .mount(&self.server),
        );
    }

    fn config(&self, workers: usize) -> HarvestConfig {
        self.config_builder(workers).build().unwrap()
    }

    fn config_builder(&self, workers: usize) -> HarvestConfigBuilder {
        let uri = self.server.uri();
        HarvestConfig::builder()
            .base_origin(uri.clone())
            .listing_url_template(format!("{uri}/search?query={{category}}"))
            .identifier_contract(IdentifierContract {
                url_prefix: Some(format!("{uri}{DETAIL_PATH}/")),
                document_prefix: None,
            })
            .delay(CourtesyDelay::none())
            .workers(workers)
    }
}

#[test]
fn test_harvest_two_pages_complete() {
    let site = MockSite::start();
    site.listing(
        3,
        &[detail_href("0001"), detail_href("0002")],
        &[detail_href("0003")],
    );
    site.detail("0001", "Acupuncture");
    site.detail("0002", "Bariatric Surgery");
    site.detail("0003", "Cochlear Implants");

    let config = site.config(1);
    let category = config.category("surgery").unwrap();
    let report = HarvestEngine::http(&config)
        .unwrap()
        .harvest(&category)
        .unwrap();

    assert_eq!(report.declared_count, 3);
    assert_eq!(report.pages_seen, 2);
    assert_eq!(report.completeness, Completeness::Completed);
    assert!(report.is_clean());

    let subjects: Vec<_> = report.records.iter().map(|r| r.label().to_string()).collect();
    assert_eq!(
        subjects,
        vec!["Acupuncture", "Bariatric Surgery", "Cochlear Implants"]
    );

    let record = &report.records[1];
    assert_eq!(record.document_number.as_deref(), Some("0002"));
    assert_eq!(record.status.as_deref(), Some("Revised"));
    assert!(record.body_text.contains("Conservative therapy has failed"));
    assert!(!record.body_text.contains("<strong>"));
    assert!(!record.body_text.contains("CPT 99999"));
    assert!(!record.body_text.contains("Background text"));
}

#[test]
fn test_harvest_parallel_keeps_order_and_counts_missing_page() {
    let site = MockSite::start();
    let page_one: Vec<String> = ["0001", "0002", "0003", "0004"]
        .iter()
        .map(|n| detail_href(n))
        .collect();
    site.listing(5, &page_one, &[detail_href("0005")]);
    for number in ["0001", "0002", "0004", "0005"] {
        site.detail(number, &format!("Policy {number}"));
    }
    site.missing("0003");

    let config = site.config(3);
    let category = config.category("surgery").unwrap();
    let report = HarvestEngine::http(&config)
        .unwrap()
        .harvest(&category)
        .unwrap();

    assert!(report.aborted.is_none());
    assert_eq!(report.visited.len(), 5);
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].identifier.as_str().ends_with("0003.html"));
    assert!(matches!(report.failures[0].failure, FetchFailure::NotFound(_)));
    assert_eq!(report.completeness, Completeness::Completed);

    let numbers: Vec<_> = report
        .records
        .iter()
        .filter_map(|r| r.document_number.clone())
        .collect();
    assert_eq!(numbers, vec!["0001", "0002", "0004", "0005"]);
}

#[test]
fn test_harvest_aborts_on_foreign_identifier_and_keeps_records() {
    let site = MockSite::start();
    site.listing(
        3,
        &[detail_href("0001"), detail_href("0002")],
        &["/news/press-release.html".to_string()],
    );
    site.detail("0001", "Acupuncture");
    site.detail("0002", "Bariatric Surgery");

    let config = site.config(1);
    let category = config.category("surgery").unwrap();
    let report = HarvestEngine::http(&config)
        .unwrap()
        .harvest(&category)
        .unwrap();

    match &report.aborted {
        Some(HarvesterError::StructuralContractViolation { identifier, .. }) => {
            assert!(identifier.ends_with("/news/press-release.html"));
        }
        other => panic!("expected structural violation, got {other:?}"),
    }
    assert_eq!(report.records.len(), 2);
    assert_eq!(
        report.completeness,
        Completeness::PartialWithGap {
            declared: 3,
            visited: 2,
            missing: 1
        }
    );

    // Collected records still reach the sink.
    let dir = tempfile::tempdir().unwrap();
    let mut sink = JsonFileSink::new(dir.path());
    let path = sink.append(&category, &report.records).unwrap();
    assert_eq!(load_records(&path).unwrap().len(), 2);
}

#[test]
fn test_harvest_missing_declared_count_fails_to_open() {
    let site = MockSite::start();
    site.runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>Maintenance</body></html>"),
            )
            .mount(&site.server),
    );

    let config = site.config(1);
    let category = config.category("surgery").unwrap();
    let result = HarvestEngine::http(&config).unwrap().harvest(&category);
    assert!(matches!(
        result,
        Err(HarvesterError::MissingDeclaredCount { .. })
    ));
}

#[test]
fn test_harvest_page_range_without_total_fails_to_open() {
    let site = MockSite::start();
    let page = listing_page_with_message(
        "Showing results 1 - 2",
        &[detail_href("0001"), detail_href("0002")],
        None,
    );
    site.pages(
        ResponseTemplate::new(200).set_body_string(page),
        ResponseTemplate::new(404),
    );

    let config = site.config(1);
    let category = config.category("surgery").unwrap();
    let result = HarvestEngine::http(&config).unwrap().harvest(&category);
    assert!(matches!(
        result,
        Err(HarvesterError::MissingDeclaredCount { .. })
    ));
}

#[test]
fn test_harvest_stops_when_next_page_wraps_to_first() {
    let site = MockSite::start();
    let first = listing_page(2, &[detail_href("0001")], Some(SECOND_PAGE));
    let second = listing_page(2, &[detail_href("0002")], Some(FIRST_PAGE));
    site.pages(
        ResponseTemplate::new(200).set_body_string(first),
        ResponseTemplate::new(200).set_body_string(second),
    );
    site.detail("0001", "Acupuncture");
    site.detail("0002", "Bariatric Surgery");

    let config = site.config(1);
    let category = config.category("surgery").unwrap();
    let report = HarvestEngine::http(&config)
        .unwrap()
        .harvest(&category)
        .unwrap();

    assert!(report.aborted.is_none());
    assert_eq!(report.pages_seen, 2);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.completeness, Completeness::Completed);
    assert_eq!(site.listing_requests(), (1, 1));
}

#[test]
fn test_harvest_gives_up_on_unavailable_next_page() {
    let site = MockSite::start();
    let first = listing_page(2, &[detail_href("0001")], Some(SECOND_PAGE));
    site.pages(
        ResponseTemplate::new(200).set_body_string(first),
        ResponseTemplate::new(503),
    );
    site.detail("0001", "Acupuncture");

    let config = site.config_builder(1).max_advance_retries(1).build().unwrap();
    let category = config.category("surgery").unwrap();
    let report = HarvestEngine::http(&config)
        .unwrap()
        .harvest(&category)
        .unwrap();

    assert!(report.aborted.is_none());
    assert_eq!(report.pages_seen, 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(
        report.completeness,
        Completeness::PartialWithGap {
            declared: 2,
            visited: 1,
            missing: 1
        }
    );
    // Two advance attempts, each with three HTTP attempts.
    assert_eq!(site.listing_requests(), (1, 6));
}
