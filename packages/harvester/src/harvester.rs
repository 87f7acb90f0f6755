//! Harvest engine: drives the listing, visits items and verifies completeness.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use crate::completeness::{verify, Completeness};
use crate::config::{Category, HarvestConfig};
use crate::error::{FetchFailure, HarvesterError, Result};
use crate::listing::{HttpListing, PageSource};
use crate::types::{ItemIdentifier, Record};
use crate::visitor::{HttpItemFetcher, ItemFetcher, ItemVisitor};

/// Shared flag for cancelling a run from outside the engine.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An item that was visited but produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFetch {
    pub identifier: ItemIdentifier,
    pub failure: FetchFailure,
}

/// Everything a harvest run produced.
///
/// Returned even when the run was aborted, so collected records are never
/// lost.
#[derive(Debug)]
pub struct HarvestReport {
    pub category: Category,
    pub declared_count: u64,
    pub pages_seen: usize,
    /// Visited identifiers in first-seen order.
    pub visited: Vec<ItemIdentifier>,
    /// Records in first-seen order.
    pub records: Vec<Record>,
    pub failures: Vec<FailedFetch>,
    pub completeness: Completeness,
    /// Why the run stopped early, if it did.
    pub aborted: Option<HarvesterError>,
}

impl HarvestReport {
    /// Completed without abort, gap or failed fetches.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.completeness.is_complete() && self.failures.is_empty()
    }
}

/// State of one category's run, owned by the driving worker.
struct HarvestRun {
    seen: HashSet<ItemIdentifier>,
    visited: Vec<ItemIdentifier>,
    records: Vec<Record>,
    failures: Vec<FailedFetch>,
    pages_seen: usize,
}

impl HarvestRun {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            visited: Vec::new(),
            records: Vec::new(),
            failures: Vec::new(),
            pages_seen: 0,
        }
    }

    /// Identifiers from a page not seen before, in page order, without
    /// in-page duplicates.
    fn fresh(&self, identifiers: Vec<ItemIdentifier>) -> Vec<ItemIdentifier> {
        let mut on_page = HashSet::new();
        identifiers
            .into_iter()
            .filter(|id| !self.seen.contains(id) && on_page.insert(id.clone()))
            .collect()
    }

    fn record(
        &mut self,
        identifier: ItemIdentifier,
        outcome: std::result::Result<Record, FetchFailure>,
    ) {
        match outcome {
            Ok(record) => {
                tracing::debug!(url = %identifier, subject = ?record.subject, "Visited item");
                self.records.push(record);
            }
            Err(failure) => {
                tracing::warn!(url = %identifier, error = %failure, "Item fetch failed");
                self.failures.push(FailedFetch {
                    identifier: identifier.clone(),
                    failure,
                });
            }
        }
        self.seen.insert(identifier.clone());
        self.visited.push(identifier);
    }
}

/// Drives one category at a time through a listing and visitor.
pub struct HarvestEngine<P: PageSource, F: ItemFetcher> {
    config: HarvestConfig,
    source: P,
    visitor: ItemVisitor<F>,
    cancel: CancellationFlag,
}

impl HarvestEngine<HttpListing, HttpItemFetcher> {
    /// Engine over the default HTTP listing and fetcher.
    pub fn http(config: &HarvestConfig) -> Result<Self> {
        Self::new(
            config.clone(),
            HttpListing::new(config)?,
            HttpItemFetcher::new(config),
        )
    }
}

impl<P: PageSource, F: ItemFetcher> HarvestEngine<P, F> {
    pub fn new(config: HarvestConfig, source: P, fetcher: F) -> Result<Self> {
        let visitor = ItemVisitor::new(fetcher, &config)?;
        Ok(Self {
            config,
            source,
            visitor,
            cancel: CancellationFlag::new(),
        })
    }

    /// Use an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling runs of this engine.
    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Harvest every item of a category.
    ///
    /// Only fails if the listing cannot be opened. Later failures end the run
    /// early and are reported in [`HarvestReport::aborted`] alongside the
    /// records collected so far.
    pub fn harvest(&mut self, category: &Category) -> Result<HarvestReport> {
        self.config.delay.pause();
        let declared_count = self.source.open_listing(category)?;

        let mut run = HarvestRun::new();
        let aborted = self.drive(&mut run).err();
        if let Some(err) = &aborted {
            tracing::error!(category = %category, error = %err, "Harvest aborted");
        }

        let completeness = verify(run.visited.len(), declared_count);
        match completeness {
            Completeness::Completed => tracing::info!(
                category = %category,
                visited = run.visited.len(),
                declared = declared_count,
                "Harvest complete"
            ),
            Completeness::PartialWithGap {
                declared,
                visited,
                missing,
            } => tracing::warn!(
                category = %category,
                visited,
                declared,
                missing,
                "Visited count does not match declared count"
            ),
        }

        Ok(HarvestReport {
            category: category.clone(),
            declared_count,
            pages_seen: run.pages_seen,
            visited: run.visited,
            records: run.records,
            failures: run.failures,
            completeness,
            aborted,
        })
    }

    fn drive(&mut self, run: &mut HarvestRun) -> Result<()> {
        loop {
            self.check_cancelled()?;

            let identifiers = self.source.current_page_identifiers()?;
            run.pages_seen += 1;

            // A malformed identifier means the listing filter is wrong;
            // stop before visiting anything on this page.
            for identifier in &identifiers {
                self.config.identifier_contract.check(identifier)?;
            }

            let fresh = run.fresh(identifiers);
            tracing::debug!(page = run.pages_seen, new_items = fresh.len(), "Processing page");
            self.visit_page(fresh, run)?;

            if run.pages_seen >= self.config.max_pages {
                tracing::warn!(
                    pages = run.pages_seen,
                    "Page limit reached, stopping pagination"
                );
                return Ok(());
            }

            self.config.delay.pause();
            if !self.source.advance_page()? {
                tracing::debug!(pages = run.pages_seen, "No further pages");
                return Ok(());
            }
        }
    }

    fn visit_page(&self, fresh: Vec<ItemIdentifier>, run: &mut HarvestRun) -> Result<()> {
        if self.config.workers <= 1 || fresh.len() <= 1 {
            for identifier in fresh {
                self.check_cancelled()?;
                let outcome = self.visitor.visit(&identifier);
                run.record(identifier, outcome);
            }
            return Ok(());
        }

        let outcomes = self.visit_parallel(&fresh);
        for (identifier, outcome) in fresh.into_iter().zip(outcomes) {
            // `None` means cancellation stopped the item from being dispatched.
            if let Some(outcome) = outcome {
                run.record(identifier, outcome);
            }
        }
        self.check_cancelled()
    }

    /// Visit on up to `workers` threads; results come back over a channel
    /// and are placed by index, so page order is kept.
    fn visit_parallel(
        &self,
        fresh: &[ItemIdentifier],
    ) -> Vec<Option<std::result::Result<Record, FetchFailure>>> {
        let workers = self.config.workers.min(fresh.len());
        let next = AtomicUsize::new(0);
        let mut outcomes: Vec<Option<std::result::Result<Record, FetchFailure>>> =
            (0..fresh.len()).map(|_| None).collect();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let visitor = &self.visitor;
                let cancel = &self.cancel;
                scope.spawn(move || loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(identifier) = fresh.get(index) else {
                        break;
                    };
                    if tx.send((index, visitor.visit(identifier))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (index, outcome) in rx {
                outcomes[index] = Some(outcome);
            }
        });

        outcomes
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(HarvesterError::Cancelled)
        } else {
            Ok(())
        }
    }
}
