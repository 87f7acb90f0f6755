//! Item visits in isolated browsing contexts.
//!
//! Each visit leases one context from a [`ContextPool`] for its whole
//! duration. The lease returns the context when dropped, so the context is
//! released on success, failure and unwinding alike, and the listing's own
//! session is never touched by a visit.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, PoisonError};

use reqwest::blocking::Client;

use crate::config::{CourtesyDelay, HarvestConfig};
use crate::content::DetailExtractor;
use crate::error::{FetchFailure, Result};
use crate::http::{create_client, download_text};
use crate::types::{ItemIdentifier, RawItemPayload, Record};

/// Loads a single item's detail page.
pub trait ItemFetcher: Sync {
    /// Isolated session state a visit owns exclusively.
    type Context: Send;

    /// Create a fresh context.
    fn new_context(&self) -> Result<Self::Context>;

    /// Load the item's raw document.
    fn fetch(
        &self,
        context: &mut Self::Context,
        identifier: &ItemIdentifier,
    ) -> std::result::Result<RawItemPayload, FetchFailure>;
}

/// Fixed set of contexts shared by concurrent visits.
pub struct ContextPool<C> {
    idle: Mutex<Vec<C>>,
    returned: Condvar,
    size: usize,
}

impl<C> ContextPool<C> {
    #[must_use]
    pub fn new(contexts: Vec<C>) -> Self {
        let size = contexts.len();
        Self {
            idle: Mutex::new(contexts),
            returned: Condvar::new(),
            size,
        }
    }

    /// Total number of contexts owned by the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Contexts not currently leased.
    #[must_use]
    pub fn available(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Lease a context, waiting until one is returned if all are in use.
    pub fn acquire(&self) -> ContextLease<'_, C> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(context) = idle.pop() {
                return ContextLease {
                    pool: self,
                    context: Some(context),
                };
            }
            idle = self
                .returned
                .wait(idle)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release(&self, context: C) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context);
        self.returned.notify_one();
    }
}

/// Exclusive use of one pooled context.
pub struct ContextLease<'a, C> {
    pool: &'a ContextPool<C>,
    context: Option<C>,
}

impl<C> Deref for ContextLease<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `drop` takes the context out.
        #[allow(clippy::expect_used)]
        self.context.as_ref().expect("lease holds a context until dropped")
    }
}

impl<C> DerefMut for ContextLease<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        #[allow(clippy::expect_used)]
        self.context.as_mut().expect("lease holds a context until dropped")
    }
}

impl<C> Drop for ContextLease<'_, C> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.release(context);
        }
    }
}

/// Visits items and turns their pages into records.
pub struct ItemVisitor<F: ItemFetcher> {
    fetcher: F,
    pool: ContextPool<F::Context>,
    extractor: DetailExtractor,
    delay: CourtesyDelay,
}

impl<F: ItemFetcher> ItemVisitor<F> {
    /// Create a visitor with one context per configured worker.
    pub fn new(fetcher: F, config: &HarvestConfig) -> Result<Self> {
        let contexts = (0..config.workers.max(1))
            .map(|_| fetcher.new_context())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            fetcher,
            pool: ContextPool::new(contexts),
            extractor: DetailExtractor::new(&config.layout)?,
            delay: config.delay.clone(),
        })
    }

    /// Visit one item.
    pub fn visit(&self, identifier: &ItemIdentifier) -> std::result::Result<Record, FetchFailure> {
        self.delay.pause();
        let payload = {
            let mut context = self.pool.acquire();
            self.fetcher.fetch(&mut context, identifier)?
        };
        self.extractor.extract(&payload)
    }

    #[must_use]
    pub fn pool(&self) -> &ContextPool<F::Context> {
        &self.pool
    }

    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

/// Fetches detail pages over HTTP; each context is a separate client.
pub struct HttpItemFetcher {
    config: HarvestConfig,
}

impl HttpItemFetcher {
    #[must_use]
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl ItemFetcher for HttpItemFetcher {
    type Context = Client;

    fn new_context(&self) -> Result<Client> {
        create_client(&self.config)
    }

    fn fetch(
        &self,
        client: &mut Client,
        identifier: &ItemIdentifier,
    ) -> std::result::Result<RawItemPayload, FetchFailure> {
        let html = download_text(client, identifier.as_str()).map_err(FetchFailure::from)?;
        Ok(RawItemPayload {
            identifier: identifier.clone(),
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    struct StaticFetcher;

    impl ItemFetcher for StaticFetcher {
        type Context = u32;

        fn new_context(&self) -> Result<u32> {
            Ok(0)
        }

        fn fetch(
            &self,
            uses: &mut u32,
            identifier: &ItemIdentifier,
        ) -> std::result::Result<RawItemPayload, FetchFailure> {
            *uses += 1;
            if identifier.as_str().ends_with("slow.html") {
                return Err(FetchFailure::Timeout);
            }
            Ok(RawItemPayload {
                identifier: identifier.clone(),
                html: r#"<table id="docDetails"><tr><td>Subject: Static</td></tr></table>"#
                    .to_string(),
            })
        }
    }

    fn visitor(workers: usize) -> ItemVisitor<StaticFetcher> {
        let config = HarvestConfig::builder()
            .delay(CourtesyDelay::none())
            .workers(workers)
            .build()
            .unwrap();
        ItemVisitor::new(StaticFetcher, &config).unwrap()
    }

    #[test]
    fn test_visit_returns_record() {
        let visitor = visitor(1);
        let record = visitor
            .visit(&ItemIdentifier::new("https://example.org/a.html"))
            .unwrap();
        assert_eq!(record.subject.as_deref(), Some("Static"));
        assert_eq!(visitor.pool().available(), 1);
    }

    #[test]
    fn test_context_released_after_failure() {
        let visitor = visitor(2);
        let result = visitor.visit(&ItemIdentifier::new("https://example.org/slow.html"));
        assert_eq!(result, Err(FetchFailure::Timeout));
        assert_eq!(visitor.pool().available(), 2);
    }

    #[test]
    fn test_context_released_on_panic() {
        let pool = ContextPool::new(vec![1u8]);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _lease = pool.acquire();
            panic!("visit blew up");
        }));
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_leases_are_exclusive() {
        let pool = ContextPool::new(vec![10u32, 20u32]);
        let first = pool.acquire();
        let second = pool.acquire();
        assert_ne!(*first, *second);
        assert_eq!(pool.available(), 0);
        drop(first);
        assert_eq!(pool.available(), 1);
        drop(second);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.available(), 2);
    }
}
