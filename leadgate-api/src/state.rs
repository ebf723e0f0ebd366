//! Shared application state for Axum routers.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leadgate_core::{LeadgateResult, LedgerError};
use leadgate_storage::{LeadCatalog, UnlockStatusResolver, UnlockedLeadsSource, VisitLedger};

/// Resolver over type-erased storage.
pub type LedgerResolver = UnlockStatusResolver<dyn VisitLedger, dyn LeadCatalog>;

/// Application-wide state shared across all routes.
///
/// Storage is held behind trait objects so the same router serves the
/// Postgres ledger in production and the in-memory ledger in tests.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn VisitLedger>,
    pub source: Arc<dyn UnlockedLeadsSource>,
    pub resolver: LedgerResolver,
    pub start_time: Instant,
    /// Upper bound on any single ledger call made by a handler.
    pub request_timeout: Duration,
}

impl AppState {
    /// State over a single store implementing every storage trait.
    pub fn new<S>(store: Arc<S>, request_timeout: Duration) -> Self
    where
        S: VisitLedger + LeadCatalog + UnlockedLeadsSource + 'static,
    {
        let ledger: Arc<dyn VisitLedger> = store.clone();
        let catalog: Arc<dyn LeadCatalog> = store.clone();
        let source: Arc<dyn UnlockedLeadsSource> = store;
        Self::from_parts(ledger, catalog, source, request_timeout)
    }

    pub fn from_parts(
        ledger: Arc<dyn VisitLedger>,
        catalog: Arc<dyn LeadCatalog>,
        source: Arc<dyn UnlockedLeadsSource>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            resolver: UnlockStatusResolver::new(Arc::clone(&ledger), catalog),
            ledger,
            source,
            start_time: Instant::now(),
            request_timeout,
        }
    }

    /// Run a ledger call under the request timeout.
    pub async fn bounded<T>(
        &self,
        fut: impl Future<Output = LeadgateResult<T>>,
    ) -> LeadgateResult<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| LedgerError::Timeout {
                elapsed: self.request_timeout,
            })?
    }
}
