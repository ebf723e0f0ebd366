//! Consumer-facing unlock session.
//!
//! [`UnlockSession`] binds a caller identity to the unlock operations and
//! drives the unlocked-leads cache: `login` starts the poll loop for the
//! user, `logout` stops it and clears the published view.

use async_trait::async_trait;
use leadgate_core::{
    AuthError, LeadId, LeadgateConfig, LeadgateResult, LedgerError, UnlockStatus,
    UnlockedLead, UserId, VisitRecord,
};
use leadgate_storage::{LeadCatalog, UnlockStatusResolver, UnlockedLeadsSource, VisitLedger};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::cache::{CacheConfig, UnlockedLeadsCache, UnlockedLeadsSubscription};

// ============================================================================
// CALLER IDENTITY
// ============================================================================

/// Identity of the signed-in caller.
///
/// The user ID is the stable identity; the bearer token is only needed by
/// backends that talk to the HTTP surface.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Bearer token, or `AuthError::NoCaller` when none was supplied.
    pub fn bearer(&self) -> LeadgateResult<&str> {
        self.token.as_deref().ok_or_else(|| AuthError::NoCaller.into())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// BACKENDS
// ============================================================================

/// Where the session sends ledger operations.
#[async_trait]
pub trait UnlockBackend: Send + Sync {
    async fn record_visit(&self, caller: &Credentials, lead_id: LeadId)
        -> LeadgateResult<VisitRecord>;

    async fn unlock_status(&self, caller: &Credentials, lead_id: LeadId)
        -> LeadgateResult<UnlockStatus>;

    async fn update_pitch(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord>;

    async fn unlocked_leads(&self, caller: &Credentials) -> LeadgateResult<Vec<UnlockedLead>>;
}

/// In-process backend over a ledger, catalog, and bulk source.
pub struct LocalBackend {
    ledger: Arc<dyn VisitLedger>,
    source: Arc<dyn UnlockedLeadsSource>,
    resolver: UnlockStatusResolver<dyn VisitLedger, dyn LeadCatalog>,
}

impl LocalBackend {
    /// Backend over a single store that implements every storage trait.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: VisitLedger + LeadCatalog + UnlockedLeadsSource + 'static,
    {
        let ledger: Arc<dyn VisitLedger> = store.clone();
        let catalog: Arc<dyn LeadCatalog> = store.clone();
        let source: Arc<dyn UnlockedLeadsSource> = store;
        Self::from_parts(ledger, catalog, source)
    }

    pub fn from_parts(
        ledger: Arc<dyn VisitLedger>,
        catalog: Arc<dyn LeadCatalog>,
        source: Arc<dyn UnlockedLeadsSource>,
    ) -> Self {
        let resolver = UnlockStatusResolver::new(Arc::clone(&ledger), catalog);
        Self {
            ledger,
            source,
            resolver,
        }
    }
}

#[async_trait]
impl UnlockBackend for LocalBackend {
    async fn record_visit(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
    ) -> LeadgateResult<VisitRecord> {
        self.ledger
            .record_visit(caller.user_id, lead_id, chrono::Utc::now())
            .await
    }

    async fn unlock_status(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
    ) -> LeadgateResult<UnlockStatus> {
        self.resolver.resolve(caller.user_id, lead_id).await
    }

    async fn update_pitch(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord> {
        self.ledger.update_pitch(caller.user_id, lead_id, pitch).await
    }

    async fn unlocked_leads(&self, caller: &Credentials) -> LeadgateResult<Vec<UnlockedLead>> {
        self.source.fetch_unlocked(caller.user_id).await
    }
}

/// Adapts a backend plus caller into the cache's fetch source.
struct CallerSource {
    backend: Arc<dyn UnlockBackend>,
    caller: Credentials,
}

#[async_trait]
impl UnlockedLeadsSource for CallerSource {
    async fn fetch_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>> {
        debug_assert_eq!(user_id, self.caller.user_id);
        self.backend.unlocked_leads(&self.caller).await
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// The unlock core as seen by the UI.
pub struct UnlockSession {
    backend: Arc<dyn UnlockBackend>,
    cache: UnlockedLeadsCache,
    caller: RwLock<Option<Credentials>>,
    request_timeout: Duration,
}

impl UnlockSession {
    /// Fails with a config error if `config` does not validate.
    pub fn new(backend: Arc<dyn UnlockBackend>, config: &LeadgateConfig) -> LeadgateResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            cache: UnlockedLeadsCache::new(CacheConfig::from(config))?,
            caller: RwLock::new(None),
            request_timeout: config.request_timeout,
        })
    }

    /// Session over an in-process store.
    pub fn local<S>(store: Arc<S>, config: &LeadgateConfig) -> LeadgateResult<Self>
    where
        S: VisitLedger + LeadCatalog + UnlockedLeadsSource + 'static,
    {
        Self::new(Arc::new(LocalBackend::new(store)), config)
    }

    /// Sign in and start polling unlocked leads for the caller.
    ///
    /// Signing in as a different user ends the previous session first.
    /// Returns the cache generation of the new session.
    pub fn login(&self, credentials: Credentials) -> u64 {
        let user_id = credentials.user_id;
        let source = Arc::new(CallerSource {
            backend: Arc::clone(&self.backend),
            caller: credentials.clone(),
        });

        let mut caller = self.caller.write().unwrap_or_else(|p| p.into_inner());
        // Same user with a new token: the running loop holds the old one.
        if caller
            .as_ref()
            .is_some_and(|c| c.user_id == user_id && c.token != credentials.token)
        {
            self.cache.stop();
        }
        *caller = Some(credentials);
        drop(caller);

        let generation = self.cache.start(user_id, source);
        tracing::info!(%user_id, generation, "Unlock session started");
        generation
    }

    /// Sign out: stop polling and clear the unlocked-leads view.
    pub fn logout(&self) {
        let previous = self.caller.write().unwrap_or_else(|p| p.into_inner()).take();
        self.cache.stop();
        if let Some(caller) = previous {
            tracing::info!(user_id = %caller.user_id, "Unlock session ended");
        }
    }

    pub fn caller(&self) -> Option<Credentials> {
        self.caller.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.caller().is_some()
    }

    /// Record that the caller viewed (and thereby unlocked) a lead.
    ///
    /// Fire-and-forget from the UI's point of view: failures are logged and
    /// returned for optional display, and never affect the cache. On success
    /// the cache is asked to refresh so dashboards pick up the unlock before
    /// the next scheduled poll.
    pub async fn record_visit(&self, lead_id: LeadId) -> LeadgateResult<VisitRecord> {
        let caller = self.require_caller()?;
        match self
            .with_timeout(self.backend.record_visit(&caller, lead_id))
            .await
        {
            Ok(record) => {
                tracing::debug!(user_id = %caller.user_id, %lead_id, "Visit recorded");
                self.cache.refresh_now();
                Ok(record)
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %caller.user_id,
                    %lead_id,
                    error = %err,
                    code = %err.code(),
                    "Failed to record visit"
                );
                Err(err)
            }
        }
    }

    /// Whether a lead is unlocked for the caller, and its revealed value.
    pub async fn resolve_unlock_status(&self, lead_id: LeadId) -> LeadgateResult<UnlockStatus> {
        let caller = self.require_caller()?;
        self.with_timeout(self.backend.unlock_status(&caller, lead_id))
            .await
    }

    /// Subscribe to the shared unlocked-leads view.
    pub fn subscribe_to_unlocked_leads(&self) -> LeadgateResult<UnlockedLeadsSubscription> {
        self.require_caller()?;
        Ok(self.cache.subscribe())
    }

    /// Replace the pitch on a visited lead.
    ///
    /// The cache republishes on id-set changes only, so the new pitch shows up
    /// in the unlocked-leads view with the next unlock or lock.
    pub async fn update_pitch(
        &self,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord> {
        let caller = self.require_caller()?;
        self.with_timeout(self.backend.update_pitch(&caller, lead_id, pitch))
            .await
    }

    pub fn cache(&self) -> &UnlockedLeadsCache {
        &self.cache
    }

    fn require_caller(&self) -> LeadgateResult<Credentials> {
        self.caller().ok_or_else(|| AuthError::NoCaller.into())
    }

    async fn with_timeout<T>(
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
