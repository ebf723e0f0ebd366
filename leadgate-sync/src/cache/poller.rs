//! Unlocked-leads cache backed by one poll loop per session.
//!
//! The cache owns a `watch` channel holding the current [`UnlockedLeadsView`].
//! While a session is active a single spawned task ticks every
//! `poll_interval`, fetches the user's unlocked leads, and republishes only
//! when the set of lead IDs (or the loading/error state) changes. Every
//! session gets a fresh generation number; results tagged with an older
//! generation are dropped inside the channel's write lock, so nothing from a
//! previous session can reach subscribers after `stop`.

use chrono::Utc;
use leadgate_core::{
    ConfigError, LeadgateConfig, LeadgateResult, LedgerError, UnlockedLead, UserId,
};
use leadgate_storage::UnlockedLeadsSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use super::snapshot::{UnlockedLeadsSnapshot, UnlockedLeadsView};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Timing for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Interval between fetches; also the staleness bound of the view.
    pub poll_interval: Duration,
    /// Timeout applied to each fetch.
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&LeadgateConfig::default())
    }
}

impl From<&LeadgateConfig> for CacheConfig {
    fn from(config: &LeadgateConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            fetch_timeout: config.fetch_timeout,
        }
    }
}

impl CacheConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Both durations must be positive; `tokio::time::interval` rejects a zero period.
    pub fn validate(&self) -> LeadgateResult<()> {
        for (field, value) in [
            ("poll_interval", self.poll_interval),
            ("fetch_timeout", self.fetch_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: format!("{} must be positive", field),
                }
                .into());
            }
        }
        Ok(())
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for poll loop activity.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Fetches started
    pub polls: AtomicU64,
    /// Fetches that replaced the snapshot
    pub publishes: AtomicU64,
    /// Fetches whose lead set matched the published snapshot
    pub unchanged: AtomicU64,
    /// Fetches that failed (including timeouts)
    pub fetch_errors: AtomicU64,
    /// Fetches that hit `fetch_timeout`
    pub fetch_timeouts: AtomicU64,
    /// Results dropped because their session had ended
    pub stale_dropped: AtomicU64,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub polls: u64,
    pub publishes: u64,
    pub unchanged: u64,
    pub fetch_errors: u64,
    pub fetch_timeouts: u64,
    pub stale_dropped: u64,
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// Handle held by one consumer of the cache.
///
/// Dropping the subscription unsubscribes; the poll loop keeps running for
/// the session regardless of how many subscribers exist.
#[derive(Debug, Clone)]
pub struct UnlockedLeadsSubscription {
    rx: watch::Receiver<UnlockedLeadsView>,
}

impl UnlockedLeadsSubscription {
    /// Current view; marks it as seen for [`Self::changed`].
    pub fn current(&mut self) -> UnlockedLeadsView {
        self.rx.borrow_and_update().clone()
    }

    /// Current view without marking it as seen.
    pub fn peek(&self) -> UnlockedLeadsView {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change.
    ///
    /// Returns `false` once the cache has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Whether a change was published since the view was last seen.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

// ============================================================================
// CACHE
// ============================================================================

struct PollTask {
    user_id: UserId,
    generation: u64,
    refresh: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Process-wide cache of the signed-in user's unlocked leads.
pub struct UnlockedLeadsCache {
    config: CacheConfig,
    tx: Arc<watch::Sender<UnlockedLeadsView>>,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<PollTask>>,
    metrics: Arc<CacheMetrics>,
}

impl UnlockedLeadsCache {
    pub fn new(config: CacheConfig) -> LeadgateResult<Self> {
        config.validate()?;
        let (tx, _rx) = watch::channel(UnlockedLeadsView::idle(0));
        Ok(Self {
            config,
            tx: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
            metrics: Arc::new(CacheMetrics::default()),
        })
    }

    /// Start polling for `user_id`, returning the session generation.
    ///
    /// Starting for the user that is already being polled is a no-op. Starting
    /// for a different user ends the previous session first. Must be called
    /// from within a tokio runtime.
    pub fn start(&self, user_id: UserId, source: Arc<dyn UnlockedLeadsSource>) -> u64 {
        let mut task = self.lock_task();
        if let Some(active) = task.as_ref() {
            if active.user_id == user_id && !active.handle.is_finished() {
                return active.generation;
            }
        }
        if let Some(previous) = task.take() {
            previous.handle.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_replace(UnlockedLeadsView::loading(generation));

        let refresh = Arc::new(Notify::new());
        let poller = Poller {
            user_id,
            generation,
            source,
            config: self.config.clone(),
            tx: Arc::clone(&self.tx),
            current_generation: Arc::clone(&self.generation),
            refresh: Arc::clone(&refresh),
            metrics: Arc::clone(&self.metrics),
        };
        let handle = tokio::spawn(poller.run());

        *task = Some(PollTask {
            user_id,
            generation,
            refresh,
            handle,
        });
        generation
    }

    /// End the session: cancel the poll loop and clear the view.
    pub fn stop(&self) {
        // Generation bump and idle publish happen under the task lock, as in `start`.
        let mut task = self.lock_task();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = task.take() {
            previous.handle.abort();
            tracing::info!(user_id = %previous.user_id, generation = previous.generation, "Unlocked leads session stopped");
        }
        self.tx.send_replace(UnlockedLeadsView::idle(generation));
    }

    /// Ask the poll loop to fetch now instead of waiting for the next tick.
    pub fn refresh_now(&self) {
        if let Some(task) = self.lock_task().as_ref() {
            task.refresh.notify_one();
        }
    }

    pub fn subscribe(&self) -> UnlockedLeadsSubscription {
        UnlockedLeadsSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn current(&self) -> UnlockedLeadsView {
        self.tx.borrow().clone()
    }

    /// User whose leads are being polled, if any.
    pub fn active_user(&self) -> Option<UserId> {
        self.lock_task().as_ref().map(|t| t.user_id)
    }

    pub fn is_polling(&self) -> bool {
        self.lock_task()
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<PollTask>> {
        // The guarded state is a plain handle; a panic elsewhere cannot leave it half-written.
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for UnlockedLeadsCache {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.handle.abort();
        }
    }
}

// ============================================================================
// POLL LOOP
// ============================================================================

struct Poller {
    user_id: UserId,
    generation: u64,
    source: Arc<dyn UnlockedLeadsSource>,
    config: CacheConfig,
    tx: Arc<watch::Sender<UnlockedLeadsView>>,
    current_generation: Arc<AtomicU64>,
    refresh: Arc<Notify>,
    metrics: Arc<CacheMetrics>,
}

enum PollOutcome {
    Published,
    Unchanged,
    Failed,
    Superseded,
}

impl Poller {
    async fn run(self) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            user_id = %self.user_id,
            generation = self.generation,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Unlocked leads poll loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    tracing::debug!(user_id = %self.user_id, "Immediate refresh requested");
                    ticker.reset();
                }
            }

            if let PollOutcome::Superseded = self.poll_once().await {
                break;
            }
        }

        tracing::debug!(user_id = %self.user_id, generation = self.generation, "Poll loop exited");
    }

    async fn poll_once(&self) -> PollOutcome {
        self.metrics.polls.fetch_add(1, Ordering::Relaxed);

        let fetched = match timeout(
            self.config.fetch_timeout,
            self.source.fetch_unlocked(self.user_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.metrics.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
                Err(LedgerError::Timeout {
                    elapsed: self.config.fetch_timeout,
                }
                .into())
            }
        };

        let outcome = self.apply(fetched);
        match outcome {
            PollOutcome::Published => {
                self.metrics.publishes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(user_id = %self.user_id, "Unlocked leads snapshot replaced");
            }
            PollOutcome::Unchanged => {
                self.metrics.unchanged.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(user_id = %self.user_id, "Unlocked leads unchanged");
            }
            PollOutcome::Failed => {
                self.metrics.fetch_errors.fetch_add(1, Ordering::Relaxed);
            }
            PollOutcome::Superseded => {
                self.metrics.stale_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    user_id = %self.user_id,
                    generation = self.generation,
                    "Dropping result from ended session"
                );
            }
        }
        outcome
    }

    /// Fold one fetch result into the published view.
    fn apply(&self, fetched: LeadgateResult<Vec<UnlockedLead>>) -> PollOutcome {
        let mut outcome = PollOutcome::Superseded;
        self.tx.send_if_modified(|view| {
            if self.current_generation.load(Ordering::SeqCst) != self.generation
                || view.generation != self.generation
            {
                return false;
            }

            match fetched {
                Ok(leads) => {
                    let now = Utc::now();
                    let flags_changed = view.loading || view.error.is_some();
                    view.loading = false;
                    view.error = None;
                    view.confirmed_at = Some(now);

                    if view.snapshot.same_leads(&leads) {
                        outcome = PollOutcome::Unchanged;
                        flags_changed
                    } else {
                        view.snapshot = Arc::new(UnlockedLeadsSnapshot::new(leads, now));
                        outcome = PollOutcome::Published;
                        true
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        error = %err,
                        code = %err.code(),
                        "Unlocked leads fetch failed; keeping last snapshot"
                    );
                    let flags_changed = view.loading || view.error.is_none();
                    view.loading = false;
                    view.error = Some(err);
                    outcome = PollOutcome::Failed;
                    flags_changed
                }
            }
        });
        outcome
    }
}
