//! Unlocked-leads cache.
//!
//! One poll loop per session keeps a shared snapshot of the user's unlocked
//! leads and publishes it to subscribers only when it changes:
//!
//! ```ignore
//! let cache = UnlockedLeadsCache::new(CacheConfig::default())?;
//! cache.start(user_id, source);
//!
//! let mut sub = cache.subscribe();
//! while sub.changed().await {
//!     let view = sub.current();
//!     render(view.recent(5), view.loading, view.error.as_ref());
//! }
//! ```

pub mod poller;
pub mod snapshot;

pub use poller::{
    CacheConfig, CacheMetrics, CacheMetricsSnapshot, UnlockedLeadsCache,
    UnlockedLeadsSubscription,
};
pub use snapshot::{LeadIdMultiset, UnlockedLeadsSnapshot, UnlockedLeadsView, UNKNOWN_INDUSTRY};
