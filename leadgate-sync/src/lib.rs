//! Leadgate Sync - Client-Side Unlock State
//!
//! Keeps a client's view of unlocked leads converged with the ledger:
//! - [`cache`]: one poll loop per session publishing a diffed snapshot
//! - [`session`]: the consumer facade binding caller identity to operations
//! - [`api_client`]: REST backend for sessions running against leadgate-api

pub mod api_client;
pub mod cache;
pub mod session;

pub use api_client::{ApiClient, ApiClientError};
pub use cache::{
    CacheConfig, CacheMetricsSnapshot, LeadIdMultiset, UnlockedLeadsCache, UnlockedLeadsSnapshot,
    UnlockedLeadsSubscription, UnlockedLeadsView,
};
pub use session::{Credentials, LocalBackend, UnlockBackend, UnlockSession};
