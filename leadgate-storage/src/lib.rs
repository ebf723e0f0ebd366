//! Leadgate Storage - Visit Ledger
//!
//! Storage abstraction for the unlock core: the [`VisitLedger`] trait, the
//! read-only [`LeadCatalog`] it joins against, an in-memory implementation,
//! and the single-lead [`UnlockStatusResolver`]. The Postgres implementation
//! lives in leadgate-api.

pub mod ledger;
pub mod memory;
pub mod resolver;

pub use ledger::{join_unlocked, LeadCatalog, LedgerJoin, UnlockedLeadsSource, VisitLedger};
pub use memory::InMemoryLedger;
pub use resolver::UnlockStatusResolver;
