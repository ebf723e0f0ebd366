//! Leadgate Core - Entity Types
//!
//! Pure data structures shared by every leadgate crate: identifiers, the
//! visit ledger record, the unlocked-lead projection, errors, and timing
//! configuration. This crate contains no I/O.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::{
    LeadgateConfig, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use entities::{
    normalize_pitch, Lead, PitchUpdate, UnlockStatus, UnlockedLead, UnlockedLeadsPage, VisitRecord,
    MAX_PITCH_LEN,
};
pub use error::{
    AuthError, ConfigError, LedgerError, LeadgateError, LeadgateResult, ValidationError,
};
pub use identity::{EntityIdType, LeadId, Timestamp, UserId, VisitId};
