//! Visit ledger and lead catalog traits.
//!
//! The ledger is the server of record for unlocks: one [`VisitRecord`] per
//! (user, lead). Implementations must make `record_visit` an atomic upsert so
//! concurrent callers can never produce two rows for the same pair.

use async_trait::async_trait;
use leadgate_core::{
    Lead, LeadId, LeadgateResult, Timestamp, UnlockedLead, UserId, VisitRecord,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Durable, idempotent record of unlock events.
#[async_trait]
pub trait VisitLedger: Send + Sync {
    /// Create or refresh the visit for (user_id, lead_id).
    ///
    /// - No record yet: insert one with `unlocked = true` and both timestamps
    ///   set to `at`.
    /// - Existing record: set `updated_at = at` and `unlocked = true`; the
    ///   row identity and `created_at` are preserved.
    ///
    /// Unknown leads are rejected by the store with `LedgerError::UnknownLead`.
    async fn record_visit(
        &self,
        user_id: UserId,
        lead_id: LeadId,
        at: Timestamp,
    ) -> LeadgateResult<VisitRecord>;

    /// Get the current visit for (user_id, lead_id), if any.
    async fn find_visit(
        &self,
        user_id: UserId,
        lead_id: LeadId,
    ) -> LeadgateResult<Option<VisitRecord>>;

    /// List the user's unlocked visits, most recently refreshed first.
    async fn list_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<VisitRecord>>;

    /// Replace the pitch attached to an existing visit.
    ///
    /// The pitch is normalized with [`leadgate_core::normalize_pitch`]. The
    /// unlock state and recency of the visit are left untouched.
    async fn update_pitch(
        &self,
        user_id: UserId,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord>;

    /// Check if the ledger backend is reachable.
    async fn health_check(&self) -> LeadgateResult<bool>;
}

/// Read-only access to lead display data.
#[async_trait]
pub trait LeadCatalog: Send + Sync {
    /// Get a lead by ID.
    async fn get_lead(&self, lead_id: LeadId) -> LeadgateResult<Option<Lead>>;

    /// Get several leads at once. Missing IDs are skipped.
    async fn get_leads(&self, lead_ids: &[LeadId]) -> LeadgateResult<Vec<Lead>> {
        let mut leads = Vec::with_capacity(lead_ids.len());
        for lead_id in lead_ids {
            if let Some(lead) = self.get_lead(*lead_id).await? {
                leads.push(lead);
            }
        }
        Ok(leads)
    }
}

/// Bulk query feeding the unlocked-leads cache: every lead with an unlocked
/// visit for the user, joined with its display fields, most recent first.
#[async_trait]
pub trait UnlockedLeadsSource: Send + Sync {
    async fn fetch_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>>;
}

#[async_trait]
impl<T: UnlockedLeadsSource + ?Sized> UnlockedLeadsSource for Arc<T> {
    async fn fetch_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>> {
        (**self).fetch_unlocked(user_id).await
    }
}

/// Join unlocked visits with catalog rows, keeping the visit order.
///
/// Locked visits and visits whose lead is missing from the catalog are
/// dropped, so the result only ever names leads that are really unlocked.
pub fn join_unlocked(visits: &[VisitRecord], leads: &[Lead]) -> Vec<UnlockedLead> {
    let by_id: HashMap<LeadId, &Lead> = leads.iter().map(|l| (l.lead_id, l)).collect();
    visits
        .iter()
        .filter(|v| v.unlocked)
        .filter_map(|v| by_id.get(&v.lead_id).map(|lead| UnlockedLead::from_parts(v, lead)))
        .collect()
}

/// Join the ledger with a catalog to serve [`UnlockedLeadsSource`].
///
/// Used when the ledger and the catalog live in different stores; backends
/// that can join natively implement the source trait themselves.
pub struct LedgerJoin<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
}

impl<L, C> LedgerJoin<L, C>
where
    L: VisitLedger,
    C: LeadCatalog,
{
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self { ledger, catalog }
    }
}

#[async_trait]
impl<L, C> UnlockedLeadsSource for LedgerJoin<L, C>
where
    L: VisitLedger,
    C: LeadCatalog,
{
    async fn fetch_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>> {
        let visits = self.ledger.list_unlocked(user_id).await?;
        let lead_ids: Vec<LeadId> = visits.iter().map(|v| v.lead_id).collect();
        let leads = self.catalog.get_leads(&lead_ids).await?;
        Ok(join_unlocked(&visits, &leads))
    }
}
