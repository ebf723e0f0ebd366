//! In-memory ledger and catalog.
//!
//! Backs tests and single-process deployments. Every mutation runs under one
//! write lock, which makes `record_visit` an atomic upsert keyed on
//! (user_id, lead_id).

use async_trait::async_trait;
use leadgate_core::{
    normalize_pitch, Lead, LeadId, LedgerError, LeadgateResult, Timestamp, UnlockedLead, UserId,
    VisitRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use crate::ledger::{join_unlocked, LeadCatalog, UnlockedLeadsSource, VisitLedger};

type VisitKey = (UserId, LeadId);

/// In-memory visit ledger and lead catalog.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    visits: RwLock<HashMap<VisitKey, VisitRecord>>,
    leads: RwLock<HashMap<LeadId, Lead>>,
    /// When set, every operation fails as if the backend were down.
    offline: AtomicBool,
    /// Number of `fetch_unlocked` calls served.
    bulk_reads: AtomicU64,
}

impl InMemoryLedger {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with catalog entries.
    pub fn with_leads(leads: impl IntoIterator<Item = Lead>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.leads.write() {
            map.extend(leads.into_iter().map(|l| (l.lead_id, l)));
        }
        store
    }

    /// Add or replace a catalog entry.
    pub fn insert_lead(&self, lead: Lead) -> LeadgateResult<()> {
        let mut leads = self.leads.write().map_err(|_| LedgerError::lock_poisoned())?;
        leads.insert(lead.lead_id, lead);
        Ok(())
    }

    /// Store a record verbatim, replacing any record for the same pair.
    ///
    /// Intended for seeding rows written outside `record_visit`, such as
    /// imported visits that were never unlocked.
    pub fn insert_record(&self, record: VisitRecord) -> LeadgateResult<()> {
        let mut visits = self.visits.write().map_err(|_| LedgerError::lock_poisoned())?;
        visits.insert(record.key(), record);
        Ok(())
    }

    /// Toggle simulated backend outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of ledger rows across all users.
    pub fn visit_count(&self) -> usize {
        self.visits.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Number of ledger rows for one user.
    pub fn visit_count_for(&self, user_id: UserId) -> usize {
        self.visits
            .read()
            .map(|v| v.keys().filter(|(u, _)| *u == user_id).count())
            .unwrap_or(0)
    }

    /// Number of bulk unlocked-lead reads served so far.
    pub fn bulk_read_count(&self) -> u64 {
        self.bulk_reads.load(Ordering::SeqCst)
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        if let Ok(mut visits) = self.visits.write() {
            visits.clear();
        }
        if let Ok(mut leads) = self.leads.write() {
            leads.clear();
        }
    }

    fn ensure_online(&self) -> LeadgateResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable {
                reason: "in-memory ledger is offline".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn unlocked_sorted(&self, user_id: UserId) -> LeadgateResult<Vec<VisitRecord>> {
        let visits = self.visits.read().map_err(|_| LedgerError::lock_poisoned())?;
        let mut unlocked: Vec<VisitRecord> = visits
            .values()
            .filter(|v| v.user_id == user_id && v.unlocked)
            .cloned()
            .collect();
        unlocked.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(unlocked)
    }
}

#[async_trait]
impl VisitLedger for InMemoryLedger {
    async fn record_visit(
        &self,
        user_id: UserId,
        lead_id: LeadId,
        at: Timestamp,
    ) -> LeadgateResult<VisitRecord> {
        self.ensure_online()?;

        let lead_exists = self
            .leads
            .read()
            .map_err(|_| LedgerError::lock_poisoned())?
            .contains_key(&lead_id);
        if !lead_exists {
            return Err(LedgerError::UnknownLead { lead_id }.into());
        }

        let mut visits = self.visits.write().map_err(|_| LedgerError::lock_poisoned())?;
        let record = visits
            .entry((user_id, lead_id))
            .and_modify(|existing| existing.refresh(at))
            .or_insert_with(|| VisitRecord::first_visit(user_id, lead_id, at));

        tracing::trace!(%user_id, %lead_id, visit_id = %record.visit_id, "Visit recorded");
        Ok(record.clone())
    }

    async fn find_visit(
        &self,
        user_id: UserId,
        lead_id: LeadId,
    ) -> LeadgateResult<Option<VisitRecord>> {
        self.ensure_online()?;
        let visits = self.visits.read().map_err(|_| LedgerError::lock_poisoned())?;
        Ok(visits.get(&(user_id, lead_id)).cloned())
    }

    async fn list_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<VisitRecord>> {
        self.ensure_online()?;
        self.unlocked_sorted(user_id)
    }

    async fn update_pitch(
        &self,
        user_id: UserId,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord> {
        self.ensure_online()?;
        let pitch = normalize_pitch(pitch)?;

        let mut visits = self.visits.write().map_err(|_| LedgerError::lock_poisoned())?;
        let record = visits
            .get_mut(&(user_id, lead_id))
            .ok_or(LedgerError::VisitNotFound { user_id, lead_id })?;
        record.pitch = pitch;
        Ok(record.clone())
    }

    async fn health_check(&self) -> LeadgateResult<bool> {
        Ok(!self.offline.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl LeadCatalog for InMemoryLedger {
    async fn get_lead(&self, lead_id: LeadId) -> LeadgateResult<Option<Lead>> {
        self.ensure_online()?;
        let leads = self.leads.read().map_err(|_| LedgerError::lock_poisoned())?;
        Ok(leads.get(&lead_id).cloned())
    }

    async fn get_leads(&self, lead_ids: &[LeadId]) -> LeadgateResult<Vec<Lead>> {
        self.ensure_online()?;
        let leads = self.leads.read().map_err(|_| LedgerError::lock_poisoned())?;
        Ok(lead_ids.iter().filter_map(|id| leads.get(id).cloned()).collect())
    }
}

#[async_trait]
impl UnlockedLeadsSource for InMemoryLedger {
    async fn fetch_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>> {
        self.ensure_online()?;
        self.bulk_reads.fetch_add(1, Ordering::SeqCst);
        let visits = self.unlocked_sorted(user_id)?;
        let leads = self.leads.read().map_err(|_| LedgerError::lock_poisoned())?;
        let joined: Vec<Lead> = visits
            .iter()
            .filter_map(|v| leads.get(&v.lead_id).cloned())
            .collect();
        Ok(join_unlocked(&visits, &joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use leadgate_core::{EntityIdType, LeadgateError, ValidationError, MAX_PITCH_LEN};
    use std::sync::Arc;

    fn store_with_lead() -> (InMemoryLedger, Lead) {
        let lead = Lead::new(LeadId::now_v7(), "Grace").with_unlock("email", "grace@example.com");
        (InMemoryLedger::with_leads([lead.clone()]), lead)
    }

    #[tokio::test]
    async fn test_record_visit_creates_unlocked_record() {
        let (store, lead) = store_with_lead();
        let user = UserId::now_v7();
        let now = Utc::now();

        let record = store.record_visit(user, lead.lead_id, now).await.unwrap();

        assert!(record.unlocked);
        assert_eq!(record.created_at, now);
        assert_eq!(store.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_repeat_visit_refreshes_same_row() {
        let (store, lead) = store_with_lead();
        let user = UserId::now_v7();
        let first = Utc::now();
        let second = first + Duration::seconds(90);

        let a = store.record_visit(user, lead.lead_id, first).await.unwrap();
        let b = store.record_visit(user, lead.lead_id, second).await.unwrap();

        assert_eq!(a.visit_id, b.visit_id);
        assert_eq!(b.created_at, first);
        assert_eq!(b.updated_at, second);
        assert_eq!(store.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_repeat_visit_unlocks_imported_row() {
        let (store, lead) = store_with_lead();
        let user = UserId::now_v7();
        let mut imported = VisitRecord::first_visit(user, lead.lead_id, Utc::now());
        imported.unlocked = false;
        store.insert_record(imported.clone()).unwrap();

        let record = store.record_visit(user, lead.lead_id, Utc::now()).await.unwrap();

        assert_eq!(record.visit_id, imported.visit_id);
        assert!(record.unlocked);
    }

    #[tokio::test]
    async fn test_unknown_lead_rejected() {
        let store = InMemoryLedger::new();
        let missing = LeadId::now_v7();

        let err = store
            .record_visit(UserId::now_v7(), missing, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LeadgateError::Ledger(LedgerError::UnknownLead { lead_id: missing })
        );
        assert_eq!(store.visit_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let (store, lead) = store_with_lead();
        store.set_offline(true);

        let err = store
            .record_visit(UserId::now_v7(), lead.lead_id, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ledger.unavailable");
        assert!(!store.health_check().await.unwrap());

        store.set_offline(false);
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_list_unlocked_is_recency_ordered_and_scoped() {
        let a = Lead::new(LeadId::now_v7(), "A");
        let b = Lead::new(LeadId::now_v7(), "B");
        let store = InMemoryLedger::with_leads([a.clone(), b.clone()]);
        let user = UserId::now_v7();
        let other = UserId::now_v7();
        let t0 = Utc::now();

        store.record_visit(user, a.lead_id, t0).await.unwrap();
        store
            .record_visit(user, b.lead_id, t0 + Duration::seconds(1))
            .await
            .unwrap();
        store.record_visit(other, a.lead_id, t0).await.unwrap();

        let listed = store.list_unlocked(user).await.unwrap();
        let ids: Vec<LeadId> = listed.iter().map(|v| v.lead_id).collect();
        assert_eq!(ids, vec![b.lead_id, a.lead_id]);

        // Revisiting A moves it to the front.
        store
            .record_visit(user, a.lead_id, t0 + Duration::seconds(2))
            .await
            .unwrap();
        let listed = store.list_unlocked(user).await.unwrap();
        assert_eq!(listed[0].lead_id, a.lead_id);
    }

    #[tokio::test]
    async fn test_update_pitch() {
        let (store, lead) = store_with_lead();
        let user = UserId::now_v7();
        let visited = store.record_visit(user, lead.lead_id, Utc::now()).await.unwrap();

        let updated = store
            .update_pitch(user, lead.lead_id, Some("  Let's talk  ".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.pitch.as_deref(), Some("Let's talk"));
        assert_eq!(updated.updated_at, visited.updated_at);

        let cleared = store.update_pitch(user, lead.lead_id, None).await.unwrap();
        assert!(cleared.pitch.is_none());
    }

    #[tokio::test]
    async fn test_update_pitch_errors() {
        let (store, lead) = store_with_lead();
        let user = UserId::now_v7();

        let err = store
            .update_pitch(user, lead.lead_id, Some("hi".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LeadgateError::Ledger(LedgerError::VisitNotFound { .. })
        ));

        store.record_visit(user, lead.lead_id, Utc::now()).await.unwrap();
        let err = store
            .update_pitch(user, lead.lead_id, Some("y".repeat(MAX_PITCH_LEN + 5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LeadgateError::Validation(ValidationError::TooLong { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_unlocked_counts_bulk_reads() {
        let (store, lead) = store_with_lead();
        let user = UserId::now_v7();
        store.record_visit(user, lead.lead_id, Utc::now()).await.unwrap();

        let leads = store.fetch_unlocked(user).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].unlock_value.as_deref(), Some("grace@example.com"));
        assert_eq!(store.bulk_read_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_visits_yield_one_row() {
        let (store, lead) = store_with_lead();
        let store = Arc::new(store);
        let user = UserId::now_v7();

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            let lead_id = lead.lead_id;
            handles.push(tokio::spawn(async move {
                store
                    .record_visit(user, lead_id, Utc::now() + Duration::milliseconds(i))
                    .await
            }));
        }

        let mut visit_ids = Vec::new();
        for handle in handles {
            visit_ids.push(handle.await.unwrap().unwrap().visit_id);
        }
        visit_ids.dedup();

        assert_eq!(visit_ids.len(), 1);
        assert_eq!(store.visit_count_for(user), 1);
    }
}
