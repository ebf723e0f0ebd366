//! Leadgate Test Utilities
//!
//! Shared test infrastructure for the leadgate workspace:
//! - Proptest generators for identifiers and leads
//! - Fixtures for seeded in-memory stores
//! - A scriptable [`UnlockedLeadsSource`] for driving the poll loop
//! - Assertions over unlocked-lead collections

// Re-export the in-memory store from its source crate
pub use leadgate_storage::{InMemoryLedger, UnlockedLeadsSource, VisitLedger};

// Re-export core types for convenience
pub use leadgate_core::{
    EntityIdType, Lead, LeadId, LeadgateError, LeadgateResult, LedgerError, Timestamp,
    UnlockStatus, UnlockedLead, UserId, VisitRecord,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for leadgate entity types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    pub fn arb_lead_id() -> impl Strategy<Value = LeadId> {
        arb_uuid().prop_map(LeadId::new)
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_industry() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Software".to_string()),
            Just("Finance".to_string()),
            Just("Healthcare".to_string()),
            Just("Retail".to_string()),
            Just("Energy".to_string()),
        ]
    }

    /// Generate a catalog lead with optional display fields.
    pub fn arb_lead() -> impl Strategy<Value = Lead> {
        (
            arb_lead_id(),
            "[A-Z][a-z]{2,12}( [A-Z][a-z]{2,12})?",
            proptest::option::of("[A-Za-z ]{3,24}"),
            proptest::option::of(arb_industry()),
            proptest::option::of("[a-z]{3,10}@example\\.com"),
        )
            .prop_map(|(lead_id, name, event_name, industry, email)| Lead {
                lead_id,
                name,
                event_name,
                industry,
                focus: None,
                image_url: None,
                unlock_type: email.as_ref().map(|_| "email".to_string()),
                unlock_value: email,
            })
    }

    /// Generate a joined unlocked lead.
    pub fn arb_unlocked_lead() -> impl Strategy<Value = UnlockedLead> {
        (arb_lead(), arb_user_id(), arb_timestamp()).prop_map(|(lead, user_id, at)| {
            let visit = VisitRecord::first_visit(user_id, lead.lead_id, at);
            UnlockedLead::from_parts(&visit, &lead)
        })
    }

    /// Generate a list of unlocked leads with distinct IDs.
    pub fn arb_unlocked_leads(max: usize) -> impl Strategy<Value = Vec<UnlockedLead>> {
        prop::collection::vec(arb_unlocked_lead(), 0..=max).prop_map(|mut leads| {
            let mut seen = std::collections::HashSet::new();
            leads.retain(|l| seen.insert(l.lead_id));
            leads.sort_by(|a, b| b.unlocked_at.cmp(&a.unlocked_at));
            leads
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A lead with an email unlock value derived from its name.
    pub fn sample_lead(name: &str) -> Lead {
        let slug = name.to_lowercase().replace(' ', ".");
        Lead::new(LeadId::now_v7(), name)
            .with_event("Leadgate Summit")
            .with_industry("Software")
            .with_unlock("email", format!("{}@example.com", slug))
    }

    /// An unlocked lead as it would appear in a snapshot.
    pub fn unlocked(lead: &Lead, user_id: UserId, at: Timestamp) -> UnlockedLead {
        let visit = VisitRecord::first_visit(user_id, lead.lead_id, at);
        UnlockedLead::from_parts(&visit, lead)
    }

    /// An in-memory store whose catalog holds `count` sample leads.
    pub fn seeded_store(count: usize) -> (Arc<InMemoryLedger>, Vec<Lead>) {
        let leads: Vec<Lead> = (0..count)
            .map(|i| sample_lead(&format!("Lead {}", i)))
            .collect();
        (Arc::new(InMemoryLedger::with_leads(leads.clone())), leads)
    }
}

// ============================================================================
// SCRIPTED SOURCE
// ============================================================================

/// A fetch source that replays scripted results.
///
/// Each call pops the next queued result; once the queue is drained the last
/// result is repeated. Calls are counted, and an optional delay simulates a
/// slow backend (deterministic under a paused tokio clock).
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<LeadgateResult<Vec<UnlockedLead>>>>,
    last: Mutex<Option<LeadgateResult<Vec<UnlockedLead>>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that always returns the same leads.
    pub fn always(leads: Vec<UnlockedLead>) -> Self {
        let source = Self::new();
        source.push_ok(leads);
        source
    }

    /// Queue a successful result.
    pub fn push_ok(&self, leads: Vec<UnlockedLead>) {
        self.push(Ok(leads));
    }

    /// Queue a failure.
    pub fn push_err(&self, err: impl Into<LeadgateError>) {
        self.push(Err(err.into()));
    }

    pub fn push(&self, result: LeadgateResult<Vec<UnlockedLead>>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// Delay every subsequent response by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.delay.lock() {
            *slot = delay;
        }
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_result(&self) -> LeadgateResult<Vec<UnlockedLead>> {
        let popped = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = match self.last.lock() {
            Ok(last) => last,
            Err(_) => return Err(LedgerError::lock_poisoned().into()),
        };
        if let Some(result) = popped {
            *last = Some(result);
        }
        last.clone().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl UnlockedLeadsSource for ScriptedSource {
    async fn fetch_unlocked(&self, _user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.next_result()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over unlocked-lead collections.

    use super::*;
    use std::collections::BTreeSet;

    /// Lead IDs of a collection, as a sorted set.
    pub fn lead_id_set(leads: &[UnlockedLead]) -> BTreeSet<LeadId> {
        leads.iter().map(|l| l.lead_id).collect()
    }

    /// Assert that a collection names exactly the given leads, in any order.
    #[track_caller]
    pub fn assert_same_leads(leads: &[UnlockedLead], expected: &[LeadId]) {
        let expected: BTreeSet<LeadId> = expected.iter().copied().collect();
        assert_eq!(lead_id_set(leads), expected, "unlocked lead sets differ");
    }

    /// Assert that a collection is ordered newest first.
    #[track_caller]
    pub fn assert_recency_ordered(leads: &[UnlockedLead]) {
        for pair in leads.windows(2) {
            assert!(
                pair[0].unlocked_at >= pair[1].unlocked_at,
                "{} unlocked before {} but listed first",
                pair[0].lead_id,
                pair[1].lead_id
            );
        }
    }
}
