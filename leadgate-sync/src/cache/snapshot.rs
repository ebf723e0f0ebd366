//! Published state of the unlocked-leads cache.

use chrono::{DateTime, Utc};
use leadgate_core::{LeadId, LeadgateError, Timestamp, UnlockedLead};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Label used in [`UnlockedLeadsView::industry_distribution`] for leads with
/// no industry.
pub const UNKNOWN_INDUSTRY: &str = "Unknown";

/// Order-independent multiset of lead IDs.
///
/// Two fetches are considered equal when they name the same leads the same
/// number of times, regardless of ordering or display fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadIdMultiset(BTreeMap<LeadId, usize>);

impl LeadIdMultiset {
    pub fn from_leads(leads: &[UnlockedLead]) -> Self {
        let mut counts = BTreeMap::new();
        for lead in leads {
            *counts.entry(lead.lead_id).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn contains(&self, lead_id: &LeadId) -> bool {
        self.0.contains_key(lead_id)
    }

    /// Number of IDs counting repeats.
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// All unlocked leads for one user, most recent first.
///
/// Immutable once built; the cache replaces it wholesale when the set of
/// unlocked leads changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockedLeadsSnapshot {
    leads: Vec<UnlockedLead>,
    ids: LeadIdMultiset,
    fetched_at: Option<Timestamp>,
}

impl UnlockedLeadsSnapshot {
    pub fn new(leads: Vec<UnlockedLead>, fetched_at: Timestamp) -> Self {
        let ids = LeadIdMultiset::from_leads(&leads);
        Self {
            leads,
            ids,
            fetched_at: Some(fetched_at),
        }
    }

    /// Snapshot published before the first successful fetch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn leads(&self) -> &[UnlockedLead] {
        &self.leads
    }

    pub fn lead_ids(&self) -> &LeadIdMultiset {
        &self.ids
    }

    /// When the payload of this snapshot was fetched. `None` until the first
    /// successful poll.
    pub fn fetched_at(&self) -> Option<Timestamp> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    /// Check whether a fetched payload names the same leads as this snapshot.
    pub fn same_leads(&self, fetched: &[UnlockedLead]) -> bool {
        self.ids == LeadIdMultiset::from_leads(fetched)
    }
}

/// What subscribers observe: the current snapshot plus load state.
#[derive(Debug, Clone)]
pub struct UnlockedLeadsView {
    pub snapshot: Arc<UnlockedLeadsSnapshot>,
    /// True from `start` until the first fetch of the session completes.
    pub loading: bool,
    /// Last fetch error, cleared by the next successful fetch.
    pub error: Option<LeadgateError>,
    /// Session generation this view belongs to.
    pub generation: u64,
    /// Last time a fetch confirmed the snapshot, changed or not.
    pub confirmed_at: Option<Timestamp>,
}

impl Default for UnlockedLeadsView {
    fn default() -> Self {
        Self::idle(0)
    }
}

impl UnlockedLeadsView {
    /// View of a cache with no active session.
    pub fn idle(generation: u64) -> Self {
        Self {
            snapshot: Arc::new(UnlockedLeadsSnapshot::empty()),
            loading: false,
            error: None,
            generation,
            confirmed_at: None,
        }
    }

    /// View of a session that has started but not yet fetched.
    pub fn loading(generation: u64) -> Self {
        Self {
            loading: true,
            ..Self::idle(generation)
        }
    }

    pub fn leads(&self) -> &[UnlockedLead] {
        self.snapshot.leads()
    }

    pub fn lead_count(&self) -> usize {
        self.snapshot.len()
    }

    /// The `n` most recently unlocked leads.
    pub fn recent(&self, n: usize) -> &[UnlockedLead] {
        let leads = self.snapshot.leads();
        &leads[..n.min(leads.len())]
    }

    /// Unlocked lead counts per industry, for dashboard charts.
    pub fn industry_distribution(&self) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for lead in self.snapshot.leads() {
            let industry = lead
                .industry
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(UNKNOWN_INDUSTRY);
            *distribution.entry(industry.to_string()).or_insert(0) += 1;
        }
        distribution
    }

    pub fn contains(&self, lead_id: LeadId) -> bool {
        self.snapshot.lead_ids().contains(&lead_id)
    }

    /// Time since a fetch last confirmed the snapshot, as of `now`.
    ///
    /// `None` until the first successful fetch.
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<Duration> {
        let confirmed_at = self.confirmed_at?;
        Some((now - confirmed_at).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
