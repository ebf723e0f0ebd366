//! Core entity structures

use crate::{LeadId, Timestamp, UserId, ValidationError, VisitId};
use crate::identity::EntityIdType;
use serde::{Deserialize, Serialize};

/// Maximum length (in characters) of a user-authored pitch.
pub const MAX_PITCH_LEN: usize = 2000;

/// Lead - a catalog entry (event or contact) that can be unlocked.
///
/// Owned by the lead catalog; the unlock core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: LeadId,
    pub name: String,
    pub event_name: Option<String>,
    pub industry: Option<String>,
    pub focus: Option<String>,
    pub image_url: Option<String>,
    /// Tag describing what kind of value an unlock reveals (email, phone, ...).
    pub unlock_type: Option<String>,
    /// The revealable value. Only handed out for unlocked leads.
    pub unlock_value: Option<String>,
}

impl Lead {
    /// Create a lead with only a name; display fields start empty.
    pub fn new(lead_id: LeadId, name: impl Into<String>) -> Self {
        Self {
            lead_id,
            name: name.into(),
            event_name: None,
            industry: None,
            focus: None,
            image_url: None,
            unlock_type: None,
            unlock_value: None,
        }
    }

    pub fn with_event(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_unlock(mut self, unlock_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.unlock_type = Some(unlock_type.into());
        self.unlock_value = Some(value.into());
        self
    }
}

/// VisitRecord - one ledger row per (user, lead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub visit_id: VisitId,
    pub user_id: UserId,
    pub lead_id: LeadId,
    pub unlocked: bool,
    pub pitch: Option<String>,
    /// First visit.
    pub created_at: Timestamp,
    /// Last visit; the recency sort key.
    pub updated_at: Timestamp,
}

impl VisitRecord {
    /// Build the record for a first visit.
    ///
    /// Creating a visit is the unlock event, so new records start unlocked.
    pub fn first_visit(user_id: UserId, lead_id: LeadId, at: Timestamp) -> Self {
        Self {
            visit_id: VisitId::now_v7(),
            user_id,
            lead_id,
            unlocked: true,
            pitch: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Apply a repeat visit to an existing record.
    pub fn refresh(&mut self, at: Timestamp) {
        self.updated_at = at;
        self.unlocked = true;
    }

    /// When this lead was (last) unlocked.
    pub fn unlocked_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Natural key of the record.
    pub fn key(&self) -> (UserId, LeadId) {
        (self.user_id, self.lead_id)
    }
}

/// Answer to "is this lead unlocked for this user?".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnlockStatus {
    pub is_unlocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_value: Option<String>,
}

impl UnlockStatus {
    /// Status for a lead with no unlocked visit.
    pub fn locked() -> Self {
        Self::default()
    }

    /// Status for an unlocked lead.
    pub fn unlocked(unlock_value: Option<String>) -> Self {
        Self {
            is_unlocked: true,
            unlock_value,
        }
    }
}

/// Typed projection of an unlocked VisitRecord joined with its Lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockedLead {
    pub lead_id: LeadId,
    pub name: String,
    pub event_name: Option<String>,
    pub industry: Option<String>,
    pub focus: Option<String>,
    pub image_url: Option<String>,
    pub unlock_type: Option<String>,
    pub unlock_value: Option<String>,
    pub pitch: Option<String>,
    pub unlocked_at: Timestamp,
}

impl UnlockedLead {
    /// Join a visit with the lead it points at.
    pub fn from_parts(visit: &VisitRecord, lead: &Lead) -> Self {
        Self {
            lead_id: visit.lead_id,
            name: lead.name.clone(),
            event_name: lead.event_name.clone(),
            industry: lead.industry.clone(),
            focus: lead.focus.clone(),
            image_url: lead.image_url.clone(),
            unlock_type: lead.unlock_type.clone(),
            unlock_value: lead.unlock_value.clone(),
            pitch: visit.pitch.clone(),
            unlocked_at: visit.unlocked_at(),
        }
    }
}

/// Response body listing a user's unlocked leads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnlockedLeadsPage {
    pub leads: Vec<UnlockedLead>,
    pub total: usize,
}

impl UnlockedLeadsPage {
    pub fn new(leads: Vec<UnlockedLead>) -> Self {
        let total = leads.len();
        Self { leads, total }
    }
}

/// Request body replacing the pitch attached to a visit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PitchUpdate {
    #[serde(default)]
    pub pitch: Option<String>,
}

/// Trim a pitch and enforce its length limit; blank pitches clear the field.
pub fn normalize_pitch(pitch: Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(pitch) = pitch else {
        return Ok(None);
    };
    let trimmed = pitch.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let len = trimmed.chars().count();
    if len > MAX_PITCH_LEN {
        return Err(ValidationError::TooLong {
            field: "pitch".to_string(),
            max: MAX_PITCH_LEN,
            actual: len,
        });
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    #[test]
    fn test_first_visit_is_unlocked() {
        let now = Utc::now();
        let visit = VisitRecord::first_visit(UserId::now_v7(), LeadId::now_v7(), now);
        assert!(visit.unlocked);
        assert_eq!(visit.created_at, now);
        assert_eq!(visit.updated_at, now);
        assert!(visit.pitch.is_none());
    }

    #[test]
    fn test_refresh_keeps_created_at() {
        let start = Utc::now();
        let later = start + Duration::seconds(30);
        let mut visit = VisitRecord::first_visit(UserId::now_v7(), LeadId::now_v7(), start);
        let visit_id = visit.visit_id;
        visit.unlocked = false;

        visit.refresh(later);

        assert_eq!(visit.visit_id, visit_id);
        assert_eq!(visit.created_at, start);
        assert_eq!(visit.updated_at, later);
        assert!(visit.unlocked);
    }

    #[test]
    fn test_unlocked_lead_joins_fields() {
        let lead = Lead::new(LeadId::now_v7(), "Ada")
            .with_event("RustConf")
            .with_industry("Software")
            .with_unlock("email", "ada@example.com");
        let mut visit = VisitRecord::first_visit(UserId::now_v7(), lead.lead_id, Utc::now());
        visit.pitch = Some("hello".to_string());

        let joined = UnlockedLead::from_parts(&visit, &lead);
        assert_eq!(joined.lead_id, lead.lead_id);
        assert_eq!(joined.event_name.as_deref(), Some("RustConf"));
        assert_eq!(joined.unlock_value.as_deref(), Some("ada@example.com"));
        assert_eq!(joined.pitch.as_deref(), Some("hello"));
        assert_eq!(joined.unlocked_at, visit.updated_at);
    }

    #[test]
    fn test_unlock_status_serialization_omits_missing_value() {
        let json = serde_json::to_value(UnlockStatus::locked()).unwrap();
        assert_eq!(json, serde_json::json!({ "is_unlocked": false }));
    }

    #[test]
    fn test_pitch_update_accepts_null_and_missing() {
        let explicit: PitchUpdate = serde_json::from_str(r#"{"pitch":null}"#).unwrap();
        let missing: PitchUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(explicit, missing);
        let set: PitchUpdate = serde_json::from_str(r#"{"pitch":"hi"}"#).unwrap();
        assert_eq!(set.pitch.as_deref(), Some("hi"));
    }

    #[test]
    fn test_normalize_pitch_blank_clears() {
        assert_eq!(normalize_pitch(Some("   ".to_string())).unwrap(), None);
        assert_eq!(normalize_pitch(None).unwrap(), None);
        assert_eq!(
            normalize_pitch(Some("  hi there ".to_string())).unwrap(),
            Some("hi there".to_string())
        );
    }

    #[test]
    fn test_normalize_pitch_too_long() {
        let long = "x".repeat(MAX_PITCH_LEN + 1);
        let err = normalize_pitch(Some(long)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { actual, .. } if actual == MAX_PITCH_LEN + 1));
    }

    proptest! {
        #[test]
        fn prop_normalized_pitch_is_trimmed(pitch in "\\PC{0,200}") {
            if let Ok(Some(normalized)) = normalize_pitch(Some(pitch)) {
                prop_assert_eq!(normalized.trim(), normalized.as_str());
                prop_assert!(!normalized.is_empty());
            }
        }
    }
}
