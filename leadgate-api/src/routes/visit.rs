//! Lead Visit REST API Routes
//!
//! Per-lead operations for the authenticated caller: record a visit (the
//! unlock event), read the unlock status, and attach a pitch. The caller is
//! always taken from the bearer token, never from the request body.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use leadgate_core::{LeadId, PitchUpdate, UnlockStatus, VisitRecord};

use crate::{error::ApiResult, middleware::AuthExtractor, state::AppState};

fn parse_lead_id(raw: &str) -> ApiResult<LeadId> {
    Ok(raw.parse::<LeadId>()?)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/leads/:lead_id/visit - Record a visit and unlock the lead
pub async fn record_visit(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(lead_id): Path<String>,
) -> ApiResult<Json<VisitRecord>> {
    let lead_id = parse_lead_id(&lead_id)?;
    let record = state
        .bounded(state.ledger.record_visit(auth.user_id, lead_id, Utc::now()))
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        %lead_id,
        visit_id = %record.visit_id,
        first_visit = record.created_at == record.updated_at,
        "Visit recorded"
    );
    Ok(Json(record))
}

/// GET /api/v1/leads/:lead_id/unlock-status - Is this lead unlocked for the caller?
pub async fn unlock_status(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(lead_id): Path<String>,
) -> ApiResult<Json<UnlockStatus>> {
    let lead_id = parse_lead_id(&lead_id)?;
    let status = state
        .bounded(state.resolver.resolve(auth.user_id, lead_id))
        .await?;
    Ok(Json(status))
}

/// PUT /api/v1/leads/:lead_id/pitch - Replace the pitch on a visited lead
pub async fn update_pitch(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(lead_id): Path<String>,
    Json(req): Json<PitchUpdate>,
) -> ApiResult<Json<VisitRecord>> {
    let lead_id = parse_lead_id(&lead_id)?;
    let record = state
        .bounded(state.ledger.update_pitch(auth.user_id, lead_id, req.pitch))
        .await?;

    tracing::debug!(user_id = %auth.user_id, %lead_id, cleared = record.pitch.is_none(), "Pitch updated");
    Ok(Json(record))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the lead visit router. Mounted under `/api/v1/leads` behind auth.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:lead_id/visit", post(record_visit))
        .route("/:lead_id/unlock-status", get(unlock_status))
        .route("/:lead_id/pitch", put(update_pitch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_lead_id_rejects_garbage() {
        let err = parse_lead_id("not-a-uuid").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFormat);
    }

    #[test]
    fn test_parse_lead_id_accepts_uuid() {
        let id = parse_lead_id("0190f3c4-8b3a-7cc1-9e4b-6f1f3b2a9c10").unwrap();
        assert_eq!(id.to_string(), "0190f3c4-8b3a-7cc1-9e4b-6f1f3b2a9c10");
    }
}
