//! Unlocked Leads REST API Route
//!
//! The bulk query behind the client-side unlocked-leads cache: every lead
//! with an unlocked visit for the caller, newest first.

use axum::{extract::State, routing::get, Json, Router};
use leadgate_core::UnlockedLeadsPage;

use crate::{error::ApiResult, middleware::AuthExtractor, state::AppState};

/// GET /api/v1/unlocked-leads - List the caller's unlocked leads
pub async fn list_unlocked_leads(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<UnlockedLeadsPage>> {
    let leads = state
        .bounded(state.source.fetch_unlocked(auth.user_id))
        .await?;
    tracing::trace!(user_id = %auth.user_id, count = leads.len(), "Listed unlocked leads");
    Ok(Json(UnlockedLeadsPage::new(leads)))
}

/// Create the unlocked-leads router. Mounted under `/api/v1/unlocked-leads`.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(list_unlocked_leads))
}
