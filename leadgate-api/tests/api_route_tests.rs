//! Route Tests for the Leadgate REST API
//!
//! Drives the full router (auth, CORS, tracing layers included) with
//! `tower::ServiceExt::oneshot` over an in-memory ledger.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use leadgate_api::{
    create_api_router, generate_jwt_token, ApiConfig, ApiError, AppState, AuthConfig, ErrorCode,
    FixedClock,
};
use leadgate_core::{
    EntityIdType, LeadId, UnlockStatus, UnlockedLeadsPage, UserId, VisitRecord,
};
use leadgate_test_utils::{assertions::assert_recency_ordered, fixtures, InMemoryLedger};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// TEST HELPERS
// ============================================================================

const SECRET: &str = "route-test-secret-0123456789abcdefghij";

fn auth_config() -> AuthConfig {
    AuthConfig::with_secret(SECRET, Arc::new(FixedClock(chrono::Utc::now().timestamp())))
        .expect("valid secret")
}

fn app_over(store: Arc<InMemoryLedger>) -> Router {
    let state = AppState::new(store, Duration::from_secs(5));
    create_api_router(state, &ApiConfig::default(), auth_config())
}

fn token_for(user: UserId) -> String {
    generate_jwt_token(&auth_config(), user).expect("token")
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Result<(StatusCode, Vec<u8>), String> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).map_err(|e| e.to_string())?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| format!("Request failed: {:?}", e))?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| format!("Failed to read body: {:?}", e))?;
    Ok((status, bytes.to_vec()))
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("Invalid JSON body: {}", e))
}

// ============================================================================
// VISIT + STATUS
// ============================================================================

#[tokio::test]
async fn visit_unlocks_and_status_reveals_value() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(1);
    let lead = &leads[0];
    let app = app_over(Arc::clone(&store));
    let user = UserId::now_v7();
    let token = token_for(user);
    let status_uri = format!("/api/v1/leads/{}/unlock-status", lead.lead_id);

    let (code, body) = send(&app, Method::GET, &status_uri, Some(&token), None).await?;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(parse::<UnlockStatus>(&body)?, UnlockStatus::locked());

    let visit_uri = format!("/api/v1/leads/{}/visit", lead.lead_id);
    let (code, body) = send(&app, Method::POST, &visit_uri, Some(&token), None).await?;
    assert_eq!(code, StatusCode::OK);
    let record: VisitRecord = parse(&body)?;
    assert!(record.unlocked);
    assert_eq!(record.user_id, user);

    let (_, body) = send(&app, Method::GET, &status_uri, Some(&token), None).await?;
    let status: UnlockStatus = parse(&body)?;
    assert!(status.is_unlocked);
    assert_eq!(status.unlock_value, lead.unlock_value);
    Ok(())
}

#[tokio::test]
async fn repeat_visit_reuses_the_row() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(1);
    let app = app_over(Arc::clone(&store));
    let user = UserId::now_v7();
    let token = token_for(user);
    let uri = format!("/api/v1/leads/{}/visit", leads[0].lead_id);

    let (_, first) = send(&app, Method::POST, &uri, Some(&token), None).await?;
    let (_, second) = send(&app, Method::POST, &uri, Some(&token), None).await?;
    let first: VisitRecord = parse(&first)?;
    let second: VisitRecord = parse(&second)?;

    assert_eq!(first.visit_id, second.visit_id);
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(store.visit_count_for(user), 1);
    Ok(())
}

#[tokio::test]
async fn status_is_scoped_to_the_caller() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(1);
    let app = app_over(store);
    let alice = token_for(UserId::now_v7());
    let bob = token_for(UserId::now_v7());

    send(&app, Method::POST, &format!("/api/v1/leads/{}/visit", leads[0].lead_id), Some(&alice), None)
        .await?;

    let uri = format!("/api/v1/leads/{}/unlock-status", leads[0].lead_id);
    let (_, body) = send(&app, Method::GET, &uri, Some(&bob), None).await?;
    assert!(!parse::<UnlockStatus>(&body)?.is_unlocked);
    Ok(())
}

// ============================================================================
// UNLOCKED LEADS
// ============================================================================

#[tokio::test]
async fn unlocked_leads_lists_newest_first() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(3);
    let app = app_over(store);
    let token = token_for(UserId::now_v7());

    for lead in &leads {
        let uri = format!("/api/v1/leads/{}/visit", lead.lead_id);
        send(&app, Method::POST, &uri, Some(&token), None).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (code, body) = send(&app, Method::GET, "/api/v1/unlocked-leads", Some(&token), None).await?;
    assert_eq!(code, StatusCode::OK);
    let page: UnlockedLeadsPage = parse(&body)?;
    assert_eq!(page.total, 3);
    assert_recency_ordered(&page.leads);
    assert_eq!(page.leads[0].lead_id, leads[2].lead_id);
    Ok(())
}

// ============================================================================
// PITCH
// ============================================================================

#[tokio::test]
async fn pitch_requires_visit_and_is_normalized() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(1);
    let app = app_over(store);
    let token = token_for(UserId::now_v7());
    let pitch_uri = format!("/api/v1/leads/{}/pitch", leads[0].lead_id);
    let body = serde_json::json!({ "pitch": "  Let's talk  " });

    let (code, err) = send(&app, Method::PUT, &pitch_uri, Some(&token), Some(body.clone())).await?;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(parse::<ApiError>(&err)?.code, ErrorCode::VisitNotFound);

    send(&app, Method::POST, &format!("/api/v1/leads/{}/visit", leads[0].lead_id), Some(&token), None)
        .await?;
    let (code, record) = send(&app, Method::PUT, &pitch_uri, Some(&token), Some(body)).await?;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(parse::<VisitRecord>(&record)?.pitch.as_deref(), Some("Let's talk"));

    let cleared = serde_json::json!({ "pitch": null });
    let (_, record) = send(&app, Method::PUT, &pitch_uri, Some(&token), Some(cleared)).await?;
    assert!(parse::<VisitRecord>(&record)?.pitch.is_none());

    let too_long = serde_json::json!({ "pitch": "x".repeat(2001) });
    let (code, err) = send(&app, Method::PUT, &pitch_uri, Some(&token), Some(too_long)).await?;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(parse::<ApiError>(&err)?.code, ErrorCode::ValidationFailed);
    Ok(())
}

// ============================================================================
// ERRORS
// ============================================================================

#[tokio::test]
async fn unknown_lead_is_not_found() -> Result<(), String> {
    let (store, _) = fixtures::seeded_store(1);
    let app = app_over(store);
    let token = token_for(UserId::now_v7());
    let uri = format!("/api/v1/leads/{}/visit", LeadId::now_v7());

    let (code, body) = send(&app, Method::POST, &uri, Some(&token), None).await?;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(parse::<ApiError>(&body)?.code, ErrorCode::LeadNotFound);
    Ok(())
}

#[tokio::test]
async fn malformed_lead_id_is_bad_request() -> Result<(), String> {
    let (store, _) = fixtures::seeded_store(1);
    let app = app_over(store);
    let token = token_for(UserId::now_v7());

    let (code, body) = send(&app, Method::POST, "/api/v1/leads/42/visit", Some(&token), None).await?;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(parse::<ApiError>(&body)?.code, ErrorCode::InvalidFormat);
    Ok(())
}

#[tokio::test]
async fn missing_token_is_unauthorized() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(1);
    let app = app_over(Arc::clone(&store));
    let uri = format!("/api/v1/leads/{}/visit", leads[0].lead_id);

    let (code, body) = send(&app, Method::POST, &uri, None, None).await?;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert_eq!(parse::<ApiError>(&body)?.code, ErrorCode::Unauthorized);
    assert_eq!(store.visit_count(), 0);

    let (code, _) = send(&app, Method::GET, "/api/v1/unlocked-leads", Some("garbage"), None).await?;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn offline_ledger_is_service_unavailable() -> Result<(), String> {
    let (store, leads) = fixtures::seeded_store(1);
    let app = app_over(Arc::clone(&store));
    let token = token_for(UserId::now_v7());
    store.set_offline(true);

    let uri = format!("/api/v1/leads/{}/visit", leads[0].lead_id);
    let (code, body) = send(&app, Method::POST, &uri, Some(&token), None).await?;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse::<ApiError>(&body)?.code, ErrorCode::ServiceUnavailable);
    Ok(())
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn health_endpoints_skip_auth_and_track_ledger() -> Result<(), String> {
    let (store, _) = fixtures::seeded_store(0);
    let app = app_over(Arc::clone(&store));

    let (code, _) = send(&app, Method::GET, "/health/live", None, None).await?;
    assert_eq!(code, StatusCode::OK);
    let (code, _) = send(&app, Method::GET, "/health/ready", None, None).await?;
    assert_eq!(code, StatusCode::OK);

    store.set_offline(true);
    let (code, body) = send(&app, Method::GET, "/health/ready", None, None).await?;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = parse(&body)?;
    assert_eq!(json["status"], "unhealthy");
    Ok(())
}
