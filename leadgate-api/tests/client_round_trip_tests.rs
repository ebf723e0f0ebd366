//! End-to-End Tests: Sync Client Against a Live Server
//!
//! Binds the real router on a loopback port and drives it through
//! `leadgate_sync::ApiClient` and an `UnlockSession`, covering the wire
//! format and the client's error mapping.

use leadgate_api::{
    create_api_router, generate_jwt_token, ApiConfig, AppState, AuthConfig, FixedClock,
};
use leadgate_core::{EntityIdType, LeadId, LeadgateConfig, UserId};
use leadgate_sync::{ApiClient, Credentials, UnlockSession};
use leadgate_test_utils::{assertions::assert_same_leads, fixtures, InMemoryLedger};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TEST HELPERS
// ============================================================================

const SECRET: &str = "round-trip-secret-0123456789abcdefghij";

fn auth_config() -> AuthConfig {
    AuthConfig::with_secret(SECRET, Arc::new(FixedClock(chrono::Utc::now().timestamp())))
        .expect("valid secret")
}

/// Serve the API over `store` on an ephemeral port; returns the base URL.
async fn serve(store: Arc<InMemoryLedger>) -> String {
    let state = AppState::new(store, Duration::from_secs(5));
    let app = create_api_router(state, &ApiConfig::default(), auth_config());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn client_config() -> LeadgateConfig {
    LeadgateConfig::default()
        .with_poll_interval(Duration::from_secs(60))
        .with_fetch_timeout(Duration::from_secs(5))
        .with_request_timeout(Duration::from_secs(5))
}

fn credentials(user: UserId) -> Credentials {
    let token = generate_jwt_token(&auth_config(), user).expect("token");
    Credentials::new(user).with_token(token)
}

async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn session_over_http_unlocks_and_publishes() {
    let (store, leads) = fixtures::seeded_store(2);
    let base_url = serve(Arc::clone(&store)).await;
    let client = ApiClient::from_config(&base_url, &client_config()).expect("client");
    assert!(client.ready().await.expect("ready"));

    let session = UnlockSession::new(Arc::new(client), &client_config()).expect("session");
    let user = UserId::now_v7();
    session.login(credentials(user));

    let record = session.record_visit(leads[0].lead_id).await.expect("visit");
    assert!(record.unlocked);
    assert_eq!(store.visit_count_for(user), 1);

    let status = session
        .resolve_unlock_status(leads[0].lead_id)
        .await
        .expect("status");
    assert!(status.is_unlocked);
    assert_eq!(status.unlock_value, leads[0].unlock_value);

    let cache = session.cache();
    assert!(wait_for(|| cache.current().contains(leads[0].lead_id)).await);
    assert_same_leads(cache.current().leads(), &[leads[0].lead_id]);

    let pitched = session
        .update_pitch(leads[0].lead_id, Some(" hello ".to_string()))
        .await
        .expect("pitch");
    assert_eq!(pitched.pitch.as_deref(), Some("hello"));

    session.logout();
    assert!(cache.current().snapshot.is_empty());
}

#[tokio::test]
async fn server_errors_map_to_domain_codes() {
    let (store, leads) = fixtures::seeded_store(1);
    let base_url = serve(store).await;
    let client = ApiClient::from_config(&base_url, &client_config()).expect("client");
    let session = UnlockSession::new(Arc::new(client), &client_config()).expect("session");
    session.login(credentials(UserId::now_v7()));

    let err = session.record_visit(LeadId::now_v7()).await.unwrap_err();
    assert_eq!(err.code(), "ledger.unknown_lead");

    let err = session
        .update_pitch(leads[0].lead_id, Some("hi".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ledger.visit_not_found");

    session.login(Credentials::new(UserId::now_v7()).with_token("not-a-jwt"));
    let err = session.record_visit(leads[0].lead_id).await.unwrap_err();
    assert_eq!(err.code(), "auth.invalid_token");
}
