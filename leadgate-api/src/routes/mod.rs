//! REST API Routes Module
//!
//! Includes:
//! - Lead visit routes (record visit, unlock status, pitch)
//! - The unlocked-leads listing that feeds client caches
//! - Health check endpoints (Kubernetes-compatible)
//! - CORS support for browser-based clients

pub mod health;
pub mod unlocked;
pub mod visit;

use std::time::Duration;

use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;

pub use health::create_router as health_router;
pub use unlocked::create_router as unlocked_router;
pub use visit::create_router as visit_router;

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.is_permissive_cors() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: Production mode");
        let origins: Vec<axum::http::HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// Layer order (outermost first): trace, CORS, then auth on `/api/v1` only.
/// Health endpoints stay unauthenticated.
pub fn create_api_router(state: AppState, api_config: &ApiConfig, auth_config: AuthConfig) -> Router {
    let auth_state = AuthMiddlewareState::new(auth_config);

    let api = Router::new()
        .nest("/leads", visit_router())
        .nest("/unlocked-leads", unlocked_router())
        .layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .nest("/api/v1", api)
        .nest("/health", health_router())
        .with_state(state)
        .layer(build_cors_layer(api_config))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let _ = build_cors_layer(&ApiConfig::default());
        let production = ApiConfig {
            cors_origins: vec!["https://app.leadgate.dev".to_string()],
            cors_allow_credentials: true,
            ..ApiConfig::default()
        };
        let _ = build_cors_layer(&production);
    }
}
