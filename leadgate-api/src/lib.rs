//! Leadgate API - REST Layer over the Visit Ledger
//!
//! Exposes the ledger and unlock-status resolver over HTTP (Axum). The caller
//! identity comes from a bearer JWT; storage is Postgres via deadpool in
//! production and any `leadgate-storage` implementation in tests.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    authenticate, generate_jwt_token, validate_jwt_token, AuthConfig, AuthContext, Claims,
    FixedClock, JwtClock, SystemClock,
};
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
pub use routes::create_api_router;
pub use state::AppState;
