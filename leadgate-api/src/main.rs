//! Leadgate API Server Entry Point
//!
//! Bootstraps configuration, applies the schema, and starts the Axum HTTP
//! server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use leadgate_api::telemetry::{init_tracer, TelemetryConfig};
use leadgate_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbClient, DbConfig,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracer(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production()?;

    let db_config = DbConfig::from_env();
    let db = Arc::new(DbClient::from_config(&db_config)?);
    db.migrate().await?;
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        max_size = db_config.max_size,
        "Database pool ready"
    );

    let state = AppState::new(db, api_config.request_timeout);
    let app: Router = create_api_router(state, &api_config, auth_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting leadgate API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("LEADGATE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("LEADGATE_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::validation_failed(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::validation_failed(format!("Invalid bind address {}: {}", addr, e)))
}
