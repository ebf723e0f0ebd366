//! REST client for the leadgate API.
//!
//! Implements [`UnlockBackend`] so an [`crate::UnlockSession`] can run against
//! a remote server instead of an in-process store.

use async_trait::async_trait;
use leadgate_core::{
    AuthError, LeadId, LeadgateConfig, LeadgateError, LeadgateResult, LedgerError, PitchUpdate,
    UnlockStatus, UnlockedLead, UnlockedLeadsPage, UserId, ValidationError, VisitRecord,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;

use crate::session::{Credentials, UnlockBackend};

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("API error {status} [{code}]: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// What a request was doing, for turning client errors into domain errors.
#[derive(Debug, Clone, Copy)]
struct RequestContext {
    user_id: UserId,
    lead_id: Option<LeadId>,
    write: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ApiClientError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(ApiClientError::Config("base_url must not be empty".to_string()));
        }
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    /// Client using the request timeout from `config`.
    pub fn from_config(base_url: impl Into<String>, config: &LeadgateConfig) -> Result<Self, ApiClientError> {
        Self::new(base_url, config.request_timeout)
    }

    /// Client configured from `LEADGATE_API_URL` and [`LeadgateConfig::from_env`].
    pub fn from_env() -> Result<Self, ApiClientError> {
        let base_url = std::env::var("LEADGATE_API_URL")
            .map_err(|_| ApiClientError::Config("LEADGATE_API_URL is not set".to_string()))?;
        let config = LeadgateConfig::from_env().map_err(|e| ApiClientError::Config(e.to_string()))?;
        Self::from_config(base_url, &config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn post_visit(&self, token: &str, lead_id: LeadId) -> Result<VisitRecord, ApiClientError> {
        let path = format!("/api/v1/leads/{}/visit", lead_id);
        let response = self
            .client
            .post(self.url(&path))
            .headers(auth_headers(token)?)
            .send()
            .await?;
        parse_response(response).await
    }

    pub async fn get_unlock_status(
        &self,
        token: &str,
        lead_id: LeadId,
    ) -> Result<UnlockStatus, ApiClientError> {
        let path = format!("/api/v1/leads/{}/unlock-status", lead_id);
        self.get_json(token, &path).await
    }

    pub async fn put_pitch(
        &self,
        token: &str,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> Result<VisitRecord, ApiClientError> {
        let path = format!("/api/v1/leads/{}/pitch", lead_id);
        let response = self
            .client
            .put(self.url(&path))
            .headers(auth_headers(token)?)
            .json(&PitchUpdate { pitch })
            .send()
            .await?;
        parse_response(response).await
    }

    pub async fn list_unlocked(&self, token: &str) -> Result<UnlockedLeadsPage, ApiClientError> {
        self.get_json(token, "/api/v1/unlocked-leads").await
    }

    /// Readiness probe; true when the server and its ledger are up.
    pub async fn ready(&self) -> Result<bool, ApiClientError> {
        let response = self.client.get(self.url("/health/ready")).send().await?;
        Ok(response.status().is_success())
    }

    async fn get_json<T>(&self, token: &str, path: &str) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(self.url(path))
            .headers(auth_headers(token)?)
            .send()
            .await?;
        parse_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn domain_error(&self, err: ApiClientError, ctx: RequestContext) -> LeadgateError {
        map_client_error(err, ctx, self.request_timeout)
    }
}

fn auth_headers(token: &str) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    let value = format!("Bearer {}", token);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
    );
    Ok(headers)
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiClientError> {
    let status = response.status();
    if status.is_success() {
        let text = response.text().await?;
        return Ok(serde_json::from_str(&text)?);
    }

    let text = response.text().await?;
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(ApiClientError::Api {
            status: status.as_u16(),
            code: body.code,
            message: body.message,
        }),
        Err(_) => Err(ApiClientError::InvalidResponse(format!(
            "HTTP {}: {}",
            status.as_u16(),
            text
        ))),
    }
}

/// Translate a transport or server error into the domain taxonomy.
fn map_client_error(err: ApiClientError, ctx: RequestContext, timeout: Duration) -> LeadgateError {
    let failed = |code: String, reason: String| -> LeadgateError {
        if ctx.write {
            LedgerError::WriteFailed { code, reason }.into()
        } else {
            LedgerError::ReadFailed { code, reason }.into()
        }
    };

    match err {
        ApiClientError::Http(e) if e.is_timeout() => LedgerError::Timeout { elapsed: timeout }.into(),
        ApiClientError::Http(e) if e.is_connect() => LedgerError::Unavailable {
            reason: e.to_string(),
        }
        .into(),
        ApiClientError::Http(e) => failed("http".to_string(), e.to_string()),
        ApiClientError::Serde(e) => failed("decode".to_string(), e.to_string()),
        ApiClientError::InvalidResponse(msg) => failed("invalid_response".to_string(), msg),
        ApiClientError::Config(msg) => failed("config".to_string(), msg),
        ApiClientError::Api {
            status,
            code,
            message,
        } => match (status, code.as_str(), ctx.lead_id) {
            (_, "TOKEN_EXPIRED", _) => AuthError::TokenExpired.into(),
            (401, _, _) | (_, "UNAUTHORIZED" | "INVALID_TOKEN", _) => {
                AuthError::InvalidToken { reason: message }.into()
            }
            (_, "LEAD_NOT_FOUND", Some(lead_id)) => LedgerError::UnknownLead { lead_id }.into(),
            (_, "VISIT_NOT_FOUND", Some(lead_id)) => LedgerError::VisitNotFound {
                user_id: ctx.user_id,
                lead_id,
            }
            .into(),
            (400, _, _) => ValidationError::InvalidValue {
                field: "request".to_string(),
                reason: message,
            }
            .into(),
            (_, "TIMEOUT", _) | (504, _, _) => LedgerError::Timeout { elapsed: timeout }.into(),
            (503, _, _) => LedgerError::Unavailable { reason: message }.into(),
            _ => failed(code.clone(), message),
        },
    }
}

#[async_trait]
impl UnlockBackend for ApiClient {
    async fn record_visit(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
    ) -> LeadgateResult<VisitRecord> {
        let ctx = RequestContext {
            user_id: caller.user_id,
            lead_id: Some(lead_id),
            write: true,
        };
        self.post_visit(caller.bearer()?, lead_id)
            .await
            .map_err(|e| self.domain_error(e, ctx))
    }

    async fn unlock_status(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
    ) -> LeadgateResult<UnlockStatus> {
        let ctx = RequestContext {
            user_id: caller.user_id,
            lead_id: Some(lead_id),
            write: false,
        };
        self.get_unlock_status(caller.bearer()?, lead_id)
            .await
            .map_err(|e| self.domain_error(e, ctx))
    }

    async fn update_pitch(
        &self,
        caller: &Credentials,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord> {
        let ctx = RequestContext {
            user_id: caller.user_id,
            lead_id: Some(lead_id),
            write: true,
        };
        self.put_pitch(caller.bearer()?, lead_id, pitch)
            .await
            .map_err(|e| self.domain_error(e, ctx))
    }

    async fn unlocked_leads(&self, caller: &Credentials) -> LeadgateResult<Vec<UnlockedLead>> {
        let ctx = RequestContext {
            user_id: caller.user_id,
            lead_id: None,
            write: false,
        };
        self.list_unlocked(caller.bearer()?)
            .await
            .map(|page| page.leads)
            .map_err(|e| self.domain_error(e, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgate_core::EntityIdType;

    fn ctx(write: bool) -> RequestContext {
        RequestContext {
            user_id: UserId::nil(),
            lead_id: Some(LeadId::nil()),
            write,
        }
    }

    fn api(status: u16, code: &str) -> ApiClientError {
        ApiClientError::Api {
            status,
            code: code.to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_new_rejects_empty_url() {
        assert!(matches!(
            ApiClient::new("  ", Duration::from_secs(1)),
            Err(ApiClientError::Config(_))
        ));
    }

    #[test]
    fn test_auth_errors_mapped() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            map_client_error(api(401, "TOKEN_EXPIRED"), ctx(false), timeout),
            LeadgateError::Auth(AuthError::TokenExpired)
        );
        assert!(matches!(
            map_client_error(api(401, "UNAUTHORIZED"), ctx(false), timeout),
            LeadgateError::Auth(AuthError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_not_found_codes_mapped() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            map_client_error(api(404, "LEAD_NOT_FOUND"), ctx(true), timeout).code(),
            "ledger.unknown_lead"
        );
        assert_eq!(
            map_client_error(api(404, "VISIT_NOT_FOUND"), ctx(true), timeout).code(),
            "ledger.visit_not_found"
        );
    }

    #[test]
    fn test_server_failures_keep_code() {
        let timeout = Duration::from_secs(1);
        let err = map_client_error(api(500, "DATABASE_ERROR"), ctx(true), timeout);
        assert!(matches!(
            err,
            LeadgateError::Ledger(LedgerError::WriteFailed { ref code, .. }) if code == "DATABASE_ERROR"
        ));
        let err = map_client_error(api(500, "DATABASE_ERROR"), ctx(false), timeout);
        assert!(matches!(err, LeadgateError::Ledger(LedgerError::ReadFailed { .. })));
        assert_eq!(
            map_client_error(api(503, "SERVICE_UNAVAILABLE"), ctx(false), timeout).code(),
            "ledger.unavailable"
        );
        assert_eq!(
            map_client_error(api(504, "TIMEOUT"), ctx(false), timeout).code(),
            "ledger.timeout"
        );
    }

    #[test]
    fn test_validation_mapped() {
        let err = map_client_error(api(400, "VALIDATION_FAILED"), ctx(true), Duration::from_secs(1));
        assert!(matches!(err, LeadgateError::Validation(_)));
    }

    #[tokio::test]
    async fn test_backend_requires_token() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let caller = Credentials::new(UserId::now_v7());
        let err = client.record_visit(&caller, LeadId::now_v7()).await.unwrap_err();
        assert_eq!(err.code(), "auth.no_caller");
    }
}
