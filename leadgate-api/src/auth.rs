//! Authentication Module
//!
//! Resolves the caller identity for every ledger endpoint from a JWT carried
//! in the `Authorization: Bearer` header. The token's `sub` claim is the
//! caller's user UUID; nothing else about the caller is trusted.

use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use leadgate_core::{ConfigError, EntityIdType, LeadgateError, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for JWT time validation.
///
/// Expiry is checked against this clock rather than inside `jsonwebtoken`,
/// so tests can pin the time.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// SECRET
// ============================================================================

/// JWT signing secret. Never printed.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> Result<Self, LeadgateError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            }
            .into());
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value for signing and verification only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

fn build_jwt_secret(secret_str: String) -> JwtSecret {
    JwtSecret::new(secret_str)
        .unwrap_or_else(|_| JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.into())))
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared secret for HS* signatures
    pub jwt_secret: JwtSecret,

    /// Accepted signature algorithm
    pub jwt_algorithm: Algorithm,

    /// Lifetime of tokens minted by [`generate_jwt_token`]
    pub jwt_expiration_secs: i64,

    /// Tolerance applied to `exp` for clock drift between issuer and server
    pub jwt_clock_skew_secs: i64,

    /// Clock for JWT time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: build_jwt_secret(INSECURE_DEFAULT_SECRET.to_string()),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `LEADGATE_JWT_SECRET`: JWT signing secret
    /// - `LEADGATE_JWT_EXPIRATION_SECS`: JWT token expiration (default: 3600)
    /// - `LEADGATE_JWT_CLOCK_SKEW_SECS`: JWT clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let secret_str = std::env::var("LEADGATE_JWT_SECRET")
            .unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("LEADGATE_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            jwt_clock_skew_secs: std::env::var("LEADGATE_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            clock: Arc::new(SystemClock),
        }
    }

    /// Configuration with an explicit secret and clock.
    pub fn with_secret(secret: &str, clock: Arc<dyn JwtClock>) -> ApiResult<Self> {
        let jwt_secret = JwtSecret::new(secret.to_string()).map_err(ApiError::from)?;
        Ok(Self {
            jwt_secret,
            clock,
            ..Self::default()
        })
    }

    /// Refuse insecure secrets when `LEADGATE_ENVIRONMENT` is production.
    ///
    /// Outside production the problems are logged and startup continues.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("LEADGATE_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();
        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::internal_error(
                    "Cannot start in production with the default JWT secret. \
                     Set LEADGATE_JWT_SECRET.",
                ));
            }
            tracing::warn!("Using insecure default JWT secret; set LEADGATE_JWT_SECRET");
        } else if self.jwt_secret.len() < 32 {
            if is_production {
                return Err(ApiError::internal_error(format!(
                    "JWT secret is too short for production use ({} chars, need 32)",
                    self.jwt_secret.len()
                )));
            }
            tracing::warn!(
                len = self.jwt_secret.len(),
                "JWT secret is shorter than 32 characters"
            );
        }

        Ok(())
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims accepted by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the caller's user UUID
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: UserId, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: user_id.to_string(),
            iat: now,
            exp: now + expiration_secs,
        }
    }

    /// Parse the subject as a user ID.
    pub fn user_id(&self) -> ApiResult<UserId> {
        Uuid::parse_str(&self.sub)
            .map(UserId::new)
            .map_err(|_| ApiError::invalid_token("Token subject is not a user ID"))
    }
}

/// Authenticated caller resolved from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
}

// ============================================================================
// TOKEN OPERATIONS
// ============================================================================

fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT token and extract its claims.
///
/// The signature is checked by `jsonwebtoken`; expiry is checked here against
/// the configured clock with the configured skew.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?;

    let claims = token_data.claims;
    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(timestamp = now, "System clock returned pre-epoch time");
        return Err(ApiError::internal_error("Server time configuration error"));
    }

    validate_claim_times(now, claims.exp, config.jwt_clock_skew_secs)?;
    Ok(claims)
}

/// Mint a token for a user. Used by operators and tests; the API itself
/// never issues tokens.
pub fn generate_jwt_token(config: &AuthConfig, user_id: UserId) -> ApiResult<String> {
    let claims = Claims::new(user_id, config.jwt_expiration_secs, &*config.clock);
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Resolve the caller from an `Authorization` header value.
pub fn authenticate(config: &AuthConfig, auth_header: Option<&str>) -> ApiResult<AuthContext> {
    let header = auth_header.ok_or_else(|| {
        ApiError::unauthorized("Authentication required: provide an Authorization header")
    })?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))?;

    let claims = validate_jwt_token(config, token.trim())?;
    Ok(AuthContext {
        user_id: claims.user_id()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const NOW: i64 = 1_700_000_000;

    fn config_at(now: i64) -> AuthConfig {
        AuthConfig {
            jwt_secret: build_jwt_secret("test-secret-that-is-long-enough-1234".to_string()),
            clock: Arc::new(FixedClock(now)),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_token_round_trip_yields_user() {
        let config = config_at(NOW);
        let user = UserId::now_v7();
        let token = generate_jwt_token(&config, user).unwrap();

        let ctx = authenticate(&config, Some(&format!("Bearer {}", token))).unwrap();
        assert_eq!(ctx.user_id, user);
    }

    #[test]
    fn test_expired_token_rejected_after_skew() {
        let config = config_at(NOW);
        let token = generate_jwt_token(&config, UserId::now_v7()).unwrap();

        // Within the skew window the token is still accepted.
        let later = config_at(NOW + config.jwt_expiration_secs + 30);
        assert!(validate_jwt_token(&later, &token).is_ok());

        let much_later = config_at(NOW + config.jwt_expiration_secs + 120);
        let err = validate_jwt_token(&much_later, &token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = config_at(NOW);
        let token = generate_jwt_token(&config, UserId::now_v7()).unwrap();

        let other = AuthConfig {
            jwt_secret: build_jwt_secret("a-completely-different-secret-value".to_string()),
            ..config_at(NOW)
        };
        let err = validate_jwt_token(&other, &token).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let config = config_at(NOW);
        assert_eq!(
            authenticate(&config, None).unwrap_err().code,
            ErrorCode::Unauthorized
        );
        assert_eq!(
            authenticate(&config, Some("Basic abc")).unwrap_err().code,
            ErrorCode::InvalidToken
        );
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            iat: NOW,
            exp: NOW + 60,
        };
        assert_eq!(claims.user_id().unwrap_err().code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = build_jwt_secret("super-secret-value".to_string());
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_blank_secret_falls_back_to_default() {
        let secret = build_jwt_secret("   ".to_string());
        assert!(secret.is_insecure_default());
    }
}
