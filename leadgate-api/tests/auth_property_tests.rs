//! Property-Based Tests for Caller Authentication
//!
//! **Property 7: Caller Identity**
//!
//! For any user, a token minted for that user SHALL authenticate as exactly
//! that user; a token signed with another secret, altered in transit, or
//! expired beyond the clock skew SHALL be rejected.

use leadgate_api::{
    authenticate, generate_jwt_token, validate_jwt_token, AuthConfig, ErrorCode, FixedClock,
};
use leadgate_test_utils::generators::arb_user_id;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

const NOW: i64 = 1_750_000_000;

fn config(secret: &str, now: i64) -> AuthConfig {
    AuthConfig::with_secret(secret, Arc::new(FixedClock(now))).expect("valid secret")
}

fn arb_secret() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{32,64}"
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_token_authenticates_its_subject(user in arb_user_id(), secret in arb_secret()) {
        let cfg = config(&secret, NOW);
        let token = generate_jwt_token(&cfg, user)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let ctx = authenticate(&cfg, Some(&format!("Bearer {}", token)))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(ctx.user_id, user);
    }

    #[test]
    fn prop_foreign_secret_rejected(
        user in arb_user_id(),
        secret in arb_secret(),
        other in arb_secret(),
    ) {
        prop_assume!(secret != other);
        let token = generate_jwt_token(&config(&secret, NOW), user)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let err = validate_jwt_token(&config(&other, NOW), &token);
        prop_assert!(err.is_err());
        prop_assert_eq!(err.err().map(|e| e.code), Some(ErrorCode::InvalidToken));
    }

    #[test]
    fn prop_tampered_payload_rejected(user in arb_user_id(), other in arb_user_id()) {
        prop_assume!(user != other);
        let cfg = config("property-test-secret-0123456789abcdef", NOW);
        let token = generate_jwt_token(&cfg, user)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let forged = generate_jwt_token(&cfg, other)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        // Splice the other user's payload onto this token's signature.
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        prop_assert_eq!(parts.len(), 3);
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        prop_assert!(validate_jwt_token(&cfg, &spliced).is_err());
    }

    #[test]
    fn prop_expiry_respects_clock_skew(user in arb_user_id(), overshoot in 0i64..600) {
        let issuer = config("property-test-secret-0123456789abcdef", NOW);
        let token = generate_jwt_token(&issuer, user)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let exp = NOW + issuer.jwt_expiration_secs;
        let verifier = config("property-test-secret-0123456789abcdef", exp + overshoot);
        let result = validate_jwt_token(&verifier, &token);

        if overshoot <= verifier.jwt_clock_skew_secs {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(result.err().map(|e| e.code), Some(ErrorCode::TokenExpired));
        }
    }
}
