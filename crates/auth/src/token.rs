//! HS256 bearer credential verification and issuance.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use bizhub_core::CompanyId;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};
use crate::config::AuthConfig;
use crate::PrincipalKind;

/// Verifies an opaque bearer credential and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator.
///
/// Only the signature is checked by `jsonwebtoken`; the time window is
/// checked by [`validate_claims`] against the caller-supplied `now`.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes())
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let claims = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

#[derive(Debug, Error)]
#[error("token encoding failed: {0}")]
pub struct TokenIssueError(String);

/// Mints HS256 credentials (used by the login flow and by tests).
pub struct Hs256JwtIssuer {
    key: EncodingKey,
    lifetime: Duration,
}

impl Hs256JwtIssuer {
    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_ref()),
            lifetime,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            Duration::seconds(config.token_lifetime_secs as i64),
        )
    }

    pub fn issue(
        &self,
        kind: PrincipalKind,
        sub: Uuid,
        company_id: Option<CompanyId>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenIssueError> {
        let claims = JwtClaims {
            sub,
            kind,
            company_id,
            issued_at: now,
            expires_at: now + self.lifetime,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| TokenIssueError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_validates() {
        let now = Utc::now();
        let issuer = Hs256JwtIssuer::new(SECRET, Duration::minutes(10));
        let sub = Uuid::now_v7();
        let company_id = CompanyId::new();

        let token = issuer
            .issue(PrincipalKind::CompanyUser, sub, Some(company_id), now)
            .unwrap();
        let claims = Hs256JwtValidator::new(SECRET).validate(&token, now).unwrap();

        assert_eq!(claims.sub, sub);
        assert_eq!(claims.kind, PrincipalKind::CompanyUser);
        assert_eq!(claims.company_id, Some(company_id));
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let token = Hs256JwtIssuer::new(SECRET, Duration::minutes(10))
            .issue(PrincipalKind::Owner, Uuid::now_v7(), None, now)
            .unwrap();

        let err = Hs256JwtValidator::new("other-secret")
            .validate(&token, now)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn expiry_uses_supplied_clock() {
        let now = Utc::now();
        let token = Hs256JwtIssuer::new(SECRET, Duration::minutes(10))
            .issue(PrincipalKind::Owner, Uuid::now_v7(), None, now)
            .unwrap();

        let err = Hs256JwtValidator::new(SECRET)
            .validate(&token, now + Duration::minutes(11))
            .unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Hs256JwtValidator::new(SECRET)
            .validate("not.a.jwt", Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }
}
