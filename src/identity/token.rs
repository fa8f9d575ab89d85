//! Locally issued, HMAC-signed bearer tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Principal, PrincipalSource};
use crate::error::{AppError, AppResult};

/// Claim set carried by a local token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalClaims {
    pub sub: String,
    pub role: String,
    pub source: String,
    /// Unique token id.
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").field("issuer", &self.issuer).field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl_hours: i64) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::internal("config", "local token secret must not be empty"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl: Duration::hours(ttl_hours),
        })
    }

    pub fn issuer(&self) -> &str { &self.issuer }

    /// Sign a token for `user_id` acting as `role`, valid for the configured ttl.
    pub fn issue(&self, user_id: &str, role: &str) -> AppResult<String> {
        self.issue_at(user_id, role, Utc::now().timestamp())
    }

    /// Sign a token as if issued at `now` (unix seconds).
    pub fn issue_at(&self, user_id: &str, role: &str, now: i64) -> AppResult<String> {
        let claims = LocalClaims {
            sub: user_id.to_string(),
            role: role.to_string(),
            source: PrincipalSource::Local.as_str().to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl.num_seconds(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal("token_sign", e.to_string()))
    }

    pub fn verify(&self, token: &str) -> AppResult<Principal> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify signature, issuer and expiry (`now < exp`) and map to a local principal.
    pub fn verify_at(&self, token: &str, now: i64) -> AppResult<Principal> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked below against the caller's clock
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<LocalClaims>(token, &self.decoding, &validation).map_err(|e| {
            let code = match e.kind() {
                ErrorKind::InvalidSignature => "invalid_signature",
                ErrorKind::InvalidIssuer => "invalid_issuer",
                ErrorKind::ExpiredSignature => "token_expired",
                _ => "malformed_token",
            };
            debug!(target: "courtbook::identity", "local token rejected: {}", code);
            AppError::authentication(code, "local token rejected")
        })?;
        let claims = data.claims;
        if now >= claims.exp {
            return Err(AppError::authentication("token_expired", "local token expired"));
        }
        if claims.source != PrincipalSource::Local.as_str() {
            return Err(AppError::authentication("malformed_token", "unexpected token source"));
        }
        if claims.sub.is_empty() || claims.role.is_empty() {
            return Err(AppError::authentication("malformed_token", "missing subject or role"));
        }
        Ok(Principal::local(claims.sub, claims.role))
    }
}
