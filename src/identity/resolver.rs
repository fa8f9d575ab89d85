use axum::http::HeaderMap;
use tracing::debug;

use super::{FederatedVerifier, RequestContext, TokenIssuer};
use crate::config::Settings;
use crate::error::{AppError, AppResult};

/// Turns raw request credentials into at most one principal.
///
/// The two credential variants arrive in different headers and are verified by
/// different code paths; a request carrying both is rejected rather than guessed at.
#[derive(Debug)]
pub struct IdentityResolver {
    local: TokenIssuer,
    federated: FederatedVerifier,
    local_header: String,
    federated_header: String,
}

/// Extract the token of a `Bearer <token>` header value.
fn bearer_token(raw: &axum::http::HeaderValue) -> AppResult<&str> {
    let text = raw.to_str().map_err(|_| AppError::authentication("malformed_credential", "credential header is not ASCII"))?;
    let (scheme, token) = text
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::authentication("malformed_credential", "expected a bearer credential"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::authentication("malformed_credential", "expected a bearer credential"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::authentication("malformed_credential", "empty bearer credential"));
    }
    Ok(token)
}

impl IdentityResolver {
    pub fn new(local: TokenIssuer, federated: FederatedVerifier, local_header: &str, federated_header: &str) -> Self {
        Self {
            local,
            federated,
            local_header: local_header.to_ascii_lowercase(),
            federated_header: federated_header.to_ascii_lowercase(),
        }
    }

    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let local = TokenIssuer::new(settings.jwt_secret.as_bytes(), settings.local_issuer.clone(), settings.token_ttl_hours)?;
        let federated = FederatedVerifier::new(settings.federated_issuer.clone(), settings.federated_groups_claim.clone());
        Ok(Self::new(local, federated, &settings.local_header, &settings.federated_header))
    }

    /// Issuer of local tokens, shared with the login flow.
    pub fn token_issuer(&self) -> &TokenIssuer { &self.local }

    pub fn federated_enabled(&self) -> bool { self.federated.is_enabled() }

    /// Resolve the request's principal. No credential header means anonymous; a
    /// present but invalid credential is an error, never an anonymous fallback.
    pub fn resolve(&self, headers: &HeaderMap) -> AppResult<RequestContext> {
        let local = headers.get(self.local_header.as_str());
        let federated = headers.get(self.federated_header.as_str());
        let principal = match (local, federated) {
            (None, None) => return Ok(RequestContext::anonymous()),
            (Some(_), Some(_)) => {
                return Err(AppError::authentication("ambiguous_credentials", "send exactly one credential header"));
            }
            (Some(raw), None) => self.local.verify(bearer_token(raw)?)?,
            (None, Some(raw)) => self.federated.verify(bearer_token(raw)?)?,
        };
        debug!(target: "courtbook::identity", "resolved user={} source={}", principal.user_id, principal.source);
        Ok(RequestContext::authenticated(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Principal, PrincipalSource};
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    const ISSUER: &str = "https://idp.example.com/pool-1";

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(
            TokenIssuer::new(b"resolver-secret", "courtbook", 24).unwrap(),
            FederatedVerifier::new(Some(ISSUER.into()), "cognito:groups"),
            "Authorization",
            "CognitoAuthorization",
        )
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    fn federated_token(iss: &str) -> String {
        encode(&Header::new(Algorithm::HS256), &json!({"iss": iss, "sub": "fed-9", "cognito:groups": ["group_owner"]}), &EncodingKey::from_secret(b"x")).unwrap()
    }

    #[test]
    fn no_headers_is_anonymous() {
        let ctx = resolver().resolve(&HeaderMap::new()).unwrap();
        assert!(ctx.principal.is_none());
        assert_eq!(ctx.require_principal().unwrap_err().code_str(), "unauthenticated");
    }

    #[test]
    fn local_header_yields_local_principal() {
        let r = resolver();
        let token = r.token_issuer().issue("u-7", "player").unwrap();
        let ctx = r.resolve(&headers(&[("authorization", format!("Bearer {}", token))])).unwrap();
        assert_eq!(ctx.principal, Some(Principal::local("u-7", "player")));
    }

    #[test]
    fn federated_header_yields_federated_principal() {
        let ctx = resolver().resolve(&headers(&[("cognitoauthorization", format!("Bearer {}", federated_token(ISSUER)))])).unwrap();
        let p = ctx.principal.unwrap();
        assert_eq!(p.source, PrincipalSource::Federated);
        assert_eq!(p.role, "group_owner");
    }

    #[test]
    fn federated_issuer_mismatch_is_rejected() {
        let err = resolver()
            .resolve(&headers(&[("cognitoauthorization", format!("Bearer {}", federated_token("https://other")))]))
            .unwrap_err();
        assert_eq!(err.code_str(), "invalid_issuer");
    }

    #[test]
    fn malformed_credentials_fail_closed() {
        let r = resolver();
        for value in ["Bearer", "Basic abc", "Bearer    ", "Bearer garbage"] {
            let err = r.resolve(&headers(&[("authorization", value.to_string())])).unwrap_err();
            assert_eq!(err.http_status(), 401, "value {:?}", value);
        }
    }

    #[test]
    fn both_headers_are_ambiguous() {
        let r = resolver();
        let token = r.token_issuer().issue("u-7", "player").unwrap();
        let err = r
            .resolve(&headers(&[
                ("authorization", format!("Bearer {}", token)),
                ("cognitoauthorization", format!("Bearer {}", federated_token(ISSUER))),
            ]))
            .unwrap_err();
        assert_eq!(err.code_str(), "ambiguous_credentials");
    }
}
