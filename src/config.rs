use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Process settings. Every component receives the slice it needs from here; nothing
/// reads the environment after startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub http_port: u16,
    /// Snapshot directory for the store; in-memory only when unset.
    pub data_dir: Option<String>,
    /// HMAC secret for local tokens.
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// `iss` written into (and required of) local tokens.
    pub local_issuer: String,
    /// The only federated issuer accepted. When unset all federated tokens are rejected.
    pub federated_issuer: Option<String>,
    /// Claim carrying the federated group list.
    pub federated_groups_claim: String,
    pub local_header: String,
    pub federated_header: String,
    pub token_ttl_hours: i64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: 8080,
            data_dir: None,
            jwt_secret: String::new(),
            local_issuer: "courtbook".to_string(),
            federated_issuer: None,
            federated_groups_claim: "cognito:groups".to_string(),
            local_header: "Authorization".to_string(),
            federated_header: "CognitoAuthorization".to_string(),
            token_ttl_hours: 24,
            request_timeout_secs: 29,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Settings {
    /// Load from `COURTBOOK_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_opt)
    }

    /// Same as `from_env` with an injectable lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut s = Settings::default();
        if let Some(v) = get("COURTBOOK_HTTP_PORT") {
            s.http_port = v.parse().with_context(|| format!("COURTBOOK_HTTP_PORT='{}'", v))?;
        }
        s.data_dir = get("COURTBOOK_DATA_DIR");
        if let Some(v) = get("COURTBOOK_JWT_SECRET") { s.jwt_secret = v; }
        if let Some(v) = get("COURTBOOK_LOCAL_ISSUER") { s.local_issuer = v; }
        s.federated_issuer = get("COURTBOOK_FEDERATED_ISSUER");
        if let Some(v) = get("COURTBOOK_FEDERATED_GROUPS_CLAIM") { s.federated_groups_claim = v; }
        if let Some(v) = get("COURTBOOK_LOCAL_HEADER") { s.local_header = v; }
        if let Some(v) = get("COURTBOOK_FEDERATED_HEADER") { s.federated_header = v; }
        if let Some(v) = get("COURTBOOK_TOKEN_TTL_HOURS") {
            s.token_ttl_hours = v.parse().with_context(|| format!("COURTBOOK_TOKEN_TTL_HOURS='{}'", v))?;
        }
        if let Some(v) = get("COURTBOOK_REQUEST_TIMEOUT_SECS") {
            s.request_timeout_secs = v.parse().with_context(|| format!("COURTBOOK_REQUEST_TIMEOUT_SECS='{}'", v))?;
        }
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_hours <= 0 { return Err(anyhow!("token ttl must be positive")); }
        if self.request_timeout_secs == 0 { return Err(anyhow!("request timeout must be positive")); }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
}
