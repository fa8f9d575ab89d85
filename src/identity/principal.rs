use std::fmt;

use serde::{Deserialize, Serialize};

/// Which trust source produced a principal. Federated principals are lower
/// assurance: their token signature is never checked here, only the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalSource {
    Local,
    Federated,
}

impl PrincipalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalSource::Local => "local",
            PrincipalSource::Federated => "federated",
        }
    }
}

impl fmt::Display for PrincipalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Resolved caller identity for one request. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
    pub source: PrincipalSource,
}

impl Principal {
    pub fn local(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: role.into(), source: PrincipalSource::Local }
    }

    pub fn federated(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: role.into(), source: PrincipalSource::Federated }
    }
}
