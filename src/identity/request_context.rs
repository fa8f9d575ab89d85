use super::Principal;
use crate::error::{AppError, AppResult};

/// Per-request state produced by identity resolution. A missing principal means
/// the request is anonymous.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self { Self::default() }

    pub fn authenticated(principal: Principal) -> Self {
        Self { principal: Some(principal), request_id: None }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// The principal, or an `unauthenticated` rejection for anonymous requests.
    pub fn require_principal(&self) -> AppResult<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| AppError::authentication("unauthenticated", "authentication required"))
    }
}
