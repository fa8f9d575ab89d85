//! Unified application error model and mapping helpers.
//! Every core operation (identity resolution, authorization, attendance allocation,
//! session administration) returns `AppResult`. The categories are fixed; the HTTP
//! layer only translates them to status codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Missing, invalid, expired or malformed credential; untrusted issuer.
    #[error("{code}: {message}")]
    Authentication { code: String, message: String },
    /// Authenticated principal lacks the permission or role.
    #[error("{code}: {message}")]
    Authorization { code: String, message: String },
    /// Structurally invalid input.
    #[error("{code}: {message}")]
    Validation { code: String, message: String },
    /// State-dependent rejection.
    #[error("{code}: {message}")]
    Conflict { code: String, message: String },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    /// Store unreachable, transaction failure, misconfiguration.
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Authentication { code, .. }
            | AppError::Authorization { code, .. }
            | AppError::Validation { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Authentication { message, .. }
            | AppError::Authorization { message, .. }
            | AppError::Validation { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn authentication<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Authentication { code: code.into(), message: msg.into() } }
    pub fn authorization<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Authorization { code: code.into(), message: msg.into() } }
    pub fn validation<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// True for rejections the caller can react to. These are never logged as faults.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Internal { .. })
    }

    /// Message safe to hand to a caller. Internal detail stays in the logs.
    pub fn public_message(&self) -> &str {
        match self {
            AppError::Internal { .. } => "internal error",
            other => other.message(),
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Authentication { .. } => 401,
            AppError::Authorization { .. } => 403,
            AppError::Validation { .. } => 400,
            AppError::Conflict { .. } => 409,
            AppError::NotFound { .. } => 404,
            AppError::Internal { .. } => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::Unavailable => "store_unavailable",
            StoreError::Io(_) => "store_io",
            StoreError::Codec(_) => "store_codec",
            StoreError::Overflow(_) => "occupancy_overflow",
        };
        AppError::Internal { code: code.into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
