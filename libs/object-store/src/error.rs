use std::time::Duration;

use reqwest::{Error as ReqwestError, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("transient remote failure: {0}")]
    Transient(String),
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Network hiccups, throttling and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Timeout(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Auth(_))
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", body.trim())
        };

        if status == StatusCode::FORBIDDEN && is_rate_limited(body) {
            RemoteError::Transient(detail)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            RemoteError::Auth(detail)
        } else if status == StatusCode::NOT_FOUND {
            RemoteError::NotFound(detail)
        } else if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            RemoteError::Transient(detail)
        } else {
            RemoteError::Rejected(detail)
        }
    }
}

const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Drive reports throttling as 403 with a `reason` of `rateLimitExceeded` or
/// `userRateLimitExceeded`, either at the top level or under `error.errors[]`.
fn is_rate_limited(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let is_limit = |reason: Option<&Value>| {
        reason
            .and_then(Value::as_str)
            .is_some_and(|reason| RATE_LIMIT_REASONS.contains(&reason))
    };

    if is_limit(parsed.get("reason")) {
        return true;
    }
    parsed
        .pointer("/error/errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| errors.iter().any(|error| is_limit(error.get("reason"))))
}

impl From<ReqwestError> for RemoteError {
    fn from(error: ReqwestError) -> Self {
        if let Some(status) = error.status() {
            return RemoteError::from_status(status, "");
        }
        if error.is_decode() {
            RemoteError::Decode(error.to_string())
        } else {
            RemoteError::Transient(error.to_string())
        }
    }
}
