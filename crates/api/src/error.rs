// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API error surface with HTTP status mapping.

use serde_json::json;
use thiserror::Error;

use fm_engine::EngineError;

/// Client-facing error. Internal detail never leaks into 500 bodies; a
/// correlation id ties the generic message to the logged cause.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error (ref {correlation_id})")]
    Internal { correlation_id: uuid::Uuid },
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::NotFound => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::Internal { .. } => 500,
        }
    }

    /// Error body shape: `{ "error": "..." }`.
    pub fn body(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }

    /// Wrap an internal failure: log the detail, hand out a reference.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        let correlation_id = uuid::Uuid::new_v4();
        tracing::error!(%correlation_id, error = %err, "internal api error");
        ApiError::Internal { correlation_id }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::RunNotFound(_)
            | EngineError::StepNotFound(_)
            | EngineError::GateNotFound(_) => ApiError::NotFound,
            EngineError::StepNotRetryable { id, status } => {
                ApiError::Validation(format!("step {id} is not retryable from status {status}"))
            }
            EngineError::InvalidPlan(msg) => ApiError::Validation(msg),
            other => ApiError::internal(other),
        }
    }
}

impl From<fm_store::StoreError> for ApiError {
    fn from(err: fm_store::StoreError) -> Self {
        ApiError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status_code(), 400);
        assert_eq!(ApiError::Unauthorized.status_code(), 401);
        assert_eq!(ApiError::NotFound.status_code(), 404);
        assert_eq!(ApiError::MethodNotAllowed.status_code(), 405);
        assert_eq!(ApiError::internal("boom").status_code(), 500);
    }

    #[test]
    fn body_shape() {
        let body = ApiError::Validation("plan required".into()).body();
        assert_eq!(body, serde_json::json!({"error": "plan required"}));
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ApiError::internal("connection refused to 10.0.0.3");
        assert!(!err.to_string().contains("10.0.0.3"));
        assert!(err.to_string().starts_with("internal error"));
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        let err: ApiError =
            EngineError::RunNotFound(fm_core::RunId::from_string("run-x")).into();
        assert_eq!(err.status_code(), 404);
    }
}
