// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::batch::BatchError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Validation(cause) => Self::bad_request(cause.to_string()),
            BatchError::Security(_) => Self::forbidden("Incorrect key or invalid data"),
            BatchError::Storage(cause) => {
                error!(error = %cause, "Storage failure while running batch");
                Self::internal("Internal storage error")
            }
            BatchError::Interrupted(cause) => {
                error!(error = %cause, "Batch task ended abnormally");
                Self::internal("Batch did not complete")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationError;
    use crate::secrets::CipherError;
    use crate::storage::StoreError;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let forbidden = ApiError::forbidden("no");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

        let internal = ApiError::internal("oops");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message, "oops");
    }

    #[test]
    fn batch_errors_map_to_statuses() {
        let validation: ApiError = BatchError::Validation(ValidationError::new("Invalid amount")).into();
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.message, "Invalid amount");

        let malformed: ApiError = BatchError::Security(CipherError::InvalidKey).into();
        let wrong: ApiError = BatchError::Security(CipherError::Integrity).into();
        assert_eq!(malformed.status, StatusCode::FORBIDDEN);
        assert_eq!(malformed.message, wrong.message);

        let storage: ApiError = BatchError::Storage(StoreError::Poisoned).into();
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!storage.message.contains("poisoned"));
    }

    #[tokio::test]
    async fn interrupted_batch_is_an_internal_error() {
        let join_error = tokio::spawn(async { panic!("driver task died") })
            .await
            .unwrap_err();
        let interrupted: ApiError = BatchError::Interrupted(join_error).into();
        assert_eq!(interrupted.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!interrupted.message.contains("driver task died"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
