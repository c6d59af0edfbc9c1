//! Error types for mlib-catalog
//!
//! Every failure is scoped to the request that triggered it and rendered as
//! `{ "success": false, "kind": ..., "message": ... }`.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::assets::{AssetCategory, AssetError, UploadReason};
use crate::models::ListPage;

/// Catalog service error
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Missing or malformed user input (400)
    #[error("{0}")]
    Validation(String),

    /// An uploaded asset was rejected or could not be written
    #[error("{category} upload failed: {reason}")]
    Upload {
        category: AssetCategory,
        reason: UploadReason,
    },

    /// Request body exceeded the router's limit (413)
    #[error("Request body too large: {0}")]
    BodyTooLarge(String),

    /// Unknown catalog entry (404)
    #[error("Catalog entry {0} not found")]
    NotFound(i64),

    /// Listing query exceeded its deadline (504); carries an empty page so
    /// callers can render "no results"
    #[error("Query exceeded its deadline of {timeout_ms} ms")]
    QueryTimeout { timeout_ms: u64, fallback: ListPage },

    /// Disk operation failed (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persistence backend failure (500)
    #[error(transparent)]
    Database(#[from] mlib_common::Error),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "VALIDATION_ERROR",
            CatalogError::Upload { reason, .. } if reason.is_user_correctable() => "UPLOAD_ERROR",
            CatalogError::Upload { .. } => "STORAGE_ERROR",
            CatalogError::BodyTooLarge(_) => "UPLOAD_ERROR",
            CatalogError::NotFound(_) => "NOT_FOUND",
            CatalogError::QueryTimeout { .. } => "QUERY_TIMEOUT",
            CatalogError::Storage(_) => "STORAGE_ERROR",
            CatalogError::Database(_) => "DATABASE_ERROR",
            CatalogError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
            CatalogError::Upload {
                reason: UploadReason::TooLarge { .. },
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            CatalogError::Upload { reason, .. } if reason.is_user_correctable() => {
                StatusCode::BAD_REQUEST
            }
            CatalogError::Upload { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CatalogError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::QueryTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CatalogError::Storage(_) | CatalogError::Database(_) | CatalogError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<AssetError> for CatalogError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::Upload { category, reason } => CatalogError::Upload { category, reason },
            AssetError::Storage { .. } => CatalogError::Storage(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        CatalogError::Database(mlib_common::Error::Database(err))
    }
}

impl From<PathRejection> for CatalogError {
    fn from(rejection: PathRejection) -> Self {
        CatalogError::Validation(format!("Invalid path: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for CatalogError {
    fn from(rejection: QueryRejection) -> Self {
        CatalogError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for CatalogError {
    fn from(rejection: MultipartRejection) -> Self {
        CatalogError::Validation(format!("Expected multipart/form-data: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for CatalogError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            CatalogError::BodyTooLarge(err.body_text())
        } else {
            CatalogError::Validation(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(kind, "{}", message);
        }

        let body = match self {
            CatalogError::QueryTimeout { fallback, .. } => json!({
                "success": false,
                "kind": kind,
                "message": message,
                "data": fallback,
            }),
            _ => json!({
                "success": false,
                "kind": kind,
                "message": message,
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CatalogError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CatalogError::NotFound(3).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            CatalogError::QueryTimeout {
                timeout_ms: 10,
                fallback: ListPage::empty(1, 10),
            }
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_upload_reasons_split_between_client_and_server() {
        let rejected = CatalogError::Upload {
            category: AssetCategory::CoverImage,
            reason: UploadReason::DisallowedExtension {
                extension: "exe".into(),
            },
        };
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rejected.kind(), "UPLOAD_ERROR");

        let too_large = CatalogError::Upload {
            category: AssetCategory::LessonDocument,
            reason: UploadReason::TooLarge {
                size: 11,
                max_size: 10,
            },
        };
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let failed = CatalogError::Upload {
            category: AssetCategory::ScoreDocument,
            reason: UploadReason::WriteFailed("disk full".into()),
        };
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failed.kind(), "STORAGE_ERROR");
    }

    #[test]
    fn test_body_limit_is_an_upload_error() {
        let err = CatalogError::BodyTooLarge("length limit exceeded".into());
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.kind(), "UPLOAD_ERROR");
    }
}
