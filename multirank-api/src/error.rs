//! API error types
//!
//! Every failure surfaces as `{"error": "<code>", ...}` with the matching
//! HTTP status. Write failures roll back their enclosing transaction before
//! reaching this layer, so no partial writes are ever visible.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Convenience Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Main error type for the multirank API
#[derive(Error, Debug)]
pub enum ApiError {
    /// No session cookie or the session is expired
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown username, wrong password, or inactive account
    #[error("credenciales_invalidas")]
    BadCredentials,

    /// Caller is neither the owner nor an admin
    #[error("forbidden")]
    Forbidden,

    /// Edit attempt on a submitted evaluation by a non-admin
    #[error("evaluacion_submitted_readonly")]
    SubmittedReadonly,

    /// Missing instrument/evaluation/category/item/user
    #[error("{0}")]
    NotFound(&'static str),

    /// Malformed or invalid payload; `extra` carries context keys
    /// (categoria_code, item_id, ...)
    #[error("{code}")]
    Invalid {
        code: &'static str,
        extra: Map<String, Value>,
    },

    /// Rank value uniqueness violation, with a human-readable scope
    #[error("rank_duplicado")]
    RankDuplicate { detalle: String },

    /// Unexpected persistence failure; transaction already rolled back
    #[error("{0}")]
    Db(&'static str),
}

impl ApiError {
    pub fn invalid(code: &'static str) -> Self {
        ApiError::Invalid {
            code,
            extra: Map::new(),
        }
    }

    pub fn invalid_with(code: &'static str, key: &str, value: Value) -> Self {
        let mut extra = Map::new();
        extra.insert(key.to_string(), value);
        ApiError::Invalid { code, extra }
    }

    /// Log the underlying sqlx error and map it: unique-constraint
    /// violations become `rank_duplicado`, anything else the given
    /// `db_error_*` code.
    pub fn from_sqlx(err: sqlx::Error, db_code: &'static str, detalle: &str) -> Self {
        if is_unique_violation(&err) {
            return ApiError::RankDuplicate {
                detalle: detalle.to_string(),
            };
        }
        tracing::error!("Database error ({}): {}", db_code, err);
        ApiError::Db(db_code)
    }
}

/// True if the error is a storage-level UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({"error": "unauthorized"})),
            ApiError::BadCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "credenciales_invalidas"}),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, json!({"error": "forbidden"})),
            ApiError::SubmittedReadonly => (
                StatusCode::FORBIDDEN,
                json!({"error": "evaluacion_submitted_readonly"}),
            ),
            ApiError::NotFound(code) => (StatusCode::NOT_FOUND, json!({"error": code})),
            ApiError::Invalid { code, extra } => {
                let mut body = Map::new();
                body.insert("error".to_string(), Value::String(code.to_string()));
                body.extend(extra);
                (StatusCode::BAD_REQUEST, Value::Object(body))
            }
            ApiError::RankDuplicate { detalle } => (
                StatusCode::BAD_REQUEST,
                json!({"error": "rank_duplicado", "detalle": detalle}),
            ),
            ApiError::Db(code) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": code})),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn invalid_with_carries_context_key() {
        let err = ApiError::invalid_with("categoria_invalida", "categoria_code", json!("C9"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn statuses_match_error_kinds() {
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::SubmittedReadonly.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("evaluacion_not_found")
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Db("db_error_submit").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
