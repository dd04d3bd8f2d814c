//! Session handling: login, logout, and the `Session` extractor
//!
//! Sessions are DB-backed opaque tokens delivered in an HttpOnly cookie.
//! The session row carries user id, role id and the admin flag; admin-ness
//! is decided once at login by comparing the user's role name against the
//! configured admin role name.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::{Duration, Utc};
use multirank_common::hash::sha256_hex;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "multirank_session";

/// Authenticated caller identity, extracted from the session cookie
#[derive(Debug, Clone)]
pub struct Session {
    pub usuario_id: i64,
    pub rol_id: i64,
    pub is_admin: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
        load_session(&state.pool, &token).await
    }
}

/// Extract a cookie value from the Cookie header
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        if let Some((key, value)) = pair.trim().split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Load an unexpired session row; expired rows are deleted on sight
async fn load_session(pool: &SqlitePool, token: &str) -> ApiResult<Session> {
    let row: Option<(i64, i64, bool, bool)> = sqlx::query_as(
        "SELECT usuario_id, rol_id, is_admin, expires_at > datetime('now') \
         FROM sesion WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_session", ""))?;

    match row {
        Some((usuario_id, rol_id, is_admin, valid)) if valid => Ok(Session {
            usuario_id,
            rol_id,
            is_admin,
        }),
        Some(_) => {
            let _ = sqlx::query("DELETE FROM sesion WHERE token = ?")
                .bind(token)
                .execute(pool)
                .await;
            Err(ApiError::Unauthorized)
        }
        None => Err(ApiError::Unauthorized),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/login - validate credentials and start a session
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::invalid("payload_invalid"));
    }

    let user: Option<(i64, String, i64, bool)> = sqlx::query_as(
        "SELECT usuario_id, password_sha256, rol_id, is_active \
         FROM usuario WHERE nombre_usuario = ?",
    )
    .bind(username)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_login", ""))?;

    let (usuario_id, password_sha256, rol_id, is_active) = match user {
        Some(u) => u,
        None => return Err(ApiError::BadCredentials),
    };

    if !is_active || sha256_hex(&req.password) != password_sha256 {
        return Err(ApiError::BadCredentials);
    }

    // Admin-ness by role-name match against the configured constant
    let rol_nombre: Option<String> = sqlx::query_scalar("SELECT nombre FROM rol WHERE rol_id = ?")
        .bind(rol_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_login", ""))?;

    let is_admin = rol_nombre
        .map(|n| n.trim().eq_ignore_ascii_case(state.admin_role_name.trim()))
        .unwrap_or(false);

    let token = Uuid::new_v4().to_string();
    let expires_at = (Utc::now() + Duration::seconds(state.session_ttl_seconds)).naive_utc();

    sqlx::query(
        "INSERT INTO sesion (token, usuario_id, rol_id, is_admin, expires_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(usuario_id)
    .bind(rol_id)
    .bind(is_admin)
    .bind(expires_at)
    .execute(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_login", ""))?;

    info!("Login: usuario_id={} is_admin={}", usuario_id, is_admin);

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, state.session_ttl_seconds
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({
            "ok": true,
            "usuario_id": usuario_id,
            "rol_id": rol_id,
            "is_admin": is_admin,
        })),
    ))
}

/// POST /api/logout - drop the session row and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        sqlx::query("DELETE FROM sesion WHERE token = ?")
            .bind(&token)
            .execute(&state.pool)
            .await
            .map_err(|e| ApiError::from_sqlx(e, "db_error_logout", ""))?;
    }

    let cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({"ok": true})),
    ))
}

/// Shorthand for payload fields that must be non-empty strings
pub(crate) fn required_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_parsing_finds_session_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; multirank_session=abc-123; x=y"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("abc-123")
        );
    }

    #[test]
    fn cookie_parsing_missing_returns_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("other=1"));
        assert!(cookie_value(&headers, SESSION_COOKIE).is_none());
    }
}
