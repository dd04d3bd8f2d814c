//! HTTP API handlers

pub mod admin;
pub mod catalog;
pub mod health;
pub mod progress;
pub mod rankings;
pub mod session;
pub mod summary;

use crate::error::{ApiError, ApiResult};
use multirank_common::db::models::{EvalStatus, Evaluacion};
use session::Session;
use sqlx::SqlitePool;

/// Fetch an evaluation or fail with `evaluacion_not_found`
pub(crate) async fn get_evaluacion(pool: &SqlitePool, evaluacion_id: i64) -> ApiResult<Evaluacion> {
    sqlx::query_as::<_, Evaluacion>(
        "SELECT evaluacion_id, instrumento_id, usuario_id, rol_id_snapshot, \
                rol_peso_snapshot, status, submitted_at \
         FROM evaluacion WHERE evaluacion_id = ?",
    )
    .bind(evaluacion_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_load_evaluacion", ""))?
    .ok_or(ApiError::NotFound("evaluacion_not_found"))
}

/// Only the owner or an admin may touch an evaluation
pub(crate) fn ensure_owner_or_admin(ev: &Evaluacion, session: &Session) -> ApiResult<()> {
    if ev.usuario_id != session.usuario_id && !session.is_admin {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Drafts are editable by their owner; submitted evaluations only by admins
pub(crate) fn ensure_editable(ev: &Evaluacion, session: &Session) -> ApiResult<()> {
    if ev.status() == EvalStatus::Submitted && !session.is_admin {
        return Err(ApiError::SubmittedReadonly);
    }
    Ok(())
}

/// Count of active categories for an instrument
pub(crate) async fn count_categorias(pool: &SqlitePool, instrumento_id: i64) -> ApiResult<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM categoria WHERE instrumento_id = ? AND is_active = 1",
    )
    .bind(instrumento_id)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_count_categorias", ""))
}
