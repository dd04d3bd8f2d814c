//! Evaluation summary and status transitions (submit / reopen)
//!
//! The only lifecycle transitions are draft -> submitted (submit) and
//! submitted -> draft (admin reopen). Both are no-ops when the evaluation
//! is already in the target state.

use crate::api::session::Session;
use crate::api::{count_categorias, ensure_owner_or_admin, get_evaluacion};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use multirank_common::db::models::EvalStatus;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ResumenCategoria {
    pub categoria_code: String,
    pub orden: i64,
    pub nombre: String,
    pub objetivo: Option<String>,
    pub rank_value: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ResumenItem {
    pub categoria_code: String,
    pub categoria_orden: i64,
    pub categoria_nombre: String,
    pub item_id: i64,
    pub item_orden: i64,
    pub codigo_visible: String,
    pub contenido: String,
    pub parent_item_id: Option<i64>,
    pub rank_value: Option<i64>,
    pub rank_group: Option<i64>,
}

/// GET /api/evaluacion/{evaluacion_id}/resumen
pub async fn resumen(
    State(state): State<AppState>,
    session: Session,
    Path(evaluacion_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let pool = &state.pool;

    let ev = get_evaluacion(pool, evaluacion_id).await?;
    ensure_owner_or_admin(&ev, &session)?;

    let instrumento_nombre: Option<String> =
        sqlx::query_scalar("SELECT nombre FROM instrumento WHERE instrumento_id = ?")
            .bind(ev.instrumento_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| ApiError::from_sqlx(e, "db_error_resumen", ""))?;

    let categorias = sqlx::query_as::<_, ResumenCategoria>(
        "SELECT c.categoria_code, c.orden, c.nombre, c.objetivo, ec.rank_value \
         FROM categoria c \
         LEFT JOIN evaluacion_categoria ec \
           ON ec.evaluacion_id = ? AND ec.categoria_code = c.categoria_code \
         WHERE c.instrumento_id = ? AND c.is_active = 1 \
         ORDER BY c.orden",
    )
    .bind(evaluacion_id)
    .bind(ev.instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_resumen", ""))?;

    let items = sqlx::query_as::<_, ResumenItem>(
        "SELECT c.categoria_code, c.orden AS categoria_orden, c.nombre AS categoria_nombre, \
                i.item_id, i.orden AS item_orden, i.codigo_visible, i.contenido, \
                i.parent_item_id, ei.rank_value, ei.rank_group \
         FROM categoria c \
         JOIN item i ON i.instrumento_id = c.instrumento_id \
                    AND i.categoria_code = c.categoria_code AND i.is_active = 1 \
         LEFT JOIN evaluacion_item ei \
           ON ei.evaluacion_id = ? AND ei.item_id = i.item_id \
         WHERE c.instrumento_id = ? AND c.is_active = 1 \
         ORDER BY c.orden, i.orden",
    )
    .bind(evaluacion_id)
    .bind(ev.instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_resumen", ""))?;

    Ok(Json(json!({
        "evaluacion": {
            "evaluacion_id": ev.evaluacion_id,
            "instrumento_id": ev.instrumento_id,
            "instrumento_nombre": instrumento_nombre,
            "usuario_id": ev.usuario_id,
            "status": ev.status,
            "submitted_at": ev.submitted_at,
        },
        "categorias": categorias,
        "items": items,
    })))
}

/// POST /api/evaluacion/{evaluacion_id}/submit
///
/// Revalidates completeness before the transition: every active category
/// and every active item under every active category must have a ranking.
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    Path(evaluacion_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let pool = &state.pool;

    let ev = get_evaluacion(pool, evaluacion_id).await?;
    ensure_owner_or_admin(&ev, &session)?;

    if ev.status() == EvalStatus::Submitted {
        return Ok(Json(json!({"ok": true, "status": "submitted"})));
    }

    let total_cats = count_categorias(pool, ev.instrumento_id).await?;
    let cat_rank_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM evaluacion_categoria WHERE evaluacion_id = ?")
            .bind(evaluacion_id)
            .fetch_one(pool)
            .await
            .map_err(|e| ApiError::from_sqlx(e, "db_error_submit", ""))?;

    if cat_rank_count < total_cats {
        return Err(ApiError::invalid("faltan_ranks_categorias"));
    }

    // First incomplete category (ascending orden) names the failure
    let cats: Vec<String> = sqlx::query_scalar(
        "SELECT categoria_code FROM categoria \
         WHERE instrumento_id = ? AND is_active = 1 ORDER BY orden",
    )
    .bind(ev.instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_submit", ""))?;

    for code in cats {
        let total_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM item \
             WHERE instrumento_id = ? AND categoria_code = ? AND is_active = 1",
        )
        .bind(ev.instrumento_id)
        .bind(&code)
        .fetch_one(pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_submit", ""))?;

        let saved_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM evaluacion_item \
             WHERE evaluacion_id = ? AND categoria_code = ?",
        )
        .bind(evaluacion_id)
        .bind(&code)
        .fetch_one(pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_submit", ""))?;

        if saved_items < total_items {
            return Err(ApiError::invalid_with(
                "faltan_ranks_items",
                "categoria_code",
                json!(code),
            ));
        }
    }

    sqlx::query(
        "UPDATE evaluacion SET status = 'submitted', submitted_at = datetime('now') \
         WHERE evaluacion_id = ?",
    )
    .bind(evaluacion_id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_submit", ""))?;

    Ok(Json(json!({"ok": true, "status": "submitted"})))
}

/// POST /api/admin/evaluacion/{evaluacion_id}/reopen (admin only)
///
/// No-op when the evaluation is not submitted. Otherwise returns it to
/// draft, clears the submission timestamp and records who reopened it.
pub async fn reopen(
    State(state): State<AppState>,
    session: Session,
    Path(evaluacion_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !session.is_admin {
        return Err(ApiError::Forbidden);
    }

    let pool = &state.pool;
    let ev = get_evaluacion(pool, evaluacion_id).await?;

    if ev.status() != EvalStatus::Submitted {
        return Ok(Json(json!({"ok": true, "status": ev.status})));
    }

    sqlx::query(
        "UPDATE evaluacion \
         SET status = 'draft', submitted_at = NULL, \
             reopened_at = datetime('now'), reopened_by = ? \
         WHERE evaluacion_id = ?",
    )
    .bind(session.usuario_id)
    .bind(evaluacion_id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_reopen", ""))?;

    Ok(Json(json!({"ok": true, "status": "draft"})))
}
