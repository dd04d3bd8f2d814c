//! Evaluation progress resolver
//!
//! Decides which wizard screen a user should resume at: category ranking
//! first, then item ranking one category at a time in catalog order, then
//! the summary. The "first incomplete category wins" scan drives the
//! sequential navigation and must keep its ascending-orden semantics.

use crate::api::session::Session;
use crate::api::count_categorias;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NextStep {
    pub view: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoria_orden: Option<i64>,
}

impl NextStep {
    fn categorias() -> Self {
        NextStep {
            view: "categorias",
            categoria_orden: None,
        }
    }

    fn items(orden: i64) -> Self {
        NextStep {
            view: "items",
            categoria_orden: Some(orden),
        }
    }

    fn resumen() -> Self {
        NextStep {
            view: "resumen",
            categoria_orden: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub evaluacion_id: i64,
    pub status: String,
    pub total_categorias: i64,
    pub next_step: NextStep,
}

/// POST /api/evaluacion/{instrumento_id}/init
///
/// Creates or recovers the caller's evaluation for the instrument and
/// resolves the next wizard step.
pub async fn init_evaluacion(
    State(state): State<AppState>,
    session: Session,
    Path(instrumento_id): Path<i64>,
) -> ApiResult<Json<InitResponse>> {
    let pool = &state.pool;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM instrumento WHERE instrumento_id = ? AND is_active = 1)",
    )
    .bind(instrumento_id)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

    if !exists {
        return Err(ApiError::NotFound("instrumento_not_found"));
    }

    let existing: Option<(i64, String)> = sqlx::query_as(
        "SELECT evaluacion_id, status FROM evaluacion \
         WHERE usuario_id = ? AND instrumento_id = ?",
    )
    .bind(session.usuario_id)
    .bind(instrumento_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

    let total_categorias = count_categorias(pool, instrumento_id).await?;

    let (evaluacion_id, status) = match existing {
        Some(ev) => ev,
        None => create_evaluacion(pool, session.usuario_id, instrumento_id).await?,
    };

    let next_step = resolve_next_step(pool, evaluacion_id, instrumento_id, total_categorias).await?;

    Ok(Json(InitResponse {
        evaluacion_id,
        status,
        total_categorias,
        next_step,
    }))
}

/// Lazily create a draft evaluation, snapshotting the user's current role
/// id and weight.
async fn create_evaluacion(
    pool: &SqlitePool,
    usuario_id: i64,
    instrumento_id: i64,
) -> ApiResult<(i64, String)> {
    let snapshot: Option<(i64, i64)> = sqlx::query_as(
        "SELECT u.rol_id, r.peso FROM usuario u \
         JOIN rol r ON r.rol_id = u.rol_id \
         WHERE u.usuario_id = ?",
    )
    .bind(usuario_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

    let (rol_id, peso) = snapshot.ok_or_else(|| ApiError::invalid("usuario_rol_not_found"))?;

    let result = sqlx::query(
        "INSERT INTO evaluacion \
             (instrumento_id, usuario_id, rol_id_snapshot, rol_peso_snapshot, status) \
         VALUES (?, ?, ?, ?, 'draft')",
    )
    .bind(instrumento_id)
    .bind(usuario_id)
    .bind(rol_id)
    .bind(peso)
    .execute(pool)
    .await;

    match result {
        Ok(r) => Ok((r.last_insert_rowid(), "draft".to_string())),
        // A concurrent init for the same (usuario, instrumento) won the
        // insert; recover its row instead of surfacing the constraint
        Err(e) if crate::error::is_unique_violation(&e) => sqlx::query_as(
            "SELECT evaluacion_id, status FROM evaluacion \
             WHERE usuario_id = ? AND instrumento_id = ?",
        )
        .bind(usuario_id)
        .bind(instrumento_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?
        .ok_or(ApiError::Db("db_error_init")),
        Err(e) => Err(ApiError::from_sqlx(e, "db_error_init", "")),
    }
}

/// Resolve the next wizard step for an evaluation.
///
/// 1. Fewer saved category ranks than active categories -> categorias
/// 2. First active category (ascending orden) with fewer saved item ranks
///    than active items -> items at that orden
/// 3. Otherwise -> resumen
pub(crate) async fn resolve_next_step(
    pool: &SqlitePool,
    evaluacion_id: i64,
    instrumento_id: i64,
    total_categorias: i64,
) -> ApiResult<NextStep> {
    let cat_rank_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM evaluacion_categoria WHERE evaluacion_id = ?")
            .bind(evaluacion_id)
            .fetch_one(pool)
            .await
            .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

    if cat_rank_count < total_categorias {
        return Ok(NextStep::categorias());
    }

    let cats: Vec<(String, i64)> = sqlx::query_as(
        "SELECT categoria_code, orden FROM categoria \
         WHERE instrumento_id = ? AND is_active = 1 ORDER BY orden",
    )
    .bind(instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

    for (code, orden) in cats {
        let total_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM item \
             WHERE instrumento_id = ? AND categoria_code = ? AND is_active = 1",
        )
        .bind(instrumento_id)
        .bind(&code)
        .fetch_one(pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

        let saved_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM evaluacion_item \
             WHERE evaluacion_id = ? AND categoria_code = ?",
        )
        .bind(evaluacion_id)
        .bind(&code)
        .fetch_one(pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_init", ""))?;

        if saved_items < total_items {
            return Ok(NextStep::items(orden));
        }
    }

    Ok(NextStep::resumen())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multirank_common::db::init_database;

    #[tokio::test]
    async fn losing_a_create_race_recovers_the_existing_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("multirank.db"))
            .await
            .unwrap();

        sqlx::query("INSERT INTO instrumento (instrumento_id, nombre) VALUES (1, 'T')")
            .execute(&pool)
            .await
            .unwrap();
        let usuario_id: i64 =
            sqlx::query_scalar("SELECT usuario_id FROM usuario WHERE nombre_usuario = 'admin'")
                .fetch_one(&pool)
                .await
                .unwrap();

        let (first, status) = create_evaluacion(&pool, usuario_id, 1).await.unwrap();
        assert_eq!(status, "draft");

        // Second insert for the same (usuario, instrumento) hits the UNIQUE
        // constraint; the caller must get the first row back, not an error
        let (second, status) = create_evaluacion(&pool, usuario_id, 1).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(status, "draft");
    }
}
