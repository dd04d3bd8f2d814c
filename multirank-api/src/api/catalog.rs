//! Catalog reads: categories and items of an instrument

use crate::api::session::Session;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use multirank_common::db::models::{Categoria, Item};

/// GET /api/catalogo/{instrumento_id}/categorias
pub async fn categorias(
    State(state): State<AppState>,
    _session: Session,
    Path(instrumento_id): Path<i64>,
) -> ApiResult<Json<Vec<Categoria>>> {
    let rows = sqlx::query_as::<_, Categoria>(
        "SELECT categoria_code, orden, nombre, objetivo \
         FROM categoria WHERE instrumento_id = ? AND is_active = 1 \
         ORDER BY orden",
    )
    .bind(instrumento_id)
    .fetch_all(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_catalogo", ""))?;

    Ok(Json(rows))
}

/// GET /api/catalogo/{instrumento_id}/items/{categoria_code}
pub async fn items(
    State(state): State<AppState>,
    _session: Session,
    Path((instrumento_id, categoria_code)): Path<(i64, String)>,
) -> ApiResult<Json<Vec<Item>>> {
    let rows = sqlx::query_as::<_, Item>(
        "SELECT item_id, orden, codigo_visible, contenido, parent_item_id \
         FROM item \
         WHERE instrumento_id = ? AND categoria_code = ? AND is_active = 1 \
         ORDER BY orden",
    )
    .bind(instrumento_id)
    .bind(categoria_code.trim())
    .fetch_all(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_catalogo", ""))?;

    Ok(Json(rows))
}
