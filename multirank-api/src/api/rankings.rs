//! Idempotent ranking writer
//!
//! Both saves replace their whole scope (delete-then-insert) inside one
//! transaction, so re-submitting an identical payload yields identical
//! stored rows and never a duplicate-key error. Storage-level UNIQUE
//! constraints remain the last line of defense against concurrent saves
//! racing on the same scope.

use crate::api::session::Session;
use crate::api::{ensure_editable, ensure_owner_or_admin, get_evaluacion};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Parse the `ranks` array out of a request body, rejecting anything that
/// is not a non-empty JSON list.
fn ranks_array(data: &Value) -> ApiResult<&Vec<Value>> {
    match data.get("ranks").and_then(|v| v.as_array()) {
        Some(ranks) if !ranks.is_empty() => Ok(ranks),
        _ => Err(ApiError::invalid("payload_invalid")),
    }
}

/// POST /api/evaluacion/{evaluacion_id}/categorias
///
/// Body: `{"ranks": [{"categoria_code": "...", "rank_value": n}, ...]}`
pub async fn guardar_categorias(
    State(state): State<AppState>,
    session: Session,
    Path(evaluacion_id): Path<i64>,
    Json(data): Json<Value>,
) -> ApiResult<Json<Value>> {
    let pool = &state.pool;

    let ev = get_evaluacion(pool, evaluacion_id).await?;
    ensure_owner_or_admin(&ev, &session)?;
    ensure_editable(&ev, &session)?;

    let ranks = ranks_array(&data)?;

    let valid_codes: HashSet<String> = sqlx::query_scalar::<_, String>(
        "SELECT categoria_code FROM categoria WHERE instrumento_id = ? AND is_active = 1",
    )
    .bind(ev.instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_guardar_categorias", ""))?
    .into_iter()
    .collect();

    // Normalize and validate before touching the database
    let mut rows: Vec<(String, i64)> = Vec::with_capacity(ranks.len());
    for entry in ranks {
        let code = entry
            .get("categoria_code")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let value = entry.get("rank_value").and_then(|v| v.as_i64());

        let (code, value) = match (code, value) {
            ("", _) | (_, None) => return Err(ApiError::invalid("payload_invalid_rank")),
            (c, Some(v)) => (c, v),
        };

        if !valid_codes.contains(code) {
            return Err(ApiError::invalid_with(
                "categoria_invalida",
                "categoria_code",
                json!(code),
            ));
        }
        if value < 1 {
            return Err(ApiError::invalid_with(
                "rank_value_min_1",
                "categoria_code",
                json!(code),
            ));
        }
        rows.push((code.to_string(), value));
    }

    // Idempotent: replace the evaluation's whole category scope
    let save = async {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM evaluacion_categoria WHERE evaluacion_id = ?")
            .bind(evaluacion_id)
            .execute(&mut *tx)
            .await?;

        for (code, value) in &rows {
            sqlx::query(
                "INSERT INTO evaluacion_categoria \
                     (evaluacion_id, instrumento_id, categoria_code, rank_value) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(evaluacion_id)
            .bind(ev.instrumento_id)
            .bind(code)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    };

    save.await.map_err(|e: sqlx::Error| {
        ApiError::from_sqlx(
            e,
            "db_error_guardar_categorias",
            "Los valores deben ser únicos del 1 al N (sin repetición).",
        )
    })?;

    Ok(Json(json!({"ok": true})))
}

/// POST /api/evaluacion/{evaluacion_id}/items/{categoria_code}
///
/// Body: `{"ranks": [{"item_id": n, "rank_value": n, "rank_group": n?}, ...]}`
///
/// The rank-group is derived from the item's parent (None for roots); a
/// client-supplied `rank_group` is accepted in the payload but never
/// trusted for persistence.
pub async fn guardar_items(
    State(state): State<AppState>,
    session: Session,
    Path((evaluacion_id, categoria_code)): Path<(i64, String)>,
    Json(data): Json<Value>,
) -> ApiResult<Json<Value>> {
    let pool = &state.pool;
    let categoria_code = categoria_code.trim().to_string();

    let ev = get_evaluacion(pool, evaluacion_id).await?;
    ensure_owner_or_admin(&ev, &session)?;
    ensure_editable(&ev, &session)?;

    let ranks = ranks_array(&data)?;

    let cat_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM categoria \
         WHERE instrumento_id = ? AND categoria_code = ? AND is_active = 1)",
    )
    .bind(ev.instrumento_id)
    .bind(&categoria_code)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_guardar_items", ""))?;

    if !cat_exists {
        return Err(ApiError::NotFound("categoria_not_found"));
    }

    let valid_items: HashMap<i64, Option<i64>> = sqlx::query_as::<_, (i64, Option<i64>)>(
        "SELECT item_id, parent_item_id FROM item \
         WHERE instrumento_id = ? AND categoria_code = ? AND is_active = 1",
    )
    .bind(ev.instrumento_id)
    .bind(&categoria_code)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_guardar_items", ""))?
    .into_iter()
    .collect();

    if valid_items.is_empty() {
        return Err(ApiError::invalid("categoria_sin_items"));
    }

    let mut rows: Vec<(i64, Option<i64>, i64)> = Vec::with_capacity(ranks.len());
    for entry in ranks {
        let item_id = entry.get("item_id").and_then(|v| v.as_i64());
        let value = entry.get("rank_value").and_then(|v| v.as_i64());

        let (item_id, value) = match (item_id, value) {
            (Some(i), Some(v)) => (i, v),
            _ => return Err(ApiError::invalid("payload_invalid_rank")),
        };

        let parent = match valid_items.get(&item_id) {
            Some(parent) => *parent,
            None => {
                return Err(ApiError::invalid_with(
                    "item_invalido",
                    "item_id",
                    json!(item_id),
                ))
            }
        };
        if value < 1 {
            return Err(ApiError::invalid_with(
                "rank_value_min_1",
                "item_id",
                json!(item_id),
            ));
        }

        // Authoritative rank-group: the item's parent id, None for roots
        rows.push((item_id, parent, value));
    }

    // Uniqueness per rank-group, reported before the storage layer gets a say
    let mut seen: HashSet<(Option<i64>, i64)> = HashSet::new();
    for (_, group, value) in &rows {
        if !seen.insert((*group, *value)) {
            let group_label = match group {
                Some(parent) => parent.to_string(),
                None => "raíz".to_string(),
            };
            return Err(ApiError::RankDuplicate {
                detalle: format!("Valor {} repetido en grupo de ranking {}.", value, group_label),
            });
        }
    }

    // Idempotent per category: other categories' rows are untouched
    let save = async {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM evaluacion_item WHERE evaluacion_id = ? AND categoria_code = ?",
        )
        .bind(evaluacion_id)
        .bind(&categoria_code)
        .execute(&mut *tx)
        .await?;

        for (item_id, group, value) in &rows {
            sqlx::query(
                "INSERT INTO evaluacion_item \
                     (evaluacion_id, item_id, categoria_code, rank_group, rank_value) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(evaluacion_id)
            .bind(item_id)
            .bind(&categoria_code)
            .bind(group)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    };

    save.await.map_err(|e: sqlx::Error| {
        ApiError::from_sqlx(
            e,
            "db_error_guardar_items",
            "Los valores deben ser únicos (sin repetición) dentro de cada grupo de ranking.",
        )
    })?;

    Ok(Json(json!({"ok": true})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_array_rejects_missing_and_empty() {
        assert!(ranks_array(&json!({})).is_err());
        assert!(ranks_array(&json!({"ranks": []})).is_err());
        assert!(ranks_array(&json!({"ranks": "nope"})).is_err());
    }

    #[test]
    fn ranks_array_accepts_non_empty_list() {
        let data = json!({"ranks": [{"categoria_code": "C1", "rank_value": 1}]});
        assert_eq!(ranks_array(&data).unwrap().len(), 1);
    }
}
