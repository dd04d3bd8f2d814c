//! Admin endpoints: user management, catalogs, and aggregated results
//!
//! Aggregation only ever counts submitted evaluations. The weighted mean
//! is SUM(rank_value * peso) / SUM(peso) over the role weight snapshotted
//! on each evaluation, so later role edits never rewrite history.

use crate::api::session::{required_str, Session};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use multirank_common::db::models::Rol;
use multirank_common::hash::sha256_hex;
use serde::Serialize;
use serde_json::{json, Value};

const MIN_PASSWORD_LEN: usize = 4;

fn require_admin(session: &Session) -> ApiResult<()> {
    if !session.is_admin {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminUser {
    pub usuario_id: i64,
    pub nombre_usuario: String,
    pub nombre: String,
    pub apellido_paterno: String,
    pub apellido_materno: String,
    pub grado: String,
    pub rol_id: i64,
    pub rol_nombre: String,
    pub is_active: bool,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Vec<AdminUser>>> {
    require_admin(&session)?;

    let rows = sqlx::query_as::<_, AdminUser>(
        "SELECT u.usuario_id, u.nombre_usuario, u.nombre, u.apellido_paterno, \
                u.apellido_materno, u.grado, u.rol_id, r.nombre AS rol_nombre, u.is_active \
         FROM usuario u JOIN rol r ON r.rol_id = u.rol_id \
         ORDER BY u.usuario_id",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;

    Ok(Json(rows))
}

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<AppState>,
    session: Session,
    Json(data): Json<Value>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;

    let nombre_usuario = required_str(&data, "nombre_usuario");
    let nombre = required_str(&data, "nombre");
    let apellido_paterno = required_str(&data, "apellido_paterno");
    let rol_id = data.get("rol_id").and_then(|v| v.as_i64());
    let password = data.get("password").and_then(|v| v.as_str()).unwrap_or("");

    let (nombre_usuario, nombre, apellido_paterno, rol_id) =
        match (nombre_usuario, nombre, apellido_paterno, rol_id) {
            (Some(u), Some(n), Some(ap), Some(r)) => (u, n, ap, r),
            _ => return Err(ApiError::invalid("payload_invalid")),
        };

    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid("password_min_4"));
    }

    let rol_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM rol WHERE rol_id = ?)")
        .bind(rol_id)
        .fetch_one(&state.pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;
    if !rol_exists {
        return Err(ApiError::invalid_with("rol_invalido", "rol_id", json!(rol_id)));
    }

    let apellido_materno = required_str(&data, "apellido_materno").unwrap_or("");
    let grado = required_str(&data, "grado").unwrap_or("");

    let result = sqlx::query(
        "INSERT INTO usuario \
             (nombre_usuario, password_sha256, nombre, apellido_paterno, \
              apellido_materno, grado, rol_id, is_active) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(nombre_usuario)
    .bind(sha256_hex(password))
    .bind(nombre)
    .bind(apellido_paterno)
    .bind(apellido_materno)
    .bind(grado)
    .bind(rol_id)
    .execute(&state.pool)
    .await;

    let result = match result {
        Ok(r) => r,
        Err(e) if crate::error::is_unique_violation(&e) => {
            return Err(ApiError::invalid("usuario_duplicado"));
        }
        Err(e) => return Err(ApiError::from_sqlx(e, "db_error_users", "")),
    };

    Ok(Json(json!({"ok": true, "usuario_id": result.last_insert_rowid()})))
}

/// PUT /api/admin/users/{usuario_id}
///
/// Password is only rewritten when the payload carries a non-empty one.
pub async fn update_user(
    State(state): State<AppState>,
    session: Session,
    Path(usuario_id): Path<i64>,
    Json(data): Json<Value>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM usuario WHERE usuario_id = ?)")
            .bind(usuario_id)
            .fetch_one(&state.pool)
            .await
            .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;
    if !exists {
        return Err(ApiError::NotFound("usuario_not_found"));
    }

    let nombre = required_str(&data, "nombre");
    let apellido_paterno = required_str(&data, "apellido_paterno");
    let rol_id = data.get("rol_id").and_then(|v| v.as_i64());

    let (nombre, apellido_paterno, rol_id) = match (nombre, apellido_paterno, rol_id) {
        (Some(n), Some(ap), Some(r)) => (n, ap, r),
        _ => return Err(ApiError::invalid("payload_invalid")),
    };

    let apellido_materno = required_str(&data, "apellido_materno").unwrap_or("");
    let grado = required_str(&data, "grado").unwrap_or("");
    let is_active = data
        .get("is_active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    sqlx::query(
        "UPDATE usuario SET nombre = ?, apellido_paterno = ?, apellido_materno = ?, \
             grado = ?, rol_id = ?, is_active = ? \
         WHERE usuario_id = ?",
    )
    .bind(nombre)
    .bind(apellido_paterno)
    .bind(apellido_materno)
    .bind(grado)
    .bind(rol_id)
    .bind(is_active)
    .bind(usuario_id)
    .execute(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;

    if let Some(password) = data.get("password").and_then(|v| v.as_str()) {
        if !password.is_empty() {
            if password.len() < MIN_PASSWORD_LEN {
                return Err(ApiError::invalid("password_min_4"));
            }
            sqlx::query("UPDATE usuario SET password_sha256 = ? WHERE usuario_id = ?")
                .bind(sha256_hex(password))
                .bind(usuario_id)
                .execute(&state.pool)
                .await
                .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;
        }
    }

    Ok(Json(json!({"ok": true})))
}

/// DELETE /api/admin/users/{usuario_id}
///
/// Soft delete: the user keeps their evaluations but can no longer log in.
pub async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(usuario_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;

    if usuario_id == session.usuario_id {
        return Err(ApiError::invalid("no_self_delete"));
    }

    let result = sqlx::query("UPDATE usuario SET is_active = 0 WHERE usuario_id = ?")
        .bind(usuario_id)
        .execute(&state.pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("usuario_not_found"));
    }

    sqlx::query("DELETE FROM sesion WHERE usuario_id = ?")
        .bind(usuario_id)
        .execute(&state.pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_users", ""))?;

    Ok(Json(json!({"ok": true})))
}

/// GET /api/admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Vec<Rol>>> {
    require_admin(&session)?;

    let rows = sqlx::query_as::<_, Rol>("SELECT rol_id, nombre, peso FROM rol ORDER BY rol_id")
        .fetch_all(&state.pool)
        .await
        .map_err(|e| ApiError::from_sqlx(e, "db_error_roles", ""))?;

    Ok(Json(rows))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminInstrumento {
    pub instrumento_id: i64,
    pub nombre: String,
    pub is_active: bool,
    pub total_submitted: i64,
    pub total_draft: i64,
}

/// GET /api/admin/instruments
pub async fn list_instruments(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Vec<AdminInstrumento>>> {
    require_admin(&session)?;

    let rows = sqlx::query_as::<_, AdminInstrumento>(
        "SELECT i.instrumento_id, i.nombre, i.is_active, \
                (SELECT COUNT(*) FROM evaluacion e \
                 WHERE e.instrumento_id = i.instrumento_id \
                   AND e.status = 'submitted') AS total_submitted, \
                (SELECT COUNT(*) FROM evaluacion e \
                 WHERE e.instrumento_id = i.instrumento_id \
                   AND e.status = 'draft') AS total_draft \
         FROM instrumento i ORDER BY i.instrumento_id",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_instruments", ""))?;

    Ok(Json(rows))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Evaluador {
    pub usuario_id: i64,
    pub nombre: String,
    pub apellido_paterno: String,
    pub apellido_materno: String,
    pub rol_nombre: String,
    pub peso: i64,
    pub status: String,
    pub submitted_at: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CategoriaResultado {
    pub categoria_code: String,
    pub orden: i64,
    pub nombre: String,
    pub rank_ponderado: Option<f64>,
    pub rank_promedio: Option<f64>,
    pub total_respuestas: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ItemResultado {
    pub categoria_code: String,
    pub item_id: i64,
    pub codigo_visible: String,
    pub contenido: String,
    pub parent_item_id: Option<i64>,
    pub rank_group: Option<i64>,
    pub rank_ponderado: Option<f64>,
    pub rank_promedio: Option<f64>,
    pub total_respuestas: i64,
}

/// GET /api/admin/results/{instrumento_id}
///
/// Roster plus per-category and per-item aggregates. Rows with zero
/// submitted responses carry NULL aggregates and sort last.
pub async fn results(
    State(state): State<AppState>,
    session: Session,
    Path(instrumento_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let pool = &state.pool;

    let instrumento: Option<(String,)> =
        sqlx::query_as("SELECT nombre FROM instrumento WHERE instrumento_id = ?")
            .bind(instrumento_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| ApiError::from_sqlx(e, "db_error_results", ""))?;

    let instrumento_nombre = match instrumento {
        Some((nombre,)) => nombre,
        None => return Err(ApiError::NotFound("instrumento_not_found")),
    };

    let evaluadores = sqlx::query_as::<_, Evaluador>(
        "SELECT u.usuario_id, u.nombre, u.apellido_paterno, u.apellido_materno, \
                r.nombre AS rol_nombre, e.rol_peso_snapshot AS peso, e.status, e.submitted_at \
         FROM evaluacion e \
         JOIN usuario u ON u.usuario_id = e.usuario_id \
         JOIN rol r ON r.rol_id = e.rol_id_snapshot \
         WHERE e.instrumento_id = ? \
         ORDER BY u.apellido_paterno, u.nombre",
    )
    .bind(instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_results", ""))?;

    let categorias = sqlx::query_as::<_, CategoriaResultado>(
        "SELECT c.categoria_code, c.orden, c.nombre, \
                agg.rank_ponderado, agg.rank_promedio, \
                COALESCE(agg.total_respuestas, 0) AS total_respuestas \
         FROM categoria c \
         LEFT JOIN ( \
             SELECT ec.categoria_code, \
                    CAST(SUM(ec.rank_value * e.rol_peso_snapshot) AS REAL) \
                        / SUM(e.rol_peso_snapshot) AS rank_ponderado, \
                    AVG(ec.rank_value) AS rank_promedio, \
                    COUNT(*) AS total_respuestas \
             FROM evaluacion_categoria ec \
             JOIN evaluacion e ON e.evaluacion_id = ec.evaluacion_id \
             WHERE e.instrumento_id = ? AND e.status = 'submitted' \
             GROUP BY ec.categoria_code \
         ) agg ON agg.categoria_code = c.categoria_code \
         WHERE c.instrumento_id = ? AND c.is_active = 1 \
         ORDER BY (agg.rank_ponderado IS NULL), agg.rank_ponderado, c.orden",
    )
    .bind(instrumento_id)
    .bind(instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_results", ""))?;

    let items = sqlx::query_as::<_, ItemResultado>(
        "SELECT i.categoria_code, i.item_id, i.codigo_visible, i.contenido, \
                i.parent_item_id, i.parent_item_id AS rank_group, \
                agg.rank_ponderado, agg.rank_promedio, \
                COALESCE(agg.total_respuestas, 0) AS total_respuestas \
         FROM item i \
         JOIN categoria c ON c.instrumento_id = i.instrumento_id \
                         AND c.categoria_code = i.categoria_code AND c.is_active = 1 \
         LEFT JOIN ( \
             SELECT ei.item_id, \
                    CAST(SUM(ei.rank_value * e.rol_peso_snapshot) AS REAL) \
                        / SUM(e.rol_peso_snapshot) AS rank_ponderado, \
                    AVG(ei.rank_value) AS rank_promedio, \
                    COUNT(*) AS total_respuestas \
             FROM evaluacion_item ei \
             JOIN evaluacion e ON e.evaluacion_id = ei.evaluacion_id \
             WHERE e.instrumento_id = ? AND e.status = 'submitted' \
             GROUP BY ei.item_id \
         ) agg ON agg.item_id = i.item_id \
         WHERE i.instrumento_id = ? AND i.is_active = 1 \
         ORDER BY c.orden, i.orden",
    )
    .bind(instrumento_id)
    .bind(instrumento_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::from_sqlx(e, "db_error_results", ""))?;

    let total_submitted = evaluadores.iter().filter(|e| e.status == "submitted").count();

    Ok(Json(json!({
        "instrumento": {
            "instrumento_id": instrumento_id,
            "nombre": instrumento_nombre,
        },
        "total_submitted": total_submitted,
        "evaluadores": evaluadores,
        "categorias": categorias,
        "items": items,
    })))
}
