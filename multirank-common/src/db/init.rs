//! Database initialization
//!
//! Creates the ranking schema idempotently on startup. Uniqueness of rank
//! values is enforced at the storage layer so two saves racing on the same
//! scope resolve to one winner and one duplicate-key error.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    // Schema creation is idempotent - safe to call on every startup
    create_instrumento_table(&pool).await?;
    create_categoria_table(&pool).await?;
    create_item_table(&pool).await?;
    create_rol_table(&pool).await?;
    create_usuario_table(&pool).await?;
    create_evaluacion_table(&pool).await?;
    create_evaluacion_categoria_table(&pool).await?;
    create_evaluacion_item_table(&pool).await?;
    create_sesion_table(&pool).await?;

    crate::db::seed::seed_defaults(&pool).await?;

    Ok(pool)
}

async fn create_instrumento_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instrumento (
            instrumento_id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the categoria table
///
/// Categories belong to an instrument; `categoria_code` is the stable key
/// used by the ranking tables, unique per instrument. `orden` drives the
/// sequential wizard navigation.
pub async fn create_categoria_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categoria (
            categoria_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrumento_id INTEGER NOT NULL REFERENCES instrumento(instrumento_id) ON DELETE CASCADE,
            categoria_code TEXT NOT NULL,
            orden INTEGER NOT NULL,
            nombre TEXT NOT NULL,
            objetivo TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            UNIQUE (instrumento_id, categoria_code),
            CHECK (orden > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_categoria_instrumento ON categoria(instrumento_id, orden)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the item table
///
/// `parent_item_id` is NULL for root items; child items reference their
/// parent, which defines the rank-group they compete in. Item ids are
/// CHECKed positive so a real id can never shadow the root marker.
pub async fn create_item_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item (
            item_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrumento_id INTEGER NOT NULL REFERENCES instrumento(instrumento_id) ON DELETE CASCADE,
            categoria_code TEXT NOT NULL,
            orden INTEGER NOT NULL,
            codigo_visible TEXT NOT NULL,
            contenido TEXT NOT NULL,
            parent_item_id INTEGER REFERENCES item(item_id),
            is_active INTEGER NOT NULL DEFAULT 1,
            CHECK (item_id > 0),
            CHECK (orden > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_item_categoria ON item(instrumento_id, categoria_code, orden)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_rol_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rol (
            rol_id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL UNIQUE,
            peso INTEGER NOT NULL,
            CHECK (peso > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_usuario_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usuario (
            usuario_id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre_usuario TEXT NOT NULL UNIQUE,
            password_sha256 TEXT NOT NULL,
            nombre TEXT NOT NULL,
            apellido_paterno TEXT NOT NULL DEFAULT '',
            apellido_materno TEXT NOT NULL DEFAULT '',
            grado TEXT NOT NULL DEFAULT '',
            rol_id INTEGER NOT NULL REFERENCES rol(rol_id),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the evaluacion table
///
/// One evaluation per (usuario, instrumento). The role id and weight are
/// snapshotted at creation so later role changes do not retroactively alter
/// past aggregates.
pub async fn create_evaluacion_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluacion (
            evaluacion_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrumento_id INTEGER NOT NULL REFERENCES instrumento(instrumento_id),
            usuario_id INTEGER NOT NULL REFERENCES usuario(usuario_id),
            rol_id_snapshot INTEGER NOT NULL,
            rol_peso_snapshot INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'submitted')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            submitted_at TIMESTAMP,
            reopened_at TIMESTAMP,
            reopened_by INTEGER REFERENCES usuario(usuario_id),
            UNIQUE (usuario_id, instrumento_id),
            CHECK (rol_peso_snapshot > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the evaluacion_categoria table
///
/// One row per (evaluacion, categoria). Rank values are unique within the
/// evaluation's full category set.
pub async fn create_evaluacion_categoria_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluacion_categoria (
            evaluacion_id INTEGER NOT NULL REFERENCES evaluacion(evaluacion_id) ON DELETE CASCADE,
            instrumento_id INTEGER NOT NULL,
            categoria_code TEXT NOT NULL,
            rank_value INTEGER NOT NULL,
            PRIMARY KEY (evaluacion_id, categoria_code),
            UNIQUE (evaluacion_id, rank_value),
            CHECK (rank_value > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the evaluacion_item table
///
/// `rank_group` is NULL for root items and the parent item id for children.
/// SQLite treats NULLs as distinct in UNIQUE constraints, so uniqueness of
/// rank values per group goes through a COALESCE expression index instead.
pub async fn create_evaluacion_item_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluacion_item (
            evaluacion_id INTEGER NOT NULL REFERENCES evaluacion(evaluacion_id) ON DELETE CASCADE,
            item_id INTEGER NOT NULL REFERENCES item(item_id),
            categoria_code TEXT NOT NULL,
            rank_group INTEGER,
            rank_value INTEGER NOT NULL,
            PRIMARY KEY (evaluacion_id, item_id),
            CHECK (rank_value > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_evaluacion_item_rank \
         ON evaluacion_item(evaluacion_id, categoria_code, COALESCE(rank_group, 0), rank_value)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_evaluacion_item_categoria \
         ON evaluacion_item(evaluacion_id, categoria_code)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sesion_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sesion (
            token TEXT PRIMARY KEY,
            usuario_id INTEGER NOT NULL REFERENCES usuario(usuario_id) ON DELETE CASCADE,
            rol_id INTEGER NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sesion_expires ON sesion(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
