//! Default row seeding
//!
//! Ensures the roles and the bootstrap admin account exist. Uses
//! INSERT OR IGNORE so concurrent startups and repeat runs are harmless.

use crate::hash::sha256_hex;
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Seed default roles and the bootstrap admin user
pub async fn seed_defaults(pool: &SqlitePool) -> Result<()> {
    let roles = [("ADMIN", 1), ("DIRECTIVO", 3), ("DOCENTE", 2), ("EVALUADOR", 1)];

    for (nombre, peso) in roles {
        sqlx::query("INSERT OR IGNORE INTO rol (nombre, peso) VALUES (?, ?)")
            .bind(nombre)
            .bind(peso)
            .execute(pool)
            .await?;
    }

    // Bootstrap admin; password must be changed after first login
    let admin_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM usuario WHERE nombre_usuario = 'admin')")
            .fetch_one(pool)
            .await?;

    if !admin_exists {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO usuario
                (nombre_usuario, password_sha256, nombre, apellido_paterno, rol_id, is_active)
            SELECT 'admin', ?, 'Administrador', '', rol_id, 1 FROM rol WHERE nombre = 'ADMIN'
            "#,
        )
        .bind(sha256_hex("admin"))
        .execute(pool)
        .await?;

        info!("Seeded bootstrap admin user");
    }

    Ok(())
}
