//! Integration tests for database initialization and seeding

use multirank_common::db::init_database;
use multirank_common::hash::sha256_hex;
use std::path::PathBuf;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let test_db = format!("/tmp/multirank-test-db-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_database_opens_existing() {
    let test_db = format!("/tmp/multirank-test-db-existing-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    // Create database first time
    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    // Open database second time (idempotent schema creation)
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    drop(pool1);
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_parent_directory_created() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("data").join("multirank.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Init failed: {:?}", pool.err());
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_default_roles_seeded() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("multirank.db");

    let pool = init_database(&db_path).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rol")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(count >= 4, "Expected 4+ default roles, got {}", count);

    let peso: Option<i64> = sqlx::query_scalar("SELECT peso FROM rol WHERE nombre = 'DIRECTIVO'")
        .fetch_optional(&pool)
        .await
        .unwrap();
    assert_eq!(peso, Some(3), "DIRECTIVO role has wrong default weight");
}

#[tokio::test]
async fn test_bootstrap_admin_seeded() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("multirank.db");

    let pool = init_database(&db_path).await.unwrap();

    let row: Option<(String, bool)> = sqlx::query_as(
        "SELECT u.password_sha256, u.is_active FROM usuario u \
         JOIN rol r ON r.rol_id = u.rol_id \
         WHERE u.nombre_usuario = 'admin' AND r.nombre = 'ADMIN'",
    )
    .fetch_optional(&pool)
    .await
    .unwrap();

    let (password_sha256, is_active) = row.expect("bootstrap admin not seeded");
    assert!(is_active);
    assert_eq!(password_sha256, sha256_hex("admin"));

    // Re-running init must not duplicate the seed rows
    drop(pool);
    let pool = init_database(&db_path).await.unwrap();
    let admins: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM usuario WHERE nombre_usuario = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(admins, 1);
}

#[tokio::test]
async fn test_rank_uniqueness_enforced_by_storage() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("multirank.db");

    let pool = init_database(&db_path).await.unwrap();

    sqlx::query("INSERT INTO instrumento (nombre) VALUES ('Test')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO evaluacion \
             (instrumento_id, usuario_id, rol_id_snapshot, rol_peso_snapshot, status) \
         SELECT 1, usuario_id, rol_id, 1, 'draft' FROM usuario WHERE nombre_usuario = 'admin'",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Same rank value twice within one evaluation's categories must fail
    sqlx::query(
        "INSERT INTO evaluacion_categoria \
             (evaluacion_id, instrumento_id, categoria_code, rank_value) \
         VALUES (1, 1, 'C1', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let dup = sqlx::query(
        "INSERT INTO evaluacion_categoria \
             (evaluacion_id, instrumento_id, categoria_code, rank_value) \
         VALUES (1, 1, 'C2', 1)",
    )
    .execute(&pool)
    .await;
    assert!(dup.is_err(), "duplicate category rank_value was accepted");
}

#[tokio::test]
async fn test_item_rank_uniqueness_treats_null_group_as_one_group() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("multirank.db");

    let pool = init_database(&db_path).await.unwrap();

    sqlx::query("INSERT INTO instrumento (nombre) VALUES ('Test')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO evaluacion \
             (instrumento_id, usuario_id, rol_id_snapshot, rol_peso_snapshot, status) \
         SELECT 1, usuario_id, rol_id, 1, 'draft' FROM usuario WHERE nombre_usuario = 'admin'",
    )
    .execute(&pool)
    .await
    .unwrap();
    for orden in 1..=2 {
        sqlx::query(
            "INSERT INTO item (instrumento_id, categoria_code, orden, codigo_visible, contenido) \
             VALUES (1, 'C1', ?, ?, 'x')",
        )
        .bind(orden)
        .bind(format!("1.{}", orden))
        .execute(&pool)
        .await
        .unwrap();
    }

    // Two root items (rank_group NULL) with the same rank value: the
    // COALESCE index must reject the second despite NULL != NULL semantics.
    sqlx::query(
        "INSERT INTO evaluacion_item (evaluacion_id, item_id, categoria_code, rank_group, rank_value) \
         VALUES (1, 1, 'C1', NULL, 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let dup = sqlx::query(
        "INSERT INTO evaluacion_item (evaluacion_id, item_id, categoria_code, rank_group, rank_value) \
         VALUES (1, 2, 'C1', NULL, 1)",
    )
    .execute(&pool)
    .await;
    assert!(dup.is_err(), "duplicate root-group rank_value was accepted");
}
