//! multirank-api - HTTP JSON API for the multirank ranking service
//!
//! Exposes the evaluation wizard flow (init / category ranks / item ranks /
//! resumen / submit), admin reopen, and the admin CRUD + weighted-results
//! endpoints. Router construction lives here so integration tests can drive
//! it with `tower::util::ServiceExt::oneshot`.

pub mod api;
pub mod error;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use multirank_common::config::ServiceConfig;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    /// Role name (case-insensitive) that grants admin access
    pub admin_role_name: String,
    /// Session lifetime in seconds
    pub session_ttl_seconds: i64,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServiceConfig) -> Self {
        Self {
            pool,
            admin_role_name: config.admin_role_name,
            session_ttl_seconds: config.session_ttl_seconds,
        }
    }
}

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        // Session
        .route("/api/login", post(api::session::login))
        .route("/api/logout", post(api::session::logout))
        // Catalog
        .route("/api/catalogo/:id/categorias", get(api::catalog::categorias))
        .route(
            "/api/catalogo/:id/items/:categoria_code",
            get(api::catalog::items),
        )
        // Evaluation wizard
        .route("/api/evaluacion/:id/init", post(api::progress::init_evaluacion))
        .route(
            "/api/evaluacion/:id/categorias",
            post(api::rankings::guardar_categorias),
        )
        .route(
            "/api/evaluacion/:id/items/:categoria_code",
            post(api::rankings::guardar_items),
        )
        .route("/api/evaluacion/:id/resumen", get(api::summary::resumen))
        .route("/api/evaluacion/:id/submit", post(api::summary::submit))
        // Admin
        .route(
            "/api/admin/evaluacion/:id/reopen",
            post(api::summary::reopen),
        )
        .route("/api/admin/users", get(api::admin::list_users))
        .route("/api/admin/users", post(api::admin::create_user))
        .route("/api/admin/users/:id", put(api::admin::update_user))
        .route("/api/admin/users/:id", delete(api::admin::delete_user))
        .route("/api/admin/roles", get(api::admin::list_roles))
        .route("/api/admin/instruments", get(api::admin::list_instruments))
        .route("/api/admin/results/:id", get(api::admin::results))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
