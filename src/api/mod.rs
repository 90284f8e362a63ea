mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::db::Database;

/// Router with permissive CORS, as used for local development and tests.
pub fn create_router(db: Database) -> Router {
    build_router(db, CorsLayer::permissive())
}

/// Router with CORS restricted to the configured origins.
pub fn create_router_with_config(db: Database, config: &ServerConfig) -> Router {
    build_router(db, config.cors_layer())
}

fn build_router(db: Database, cors: CorsLayer) -> Router {
    let api = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::get_project)
                .put(handlers::update_project)
                .delete(handlers::delete_project),
        )
        // Step records
        .route(
            "/projects/{id}/steps",
            get(handlers::list_project_steps).post(handlers::bulk_save_project_steps),
        )
        .route(
            "/projects/{id}/steps/{step}",
            get(handlers::get_project_step)
                .put(handlers::save_project_step)
                .delete(handlers::delete_project_step),
        )
        // Step definitions and stateless calculation
        .route("/steps", get(handlers::list_step_definitions))
        .route("/steps/{step}", get(handlers::get_step_form))
        .route("/steps/{step}/recompute", post(handlers::recompute_step))
        .route("/numbers/parse", post(handlers::parse_number))
        .route("/numbers/format", post(handlers::format_number))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(db)
}
