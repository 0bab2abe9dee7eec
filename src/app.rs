use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/dashboard", get(handlers::dashboard_page))
        .route("/progress", get(handlers::progress_fragment))
        .route("/api/progress", get(handlers::get_progress))
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route(
            "/api/servers",
            get(handlers::list_servers).post(handlers::upsert_server),
        )
        .route("/api/servers/:slot", delete(handlers::delete_server))
        .route("/api/import", post(handlers::import_history))
        .route("/api/runs", post(handlers::create_run))
        .route("/api/runs/latest", get(handlers::latest_run))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route("/api/posters", get(handlers::get_posters))
        .route("/api/quilt", get(handlers::get_quilt))
        .with_state(state)
}
