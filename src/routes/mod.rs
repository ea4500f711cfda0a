//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the canvas websocket at `/ws`, the admin import
//! endpoint at its configured path, a health probe, and the browser client
//! as static files from `STATIC_DIR` for everything else.

pub mod admin;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let admin_path = state.config.admin_import_path.clone();
    let static_files = ServeDir::new(&state.config.static_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route(&admin_path, post(admin::import_grid))
        .route("/healthz", get(healthz))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
