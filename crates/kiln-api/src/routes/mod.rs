//! API routes.

pub mod builds;
pub mod health;

use axum::Router;
use axum::routing::get;

use crate::AppState;
use crate::ws::ws_handler;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/builds", builds::router())
        .route("/ws", get(ws_handler))
        .merge(health::router())
        .with_state(state)
}
