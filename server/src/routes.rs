use axum::{routing::get, Router};
use crate::app_state::SharedState;
use crate::{catalog, handlers};

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/videos", get(catalog::videos))
        .route("/scan", get(catalog::scan))
        .with_state(state)
}
