use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use calendar_sync_cell::router::calendar_sync_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic calendar sync API is running!" }))
        .nest("/sync", calendar_sync_routes(state.clone()))
}
