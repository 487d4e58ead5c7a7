// libs/calendar-sync-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::post,
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn calendar_sync_routes(state: Arc<AppConfig>) -> Router {
    // All sync operations require authentication
    let protected_routes = Router::new()
        // Lifecycle hooks fired by the appointment flows
        .route("/hooks/booked", post(handlers::appointment_booked))
        .route("/hooks/completed", post(handlers::appointment_completed))
        .route("/hooks/cancelled", post(handlers::appointment_cancelled))
        .route("/hooks/rescheduled", post(handlers::appointment_rescheduled))

        // Operator actions: "Sync Now" and "Clean up"
        .route("/doctors/{doctor_id}/sync", post(handlers::sync_doctor))
        .route("/doctors/{doctor_id}/cleanup", post(handlers::cleanup_doctor))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
