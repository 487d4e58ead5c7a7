// libs/calendar-sync-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{HookRequest, OldSlot, RescheduledHookRequest};
use crate::services::bulk::BulkSyncService;
use crate::services::reconciliation::ReconciliationEngine;

/// Sync endpoints are backend-to-backend and operator-facing; only
/// doctors and admins may reach them.
fn require_staff(user: &User) -> Result<(), AppError> {
    match user.role.as_deref() {
        Some("doctor") | Some("admin") => Ok(()),
        _ => Err(AppError::Auth(
            "Calendar sync requires a doctor or admin identity".to_string(),
        )),
    }
}

/// Doctor-scoped operations: the doctor themself, or an admin.
fn require_doctor_or_admin(user: &User, doctor_id: &Uuid) -> Result<(), AppError> {
    let is_self = user.id == doctor_id.to_string();
    let is_admin = user.role.as_deref() == Some("admin");
    if is_self || is_admin {
        Ok(())
    } else {
        Err(AppError::Auth(
            "Not authorized to manage this doctor's calendar sync".to_string(),
        ))
    }
}

// ==============================================================================
// LIFECYCLE HOOKS
// ==============================================================================
// Each hook answers 200 with the sync outcome in the body. Sync is a
// best-effort side effect of the appointment mutation that already
// happened; a failed sync is reported, never raised.

#[axum::debug_handler]
pub async fn appointment_booked(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<HookRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let engine = ReconciliationEngine::new(&state);
    let outcome = engine
        .on_booked(request.appointment_id, Some(auth.token()))
        .await;

    Ok(Json(json!({
        "appointment_id": request.appointment_id,
        "outcome": outcome
    })))
}

#[axum::debug_handler]
pub async fn appointment_completed(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<HookRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let engine = ReconciliationEngine::new(&state);
    let outcome = engine
        .on_completed(request.appointment_id, Some(auth.token()))
        .await;

    Ok(Json(json!({
        "appointment_id": request.appointment_id,
        "outcome": outcome
    })))
}

#[axum::debug_handler]
pub async fn appointment_cancelled(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<HookRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let engine = ReconciliationEngine::new(&state);
    let outcome = engine
        .on_cancelled(request.appointment_id, Some(auth.token()))
        .await;

    Ok(Json(json!({
        "appointment_id": request.appointment_id,
        "outcome": outcome
    })))
}

#[axum::debug_handler]
pub async fn appointment_rescheduled(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduledHookRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let old_slot = OldSlot {
        slot_date: request.old_slot_date,
        slot_time: request.old_slot_time,
        provider_task_id: request.old_task_id,
        provider_event_id: request.old_event_id,
    };

    let engine = ReconciliationEngine::new(&state);
    let outcome = engine
        .on_rescheduled(request.appointment_id, old_slot, Some(auth.token()))
        .await;

    Ok(Json(json!({
        "appointment_id": request.appointment_id,
        "outcome": outcome
    })))
}

// ==============================================================================
// DOCTOR-SCOPED OPERATIONS ("Sync Now" / "Clean up")
// ==============================================================================

#[axum::debug_handler]
pub async fn sync_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_doctor_or_admin(&user, &doctor_id)?;

    let service = BulkSyncService::new(&state);
    let report = service.sync_all(doctor_id, Some(auth.token())).await;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "report": report
    })))
}

#[axum::debug_handler]
pub async fn cleanup_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_doctor_or_admin(&user, &doctor_id)?;

    let service = BulkSyncService::new(&state);
    match service.purge(doctor_id, Some(auth.token())).await {
        Ok(report) => Ok(Json(json!({
            "doctor_id": doctor_id,
            "report": report
        }))),
        // Cleanup is still best-effort from the caller's perspective, but
        // a provider-wide failure is worth reporting in the body.
        Err(e) => Ok(Json(json!({
            "doctor_id": doctor_id,
            "report": { "tasks_deleted": 0, "events_deleted": 0 },
            "error": e.to_string()
        }))),
    }
}
