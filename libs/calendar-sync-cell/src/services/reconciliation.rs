// libs/calendar-sync-cell/src/services/reconciliation.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::{AppConfig, SyncMode};
use shared_database::SupabaseClient;

use crate::models::{
    parse_slot, Appointment, AppointmentStatus, OldSlot, SyncError, SyncOutcome,
};
use crate::services::converter::ModeConverter;
use crate::services::google::GoogleSyncClient;
use crate::services::matcher::{within_window, ItemMatcher};
use crate::services::writer::ItemWriter;

/// Orchestrates one locate-or-create-then-update cycle per appointment
/// status transition, and mirrors the result into the doctor's Google
/// account. Sync is a best-effort side effect: nothing that happens here
/// may fail the appointment mutation that triggered it.
pub struct ReconciliationEngine {
    config: AppConfig,
    supabase: Arc<SupabaseClient>,
    writer: ItemWriter,
    converter: ModeConverter,
    mode: SyncMode,
}

impl ReconciliationEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_mode(config, config.sync_mode)
    }

    /// Mode is injected at construction so both paths stay testable;
    /// it is never re-read from the environment at call time.
    pub fn with_mode(config: &AppConfig, mode: SyncMode) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let writer = ItemWriter::new(Arc::clone(&supabase));
        let converter = ModeConverter::new(Arc::clone(&supabase));

        Self {
            config: config.clone(),
            supabase,
            writer,
            converter,
            mode,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    pub async fn on_booked(&self, appointment_id: Uuid, auth_token: Option<&str>) -> SyncOutcome {
        self.sync_appointment(appointment_id, AppointmentStatus::Pending, auth_token)
            .await
    }

    pub async fn on_completed(&self, appointment_id: Uuid, auth_token: Option<&str>) -> SyncOutcome {
        self.sync_appointment(appointment_id, AppointmentStatus::Completed, auth_token)
            .await
    }

    pub async fn on_cancelled(&self, appointment_id: Uuid, auth_token: Option<&str>) -> SyncOutcome {
        self.sync_appointment(appointment_id, AppointmentStatus::Cancelled, auth_token)
            .await
    }

    /// Reschedule is compound: the new slot is reconciled as Pending, then
    /// any item still anchored to the old slot's window is removed using
    /// the old tokens and ids captured before the mutation.
    pub async fn on_rescheduled(
        &self,
        appointment_id: Uuid,
        old_slot: OldSlot,
        auth_token: Option<&str>,
    ) -> SyncOutcome {
        match self
            .reconcile(appointment_id, AppointmentStatus::Pending, auth_token)
            .await
        {
            Ok((appointment, outcome)) => {
                if let Err(e) = self
                    .remove_old_slot(&appointment, &old_slot, auth_token)
                    .await
                {
                    warn!(
                        "Old-slot cleanup failed for appointment {}: {}",
                        appointment_id, e
                    );
                }
                outcome
            }
            Err(SyncError::CredentialMissing) => {
                debug!("Appointment {} reschedule: doctor not connected, sync skipped", appointment_id);
                SyncOutcome::Skipped
            }
            Err(e) => {
                warn!(
                    "Sync failed for rescheduled appointment {} (mutation unaffected): {}",
                    appointment_id, e
                );
                SyncOutcome::Failed
            }
        }
    }

    /// Error-swallowing boundary shared by all per-appointment triggers.
    pub async fn sync_appointment(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> SyncOutcome {
        match self.reconcile(appointment_id, status, auth_token).await {
            Ok((_, outcome)) => outcome,
            Err(SyncError::CredentialMissing) => {
                debug!("Appointment {}: doctor not connected, sync skipped", appointment_id);
                SyncOutcome::Skipped
            }
            Err(SyncError::SlotParse(msg)) => {
                warn!("Appointment {} has an unparseable slot, sync skipped: {}", appointment_id, msg);
                SyncOutcome::Skipped
            }
            Err(e) => {
                warn!(
                    "Sync failed for appointment {} (mutation unaffected): {}",
                    appointment_id, e
                );
                SyncOutcome::Failed
            }
        }
    }

    // ------------------------------------------------------------------
    // Core cycle
    // ------------------------------------------------------------------

    async fn reconcile(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<(Appointment, SyncOutcome), SyncError> {
        let row = self
            .supabase
            .get_appointment(&appointment_id.to_string(), auth_token)
            .await?
            .ok_or(SyncError::AppointmentNotFound)?;
        let mut appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| SyncError::Database(format!("malformed appointment row: {}", e)))?;

        self.hydrate_patient_name(&mut appointment, auth_token).await?;
        let slot = appointment.scheduled_instant()?;

        let refresh_token = self
            .supabase
            .get_doctor_credential(&appointment.doctor_id.to_string(), auth_token)
            .await?
            .ok_or(SyncError::CredentialMissing)?;

        let doctor_name = self
            .supabase
            .get_doctor_name(&appointment.doctor_id.to_string(), auth_token)
            .await?
            .unwrap_or_else(|| "Doctor".to_string());

        let google = GoogleSyncClient::connect(&self.config, &refresh_token).await?;

        let outcome = self
            .sync_with(&google, &mut appointment, status, &doctor_name, slot, auth_token)
            .await?;

        Ok((appointment, outcome))
    }

    async fn sync_with(
        &self,
        google: &GoogleSyncClient,
        appointment: &mut Appointment,
        status: AppointmentStatus,
        doctor_name: &str,
        slot: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<SyncOutcome, SyncError> {
        let matcher = ItemMatcher::new(google);
        let matched = matcher.find(appointment, slot, self.mode).await?;

        // A stored id that no longer resolves is cleared immediately so
        // it is not retried on the next pass.
        if let Some(stale) = &matched.stale_id {
            info!(
                "Clearing stale {} id {} on appointment {}",
                surface_noun(self.mode),
                stale,
                appointment.id
            );
            appointment.set_stored_id(self.mode, None);
            let patch = match self.mode {
                SyncMode::Tasks => json!({ "provider_task_id": null }),
                SyncMode::Calendar => json!({ "provider_event_id": null }),
            };
            self.supabase
                .update_appointment(&appointment.id.to_string(), patch, auth_token)
                .await?;
        }

        let existed = matched.item_id.is_some();
        let item = self
            .writer
            .write(
                google,
                appointment,
                status,
                doctor_name,
                slot,
                matched.item_id.as_deref(),
                self.mode,
                auth_token,
            )
            .await?;
        appointment.set_stored_id(self.mode, Some(item.id));

        self.converter
            .convert_if_terminal(google, appointment, status, doctor_name, slot, self.mode, auth_token)
            .await?;

        info!(
            "Appointment {} reconciled as {} ({})",
            appointment.id,
            status,
            if existed { "updated" } else { "created" }
        );

        Ok(if existed {
            SyncOutcome::Updated
        } else {
            SyncOutcome::Created
        })
    }

    async fn hydrate_patient_name(
        &self,
        appointment: &mut Appointment,
        auth_token: Option<&str>,
    ) -> Result<(), SyncError> {
        if appointment.patient_name.is_some() {
            return Ok(());
        }

        if let Some(name) = self
            .supabase
            .get_patient_name(&appointment.patient_id.to_string(), auth_token)
            .await?
        {
            self.supabase
                .update_appointment(
                    &appointment.id.to_string(),
                    json!({ "patient_name": name }),
                    auth_token,
                )
                .await?;
            appointment.patient_name = Some(name);
        }
        Ok(())
    }

    /// Locate and remove whatever is still anchored to the old slot,
    /// without touching the item now backing the appointment.
    async fn remove_old_slot(
        &self,
        appointment: &Appointment,
        old_slot: &OldSlot,
        auth_token: Option<&str>,
    ) -> Result<(), SyncError> {
        let old_instant = parse_slot(&old_slot.slot_date, &old_slot.slot_time)?;

        let refresh_token = self
            .supabase
            .get_doctor_credential(&appointment.doctor_id.to_string(), auth_token)
            .await?
            .ok_or(SyncError::CredentialMissing)?;
        let google = GoogleSyncClient::connect(&self.config, &refresh_token).await?;

        let keep_task = appointment.provider_task_id.as_deref();
        let keep_event = appointment.provider_event_id.as_deref();

        // Old stored ids first. Reconciliation may have re-linked the same
        // item to the new slot, in which case the id must survive.
        if let Some(old_id) = old_slot.provider_task_id.as_deref() {
            if Some(old_id) != keep_task {
                if let Err(e) = google.delete_task(old_id).await {
                    warn!("Could not delete old task {}: {}", old_id, e);
                }
            }
        }
        if let Some(old_id) = old_slot.provider_event_id.as_deref() {
            if Some(old_id) != keep_event {
                if let Err(e) = google.delete_event(old_id).await {
                    warn!("Could not delete old event {}: {}", old_id, e);
                }
            }
        }

        // Then a window sweep for anything the stored ids missed.
        let marker = crate::models::apt_marker(&appointment.id);
        let fragment = appointment
            .patient_name
            .as_deref()
            .map(crate::models::title_marker);

        if let Ok(page) = google.list_tasks(None).await {
            for task in page.items.unwrap_or_default() {
                if Some(task.id.as_str()) == keep_task {
                    continue;
                }
                let in_window = task
                    .due
                    .as_deref()
                    .is_some_and(|due| within_window(due, old_instant));
                if !in_window {
                    continue;
                }
                let ours = task.notes.as_deref().is_some_and(|n| n.contains(&marker))
                    || match fragment.as_deref() {
                        Some(f) => task.title.as_deref().is_some_and(|t| t.contains(f)),
                        None => false,
                    };
                if ours {
                    if let Err(e) = google.delete_task(&task.id).await {
                        warn!("Could not delete stale task {}: {}", task.id, e);
                    }
                }
            }
        }

        let window = chrono::Duration::hours(1);
        if let Ok(page) = google
            .list_events(Some(old_instant - window), Some(old_instant + window), None)
            .await
        {
            for event in page.items.unwrap_or_default() {
                if Some(event.id.as_str()) == keep_event {
                    continue;
                }
                let in_window = event
                    .start
                    .as_ref()
                    .and_then(|s| s.date_time.as_deref())
                    .is_some_and(|start| within_window(start, old_instant));
                if !in_window {
                    continue;
                }
                let ours = event
                    .description
                    .as_deref()
                    .is_some_and(|d| d.contains(&marker))
                    || match fragment.as_deref() {
                        Some(f) => event.summary.as_deref().is_some_and(|s| s.contains(f)),
                        None => false,
                    };
                if ours {
                    if let Err(e) = google.delete_event(&event.id).await {
                        warn!("Could not delete stale event {}: {}", event.id, e);
                    }
                }
            }
        }

        info!(
            "Old slot {} {} cleaned up for appointment {}",
            old_slot.slot_date, old_slot.slot_time, appointment.id
        );
        Ok(())
    }
}

fn surface_noun(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Tasks => "task",
        SyncMode::Calendar => "event",
    }
}
