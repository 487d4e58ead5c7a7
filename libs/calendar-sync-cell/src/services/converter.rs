// libs/calendar-sync-cell/src/services/converter.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use shared_config::SyncMode;
use shared_database::SupabaseClient;

use crate::models::{apt_marker, title_marker, Appointment, AppointmentStatus, SyncError};
use crate::services::google::GoogleSyncClient;
use crate::services::matcher::{within_window, ItemMatcher};
use crate::services::writer::ItemWriter;

/// One-way Task→Event conversion for appointments that reach a terminal
/// status under Tasks mode: the task representation is replaced by a
/// colored event, leaving exactly one live item.
pub struct ModeConverter {
    supabase: Arc<SupabaseClient>,
    writer: ItemWriter,
}

impl ModeConverter {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        let writer = ItemWriter::new(Arc::clone(&supabase));
        Self { supabase, writer }
    }

    /// No-op unless `mode == Tasks` and the status is terminal.
    pub async fn convert_if_terminal(
        &self,
        google: &GoogleSyncClient,
        appointment: &mut Appointment,
        status: AppointmentStatus,
        doctor_name: &str,
        slot: DateTime<Utc>,
        mode: SyncMode,
        auth_token: Option<&str>,
    ) -> Result<(), SyncError> {
        if mode != SyncMode::Tasks || !status.is_terminal() {
            return Ok(());
        }

        info!(
            "Converting appointment {} task to {} event",
            appointment.id, status
        );

        // Locate or create the event representation first; the task is
        // only removed once the event definitely exists.
        let matcher = ItemMatcher::new(google);
        let outcome = matcher.find(appointment, slot, SyncMode::Calendar).await?;
        if let Some(stale) = &outcome.stale_id {
            debug!("Clearing stale event id {} during conversion", stale);
            appointment.set_stored_id(SyncMode::Calendar, None);
            self.supabase
                .update_appointment(
                    &appointment.id.to_string(),
                    json!({ "provider_event_id": null }),
                    auth_token,
                )
                .await?;
        }

        let event_ref = self
            .writer
            .write(
                google,
                appointment,
                status,
                doctor_name,
                slot,
                outcome.item_id.as_deref(),
                SyncMode::Calendar,
                auth_token,
            )
            .await?;
        appointment.set_stored_id(SyncMode::Calendar, Some(event_ref.id.clone()));

        // Remove the task side: the stored id plus any duplicate left by
        // an earlier partial failure.
        let victims = self.collect_task_victims(google, appointment, slot).await;
        for task_id in &victims {
            if let Err(e) = google.delete_task(task_id).await {
                warn!("Could not delete task {} during conversion: {}", task_id, e);
            }
        }

        appointment.set_stored_id(SyncMode::Tasks, None);
        self.supabase
            .update_appointment(
                &appointment.id.to_string(),
                json!({ "provider_task_id": null }),
                auth_token,
            )
            .await?;

        info!(
            "Appointment {} converted: event {} live, {} task(s) removed",
            appointment.id,
            event_ref.id,
            victims.len()
        );
        Ok(())
    }

    /// Every task recognizably belonging to this appointment: the stored
    /// id and anything in the list matching the marker or the heuristic
    /// window. Enumeration failures degrade to the stored id alone.
    async fn collect_task_victims(
        &self,
        google: &GoogleSyncClient,
        appointment: &Appointment,
        slot: DateTime<Utc>,
    ) -> Vec<String> {
        let mut victims: Vec<String> = Vec::new();
        if let Some(stored) = appointment.stored_id(SyncMode::Tasks) {
            victims.push(stored.to_string());
        }

        let marker = apt_marker(&appointment.id);
        let title_fragment = appointment.patient_name.as_deref().map(title_marker);

        match google.list_tasks(None).await {
            Ok(page) => {
                for task in page.items.unwrap_or_default() {
                    if victims.iter().any(|v| v == &task.id) {
                        continue;
                    }
                    let marker_hit = task.notes.as_deref().is_some_and(|n| n.contains(&marker));
                    let heuristic_hit = match (title_fragment.as_deref(), task.due.as_deref()) {
                        (Some(fragment), Some(due)) => {
                            within_window(due, slot)
                                && task.title.as_deref().is_some_and(|t| t.contains(fragment))
                        }
                        _ => false,
                    };
                    if marker_hit || heuristic_hit {
                        victims.push(task.id);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Task sweep failed for appointment {}, deleting stored id only: {}",
                    appointment.id, e
                );
            }
        }

        victims
    }
}
