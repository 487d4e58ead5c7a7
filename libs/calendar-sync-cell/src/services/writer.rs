// libs/calendar-sync-cell/src/services/writer.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use shared_config::SyncMode;
use shared_database::SupabaseClient;

use crate::models::{
    apt_marker, title_marker, Appointment, AppointmentStatus, EventBody, EventDateTime,
    EventReminders, ProviderItemRef, SyncError, TaskBody,
};
use crate::services::google::GoogleSyncClient;

/// Length of the mirrored calendar event. Cosmetic; appointments are
/// rendered as short blocks, not their clinical duration.
const EVENT_DURATION_MINUTES: i64 = 5;

/// Builds provider item bodies deterministically from the appointment and
/// writes them to the chosen surface, persisting the resulting provider
/// id back onto the appointment record.
pub struct ItemWriter {
    supabase: Arc<SupabaseClient>,
}

impl ItemWriter {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// `"<time> - Appointment with <patientName> <glyph>"`. The heuristic
    /// matcher keys off this shape; keep it stable.
    pub fn build_title(appointment: &Appointment, status: AppointmentStatus) -> String {
        let patient = appointment.patient_name.as_deref().unwrap_or("Patient");
        format!(
            "{} - {} {}",
            appointment.slot_time,
            title_marker(patient),
            status.glyph()
        )
    }

    /// Free-text body. The `APT_ID:` marker is load-bearing and must
    /// never be omitted.
    pub fn build_notes(
        appointment: &Appointment,
        status: AppointmentStatus,
        doctor_name: &str,
    ) -> String {
        let patient = appointment.patient_name.as_deref().unwrap_or("Patient");
        format!(
            "Doctor: {}\nPatient: {}\nStatus: {}\n{}",
            doctor_name,
            patient,
            status,
            apt_marker(&appointment.id)
        )
    }

    pub fn build_task_body(
        appointment: &Appointment,
        status: AppointmentStatus,
        doctor_name: &str,
        slot: DateTime<Utc>,
    ) -> TaskBody {
        TaskBody {
            title: Self::build_title(appointment, status),
            notes: Some(Self::build_notes(appointment, status, doctor_name)),
            due: Some(slot.to_rfc3339_opts(SecondsFormat::Secs, true)),
            status: Some(status.task_status().to_string()),
        }
    }

    pub fn build_event_body(
        appointment: &Appointment,
        status: AppointmentStatus,
        doctor_name: &str,
        slot: DateTime<Utc>,
    ) -> EventBody {
        let end = slot + Duration::minutes(EVENT_DURATION_MINUTES);

        // Terminal items should not fire reminders.
        let reminders = status.is_terminal().then(|| EventReminders {
            use_default: false,
            overrides: Some(vec![]),
        });

        EventBody {
            summary: Self::build_title(appointment, status),
            description: Some(Self::build_notes(appointment, status, doctor_name)),
            start: EventDateTime {
                date_time: Some(slot.to_rfc3339_opts(SecondsFormat::Secs, true)),
                time_zone: Some("UTC".to_string()),
            },
            end: EventDateTime {
                date_time: Some(end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                time_zone: Some("UTC".to_string()),
            },
            color_id: status.event_color_id().map(|c| c.to_string()),
            transparency: (status == AppointmentStatus::Cancelled)
                .then(|| "transparent".to_string()),
            reminders,
        }
    }

    /// Update the existing item or create a new one, then persist the
    /// provider id onto the appointment. An update failure degrades to
    /// create-new rather than surfacing: a half-written provider state is
    /// healed by matching on the next pass.
    pub async fn write(
        &self,
        google: &GoogleSyncClient,
        appointment: &Appointment,
        status: AppointmentStatus,
        doctor_name: &str,
        slot: DateTime<Utc>,
        existing: Option<&str>,
        surface: SyncMode,
        auth_token: Option<&str>,
    ) -> Result<ProviderItemRef, SyncError> {
        let item_id = match surface {
            SyncMode::Tasks => {
                let body = Self::build_task_body(appointment, status, doctor_name, slot);
                self.write_task(google, &body, existing).await?
            }
            SyncMode::Calendar => {
                let body = Self::build_event_body(appointment, status, doctor_name, slot);
                self.write_event(google, &body, existing).await?
            }
        };

        if appointment.stored_id(surface) != Some(item_id.as_str()) {
            self.persist_provider_id(appointment, surface, &item_id, auth_token)
                .await?;
        }

        Ok(ProviderItemRef { id: item_id, surface })
    }

    async fn write_task(
        &self,
        google: &GoogleSyncClient,
        body: &TaskBody,
        existing: Option<&str>,
    ) -> Result<String, SyncError> {
        if let Some(id) = existing {
            match google.patch_task(id, body).await {
                Ok(task) => {
                    debug!("Updated task {}", task.id);
                    return Ok(task.id);
                }
                Err(e) => {
                    warn!("Task {} update failed, creating new: {}", id, e);
                }
            }
        }

        let task = google.insert_task(body).await?;
        info!("Created task {}", task.id);
        Ok(task.id)
    }

    async fn write_event(
        &self,
        google: &GoogleSyncClient,
        body: &EventBody,
        existing: Option<&str>,
    ) -> Result<String, SyncError> {
        if let Some(id) = existing {
            match google.patch_event(id, body).await {
                Ok(event) => {
                    debug!("Updated event {}", event.id);
                    return Ok(event.id);
                }
                Err(e) => {
                    warn!("Event {} update failed, creating new: {}", id, e);
                }
            }
        }

        let event = google.insert_event(body).await?;
        info!("Created event {}", event.id);
        Ok(event.id)
    }

    async fn persist_provider_id(
        &self,
        appointment: &Appointment,
        surface: SyncMode,
        item_id: &str,
        auth_token: Option<&str>,
    ) -> Result<(), SyncError> {
        let patch = match surface {
            SyncMode::Tasks => json!({ "provider_task_id": item_id }),
            SyncMode::Calendar => json!({ "provider_event_id": item_id }),
        };
        self.supabase
            .update_appointment(&appointment.id.to_string(), patch, auth_token)
            .await?;
        debug!(
            "Persisted provider id {} onto appointment {}",
            item_id, appointment.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_appointment() -> Appointment {
        Appointment {
            id: Uuid::nil(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_name: Some("Jane Doe".to_string()),
            slot_date: "2025-03-14".to_string(),
            slot_time: "10:00 AM".to_string(),
            cancelled: false,
            is_completed: false,
            provider_task_id: None,
            provider_event_id: None,
        }
    }

    #[test]
    fn title_shape() {
        let appointment = test_appointment();
        assert_eq!(
            ItemWriter::build_title(&appointment, AppointmentStatus::Pending),
            "10:00 AM - Appointment with Jane Doe ⏳ PENDING"
        );
        assert_eq!(
            ItemWriter::build_title(&appointment, AppointmentStatus::Cancelled),
            "10:00 AM - Appointment with Jane Doe ❌ CANCELLED"
        );
    }

    #[test]
    fn notes_carry_the_marker() {
        let appointment = test_appointment();
        let notes = ItemWriter::build_notes(&appointment, AppointmentStatus::Pending, "Dr. Smith");
        assert!(notes.contains("Doctor: Dr. Smith"));
        assert!(notes.contains("Patient: Jane Doe"));
        assert!(notes.contains("Status: Pending"));
        assert!(notes.contains("APT_ID:00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn task_body_maps_status() {
        let appointment = test_appointment();
        let slot = appointment.scheduled_instant().unwrap();

        let pending =
            ItemWriter::build_task_body(&appointment, AppointmentStatus::Pending, "Dr. Smith", slot);
        assert_eq!(pending.status.as_deref(), Some("needsAction"));
        assert_eq!(pending.due.as_deref(), Some("2025-03-14T10:00:00Z"));

        let completed =
            ItemWriter::build_task_body(&appointment, AppointmentStatus::Completed, "Dr. Smith", slot);
        assert_eq!(completed.status.as_deref(), Some("completed"));
    }

    #[test]
    fn event_body_colors_and_reminders() {
        let appointment = test_appointment();
        let slot = appointment.scheduled_instant().unwrap();

        let pending =
            ItemWriter::build_event_body(&appointment, AppointmentStatus::Pending, "Dr. Smith", slot);
        assert!(pending.color_id.is_none());
        assert!(pending.reminders.is_none());
        assert!(pending.transparency.is_none());
        assert_eq!(pending.start.date_time.as_deref(), Some("2025-03-14T10:00:00Z"));
        assert_eq!(pending.end.date_time.as_deref(), Some("2025-03-14T10:05:00Z"));

        let completed =
            ItemWriter::build_event_body(&appointment, AppointmentStatus::Completed, "Dr. Smith", slot);
        assert_eq!(completed.color_id.as_deref(), Some("10"));
        assert!(!completed.reminders.as_ref().unwrap().use_default);

        let cancelled =
            ItemWriter::build_event_body(&appointment, AppointmentStatus::Cancelled, "Dr. Smith", slot);
        assert_eq!(cancelled.color_id.as_deref(), Some("11"));
        assert_eq!(cancelled.transparency.as_deref(), Some("transparent"));
    }
}
