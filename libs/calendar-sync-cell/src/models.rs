// libs/calendar-sync-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_config::SyncMode;

/// Identity marker embedded in a provider item's free-text field. This is
/// the correlation mechanism standing in for a foreign key the Google APIs
/// don't offer; items created by earlier versions of the system carry the
/// same token, so the format must not change.
pub fn apt_marker(appointment_id: &Uuid) -> String {
    format!("APT_ID:{}", appointment_id)
}

/// Generic title fragment present on every item this system creates.
/// Cleanup recognizes our items by this fragment alone.
pub const TITLE_MARKER_PREFIX: &str = "Appointment with ";

pub fn title_marker(patient_name: &str) -> String {
    format!("{}{}", TITLE_MARKER_PREFIX, patient_name)
}

// ==============================================================================
// APPOINTMENT MODEL (sync-cell view of the persistence collaborator's rows)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    /// Denormalized display name used in provider item titles; hydrated
    /// from the patients table when absent.
    pub patient_name: Option<String>,
    /// Date token, "%Y-%m-%d".
    pub slot_date: String,
    /// Human time token, e.g. "10:30 AM".
    pub slot_time: String,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub is_completed: bool,
    /// Provider linkage, owned exclusively by the sync cell. At most one
    /// of these points at a live item at any time.
    #[serde(default)]
    pub provider_task_id: Option<String>,
    #[serde(default)]
    pub provider_event_id: Option<String>,
}

impl Appointment {
    /// Logical status derived from the two lifecycle flags.
    pub fn derived_status(&self) -> AppointmentStatus {
        if self.cancelled {
            AppointmentStatus::Cancelled
        } else if self.is_completed {
            AppointmentStatus::Completed
        } else {
            AppointmentStatus::Pending
        }
    }

    /// Parse the two slot tokens into the scheduled instant.
    pub fn scheduled_instant(&self) -> Result<DateTime<Utc>, SyncError> {
        parse_slot(&self.slot_date, &self.slot_time)
    }

    pub fn stored_id(&self, surface: SyncMode) -> Option<&str> {
        match surface {
            SyncMode::Tasks => self.provider_task_id.as_deref(),
            SyncMode::Calendar => self.provider_event_id.as_deref(),
        }
    }

    pub fn set_stored_id(&mut self, surface: SyncMode, id: Option<String>) {
        match surface {
            SyncMode::Tasks => self.provider_task_id = id,
            SyncMode::Calendar => self.provider_event_id = id,
        }
    }
}

pub fn parse_slot(slot_date: &str, slot_time: &str) -> Result<DateTime<Utc>, SyncError> {
    let date = NaiveDate::parse_from_str(slot_date.trim(), "%Y-%m-%d")
        .map_err(|e| SyncError::SlotParse(format!("bad slot_date '{}': {}", slot_date, e)))?;
    let time = NaiveTime::parse_from_str(slot_time.trim(), "%I:%M %p")
        .map_err(|e| SyncError::SlotParse(format!("bad slot_time '{}': {}", slot_time, e)))?;
    Ok(date.and_time(time).and_utc())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Completed and Cancelled admit no further Pending transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Title suffix. Cosmetic, but the heuristic matcher keys off titles,
    /// so the mapping must stay stable.
    pub fn glyph(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "⏳ PENDING",
            AppointmentStatus::Completed => "✅ COMPLETED",
            AppointmentStatus::Cancelled => "❌ CANCELLED",
        }
    }

    /// Google Tasks status vocabulary.
    pub fn task_status(&self) -> &'static str {
        match self {
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Pending | AppointmentStatus::Cancelled => "needsAction",
        }
    }

    /// Google Calendar colorId. Pending keeps the calendar default.
    pub fn event_color_id(&self) -> Option<&'static str> {
        match self {
            AppointmentStatus::Pending => None,
            AppointmentStatus::Completed => Some("10"),
            AppointmentStatus::Cancelled => Some("11"),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "Pending"),
            AppointmentStatus::Completed => write!(f, "Completed"),
            AppointmentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Slot tokens and provider ids captured before a reschedule mutation, so
/// the item anchored to the old time can still be located and removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OldSlot {
    pub slot_date: String,
    pub slot_time: String,
    pub provider_task_id: Option<String>,
    pub provider_event_id: Option<String>,
}

// ==============================================================================
// GOOGLE WIRE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// RFC 3339 due instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTask {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    #[serde(default)]
    pub items: Option<Vec<GoogleTask>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReminders {
    pub use_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<EventReminders>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<EventDateTime>,
    #[serde(default)]
    pub end: Option<EventDateTime>,
    #[serde(default)]
    pub color_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    #[serde(default)]
    pub items: Option<Vec<GoogleEvent>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Reference to the single live provider item backing an appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderItemRef {
    pub id: String,
    pub surface: SyncMode,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HookRequest {
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduledHookRequest {
    pub appointment_id: Uuid,
    pub old_slot_date: String,
    pub old_slot_time: String,
    #[serde(default)]
    pub old_task_id: Option<String>,
    #[serde(default)]
    pub old_event_id: Option<String>,
}

/// Per-reconciliation outcome. Sync is best-effort: a `Failed` outcome is
/// reported to the caller but never surfaced as an error status.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SyncAllReport {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PurgeReport {
    pub tasks_deleted: u32,
    pub events_deleted: u32,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The doctor never connected a Google account. Not a failure; sync
    /// is silently skipped.
    #[error("Doctor has no connected Google account")]
    CredentialMissing,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Invalid appointment slot: {0}")]
    SlotParse(String),

    #[error("Google token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Google API error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Stale provider reference: {0}")]
    StaleReference(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_status_from_flags() {
        let mut appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_name: Some("Jane Doe".to_string()),
            slot_date: "2025-03-14".to_string(),
            slot_time: "10:00 AM".to_string(),
            cancelled: false,
            is_completed: false,
            provider_task_id: None,
            provider_event_id: None,
        };
        assert_eq!(appointment.derived_status(), AppointmentStatus::Pending);

        appointment.is_completed = true;
        assert_eq!(appointment.derived_status(), AppointmentStatus::Completed);

        // cancelled wins over completed
        appointment.cancelled = true;
        assert_eq!(appointment.derived_status(), AppointmentStatus::Cancelled);
    }

    #[test]
    fn slot_parsing() {
        let instant = parse_slot("2025-03-14", "10:30 AM").unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-03-14T10:30:00+00:00");

        let evening = parse_slot("2025-03-14", "4:05 PM").unwrap();
        assert_eq!(evening.to_rfc3339(), "2025-03-14T16:05:00+00:00");

        assert!(parse_slot("14/03/2025", "10:30 AM").is_err());
        assert!(parse_slot("2025-03-14", "25:99").is_err());
    }

    #[test]
    fn marker_format_is_stable() {
        let id = Uuid::nil();
        assert_eq!(
            apt_marker(&id),
            "APT_ID:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(title_marker("Jane Doe"), "Appointment with Jane Doe");
    }

    #[test]
    fn status_mappings() {
        assert_eq!(AppointmentStatus::Completed.task_status(), "completed");
        assert_eq!(AppointmentStatus::Pending.task_status(), "needsAction");
        assert_eq!(AppointmentStatus::Cancelled.task_status(), "needsAction");

        assert_eq!(AppointmentStatus::Pending.event_color_id(), None);
        assert_eq!(AppointmentStatus::Completed.event_color_id(), Some("10"));
        assert_eq!(AppointmentStatus::Cancelled.event_color_id(), Some("11"));

        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
    }
}
