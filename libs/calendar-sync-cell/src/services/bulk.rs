// libs/calendar-sync-cell/src/services/bulk.rs
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    Appointment, PurgeReport, SyncAllReport, SyncError, SyncOutcome, TITLE_MARKER_PREFIX,
};
use crate::services::google::GoogleSyncClient;
use crate::services::reconciliation::ReconciliationEngine;

/// Doctor-wide operations: replaying reconciliation over every
/// non-cancelled appointment (after reconnect or on demand) and purging
/// every item this system ever created for a doctor (on disconnect).
pub struct BulkSyncService {
    config: AppConfig,
    supabase: Arc<SupabaseClient>,
    engine: ReconciliationEngine,
}

impl BulkSyncService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            supabase: Arc::new(SupabaseClient::new(config)),
            engine: ReconciliationEngine::new(config),
        }
    }

    /// Replay reconciliation for every non-cancelled appointment of the
    /// doctor. Idempotent: re-running creates no duplicates, since each
    /// pass re-matches before writing. Per-item failures are counted,
    /// never propagated.
    pub async fn sync_all(&self, doctor_id: Uuid, auth_token: Option<&str>) -> SyncAllReport {
        let mut report = SyncAllReport::default();

        let rows = match self
            .supabase
            .get_doctor_appointments(&doctor_id.to_string(), false, auth_token)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not list appointments for doctor {}: {}", doctor_id, e);
                return report;
            }
        };

        info!("Bulk sync for doctor {}: {} appointment(s)", doctor_id, rows.len());

        for row in rows {
            let appointment: Appointment = match serde_json::from_value::<Appointment>(row) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Skipping malformed appointment row: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let status = appointment.derived_status();
            match self
                .engine
                .sync_appointment(appointment.id, status, auth_token)
                .await
            {
                SyncOutcome::Created => report.created += 1,
                SyncOutcome::Updated => report.updated += 1,
                SyncOutcome::Skipped => report.skipped += 1,
                SyncOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            "Bulk sync for doctor {} done: {} created, {} updated, {} skipped, {} failed",
            doctor_id, report.created, report.updated, report.skipped, report.failed
        );
        report
    }

    /// Delete every provider item recognizably created by this system for
    /// the doctor, on both surfaces and regardless of the current mode
    /// (items may exist from a prior mode). Operates purely on provider
    /// enumeration so orphans without a stored id are caught too.
    pub async fn purge(&self, doctor_id: Uuid, auth_token: Option<&str>) -> Result<PurgeReport, SyncError> {
        let mut report = PurgeReport::default();

        let refresh_token = match self
            .supabase
            .get_doctor_credential(&doctor_id.to_string(), auth_token)
            .await?
        {
            Some(token) => token,
            None => {
                info!("Doctor {} has no connected account, nothing to purge", doctor_id);
                return Ok(report);
            }
        };

        let doctor_name = self
            .supabase
            .get_doctor_name(&doctor_id.to_string(), auth_token)
            .await?
            .unwrap_or_else(|| "Doctor".to_string());

        let google = GoogleSyncClient::connect(&self.config, &refresh_token).await?;

        // Tasks surface, exhaustively paginated.
        let mut page_token: Option<String> = None;
        loop {
            let page = google.list_tasks(page_token.as_deref()).await?;
            for task in page.items.unwrap_or_default() {
                let title_hit = task
                    .title
                    .as_deref()
                    .is_some_and(|t| t.contains(TITLE_MARKER_PREFIX));
                let doctor_hit = task
                    .notes
                    .as_deref()
                    .is_some_and(|n| doctor_name_matches(n, &doctor_name));
                if title_hit && doctor_hit {
                    match google.delete_task(&task.id).await {
                        Ok(()) => report.tasks_deleted += 1,
                        Err(e) => warn!("Could not purge task {}: {}", task.id, e),
                    }
                }
            }
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        // Events surface, exhaustively paginated, no time bounds.
        let mut page_token: Option<String> = None;
        loop {
            let page = google.list_events(None, None, page_token.as_deref()).await?;
            for event in page.items.unwrap_or_default() {
                let title_hit = event
                    .summary
                    .as_deref()
                    .is_some_and(|s| s.contains(TITLE_MARKER_PREFIX));
                let doctor_hit = event
                    .description
                    .as_deref()
                    .is_some_and(|d| doctor_name_matches(d, &doctor_name));
                if title_hit && doctor_hit {
                    match google.delete_event(&event.id).await {
                        Ok(()) => report.events_deleted += 1,
                        Err(e) => warn!("Could not purge event {}: {}", event.id, e),
                    }
                }
            }
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        // Stored references now all dangle; clear them in one pass.
        if let Err(e) = self
            .supabase
            .clear_provider_links(&doctor_id.to_string(), auth_token)
            .await
        {
            warn!("Could not clear provider links for doctor {}: {}", doctor_id, e);
        }

        info!(
            "Purge for doctor {} done: {} task(s), {} event(s) deleted",
            doctor_id, report.tasks_deleted, report.events_deleted
        );
        Ok(report)
    }
}

/// Doctor-name match tolerant of a courtesy-title prefix being present in
/// one place and stripped in the other.
pub fn doctor_name_matches(text: &str, doctor_name: &str) -> bool {
    if doctor_name.is_empty() {
        return false;
    }
    if text.contains(doctor_name) {
        return true;
    }
    let stripped = doctor_name
        .trim_start_matches("Dr. ")
        .trim_start_matches("Dr.")
        .trim();
    !stripped.is_empty() && text.contains(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_name_matching_tolerates_prefix() {
        assert!(doctor_name_matches("Doctor: Dr. Jane Smith", "Dr. Jane Smith"));
        assert!(doctor_name_matches("Doctor: Jane Smith", "Dr. Jane Smith"));
        assert!(doctor_name_matches("Doctor: Dr. Jane Smith", "Jane Smith"));
        assert!(!doctor_name_matches("Doctor: John Brown", "Jane Smith"));
        assert!(!doctor_name_matches("Doctor: Jane Smith", ""));
    }
}
