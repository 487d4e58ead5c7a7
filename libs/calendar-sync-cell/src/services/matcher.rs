// libs/calendar-sync-cell/src/services/matcher.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use shared_config::SyncMode;

use crate::models::{apt_marker, title_marker, Appointment, SyncError};
use crate::services::google::GoogleSyncClient;

/// Heuristic window around the scheduled instant.
pub const MATCH_WINDOW_MINUTES: i64 = 5;
/// Upper bound on items scanned by the marker/heuristic tiers. Items
/// beyond this bound are invisible to matching; that brittleness is part
/// of the marker scheme and is compensated by cleanup's full pagination.
const MAX_SCAN_ITEMS: usize = 100;
/// Event enumeration is bounded to the slot plus/minus this many hours.
const EVENT_WINDOW_HOURS: i64 = 24;

/// Result of a matching pass. `stale_id` carries a stored provider id
/// that no longer resolves; the caller must clear it so it is not
/// retried on the next pass.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub item_id: Option<String>,
    pub stale_id: Option<String>,
}

/// Locates the provider item previously created for an appointment, if
/// any, through three tiers: stored reference, embedded marker, then a
/// time/title heuristic for items predating markers.
pub struct ItemMatcher<'a> {
    google: &'a GoogleSyncClient,
}

impl<'a> ItemMatcher<'a> {
    pub fn new(google: &'a GoogleSyncClient) -> Self {
        Self { google }
    }

    pub async fn find(
        &self,
        appointment: &Appointment,
        slot: DateTime<Utc>,
        surface: SyncMode,
    ) -> Result<MatchOutcome, SyncError> {
        match surface {
            SyncMode::Tasks => self.find_task(appointment, slot).await,
            SyncMode::Calendar => self.find_event(appointment, slot).await,
        }
    }

    pub async fn find_task(
        &self,
        appointment: &Appointment,
        slot: DateTime<Utc>,
    ) -> Result<MatchOutcome, SyncError> {
        let mut outcome = MatchOutcome::default();

        // Tier 1: stored reference. Any failure is a soft miss; the id is
        // reported as stale and the search continues.
        if let Some(stored) = appointment.stored_id(SyncMode::Tasks) {
            match self.google.get_task(stored).await {
                Ok(task) => {
                    debug!("Task {} resolved via stored id", task.id);
                    outcome.item_id = Some(task.id);
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!("Stored task id {} did not resolve: {}", stored, e);
                    outcome.stale_id = Some(stored.to_string());
                }
            }
        }

        let marker = apt_marker(&appointment.id);
        let title_fragment = appointment
            .patient_name
            .as_deref()
            .map(title_marker);

        let mut heuristic_hit: Option<String> = None;
        let mut scanned = 0usize;
        let mut page_token: Option<String> = None;

        loop {
            let page = self.google.list_tasks(page_token.as_deref()).await?;
            let items = page.items.unwrap_or_default();

            for task in &items {
                // Tier 2: marker match is authoritative.
                if task.notes.as_deref().is_some_and(|n| n.contains(&marker)) {
                    info!("Task {} matched appointment {} by marker", task.id, appointment.id);
                    outcome.item_id = Some(task.id.clone());
                    return Ok(outcome);
                }

                // Tier 3: first in-window title match, enumeration order.
                if heuristic_hit.is_none() {
                    if let (Some(fragment), Some(due)) = (title_fragment.as_deref(), task.due.as_deref()) {
                        if within_window(due, slot)
                            && task.title.as_deref().is_some_and(|t| t.contains(fragment))
                        {
                            heuristic_hit = Some(task.id.clone());
                        }
                    }
                }
            }

            scanned += items.len();
            page_token = page.next_page_token;
            if page_token.is_none() || scanned >= MAX_SCAN_ITEMS {
                break;
            }
        }

        if let Some(id) = &heuristic_hit {
            info!("Task {} matched appointment {} heuristically", id, appointment.id);
        }
        outcome.item_id = heuristic_hit;
        Ok(outcome)
    }

    pub async fn find_event(
        &self,
        appointment: &Appointment,
        slot: DateTime<Utc>,
    ) -> Result<MatchOutcome, SyncError> {
        let mut outcome = MatchOutcome::default();

        if let Some(stored) = appointment.stored_id(SyncMode::Calendar) {
            match self.google.get_event(stored).await {
                Ok(event) => {
                    debug!("Event {} resolved via stored id", event.id);
                    outcome.item_id = Some(event.id);
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!("Stored event id {} did not resolve: {}", stored, e);
                    outcome.stale_id = Some(stored.to_string());
                }
            }
        }

        let marker = apt_marker(&appointment.id);
        let title_fragment = appointment
            .patient_name
            .as_deref()
            .map(title_marker);

        let time_min = slot - Duration::hours(EVENT_WINDOW_HOURS);
        let time_max = slot + Duration::hours(EVENT_WINDOW_HOURS);

        let mut heuristic_hit: Option<String> = None;
        let mut scanned = 0usize;
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .google
                .list_events(Some(time_min), Some(time_max), page_token.as_deref())
                .await?;
            let items = page.items.unwrap_or_default();

            for event in &items {
                if event
                    .description
                    .as_deref()
                    .is_some_and(|d| d.contains(&marker))
                {
                    info!("Event {} matched appointment {} by marker", event.id, appointment.id);
                    outcome.item_id = Some(event.id.clone());
                    return Ok(outcome);
                }

                if heuristic_hit.is_none() {
                    let start = event
                        .start
                        .as_ref()
                        .and_then(|s| s.date_time.as_deref());
                    if let (Some(fragment), Some(start)) = (title_fragment.as_deref(), start) {
                        if within_window(start, slot)
                            && event.summary.as_deref().is_some_and(|s| s.contains(fragment))
                        {
                            heuristic_hit = Some(event.id.clone());
                        }
                    }
                }
            }

            scanned += items.len();
            page_token = page.next_page_token;
            if page_token.is_none() || scanned >= MAX_SCAN_ITEMS {
                break;
            }
        }

        if let Some(id) = &heuristic_hit {
            info!("Event {} matched appointment {} heuristically", id, appointment.id);
        }
        outcome.item_id = heuristic_hit;
        Ok(outcome)
    }
}

/// True when the RFC 3339 instant lies within the heuristic window of
/// the slot. Unparseable instants never match.
pub fn within_window(rfc3339: &str, slot: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(rfc3339) {
        Ok(instant) => {
            let delta = (instant.with_timezone(&Utc) - slot).num_seconds().abs();
            delta <= MATCH_WINDOW_MINUTES * 60
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_accepts_nearby_instants() {
        let slot = DateTime::parse_from_rfc3339("2025-03-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(within_window("2025-03-14T10:00:00Z", slot));
        assert!(within_window("2025-03-14T10:05:00Z", slot));
        assert!(within_window("2025-03-14T09:55:00Z", slot));
        assert!(!within_window("2025-03-14T10:06:00Z", slot));
        assert!(!within_window("2025-03-14T09:30:00Z", slot));
    }

    #[test]
    fn window_boundary_is_exact_to_the_second() {
        let slot = DateTime::parse_from_rfc3339("2025-03-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(within_window("2025-03-14T10:05:00Z", slot));
        assert!(!within_window("2025-03-14T10:05:01Z", slot));
        assert!(!within_window("2025-03-14T09:54:59Z", slot));
    }

    #[test]
    fn window_rejects_garbage() {
        let slot = Utc::now();
        assert!(!within_window("not-a-date", slot));
        assert!(!within_window("", slot));
    }
}
