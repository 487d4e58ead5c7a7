// libs/calendar-sync-cell/src/services/google.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{
    EventBody, EventListResponse, GoogleEvent, GoogleTask, SyncError, TaskBody,
    TaskListResponse,
};

/// Tasklist all appointment tasks live in.
pub const DEFAULT_TASKLIST: &str = "@default";
/// Calendar all appointment events live in.
pub const PRIMARY_CALENDAR: &str = "primary";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authenticated client for the two Google surfaces appointments are
/// mirrored to: the Tasks API and the Calendar (events) API. Constructed
/// per reconciliation from the doctor's long-lived refresh token.
pub struct GoogleSyncClient {
    client: Client,
    access_token: String,
    tasks_base_url: String,
    calendar_base_url: String,
}

impl GoogleSyncClient {
    /// Exchange the refresh token for a short-lived access token and
    /// build an authenticated client. All calls carry a bounded timeout;
    /// a slow provider must not hold the triggering request hostage.
    pub async fn connect(config: &AppConfig, refresh_token: &str) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.google_timeout_secs))
            .build()?;

        let url = format!("{}/token", config.google_oauth_base_url);
        debug!("Exchanging refresh token at {}", url);

        let response = client
            .post(&url)
            .form(&[
                ("client_id", config.google_client_id.as_str()),
                ("client_secret", config.google_client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Google token exchange failed: {} - {}", status, response_text);
            return Err(SyncError::TokenExchange(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        let token: TokenResponse = serde_json::from_str(&response_text)
            .map_err(|e| SyncError::TokenExchange(format!("Failed to parse token response: {}", e)))?;

        info!("Google access token obtained");

        Ok(Self {
            client,
            access_token: token.access_token,
            tasks_base_url: config.google_tasks_base_url.clone(),
            calendar_base_url: config.google_calendar_base_url.clone(),
        })
    }

    fn tasks_url(&self, task_id: Option<&str>) -> String {
        match task_id {
            Some(id) => format!(
                "{}/tasks/v1/lists/{}/tasks/{}",
                self.tasks_base_url, DEFAULT_TASKLIST, id
            ),
            None => format!(
                "{}/tasks/v1/lists/{}/tasks",
                self.tasks_base_url, DEFAULT_TASKLIST
            ),
        }
    }

    fn events_url(&self, event_id: Option<&str>) -> String {
        match event_id {
            Some(id) => format!(
                "{}/calendar/v3/calendars/{}/events/{}",
                self.calendar_base_url, PRIMARY_CALENDAR, id
            ),
            None => format!(
                "{}/calendar/v3/calendars/{}/events",
                self.calendar_base_url, PRIMARY_CALENDAR
            ),
        }
    }

    async fn execute<T>(&self, request: reqwest::RequestBuilder, what: &str) -> Result<T, SyncError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = request
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        debug!("Google {} response: {}", what, status);

        if !status.is_success() {
            warn!("Google {} failed: {} - {}", what, status, response_text);
            return Err(SyncError::Provider {
                status: status.as_u16(),
                message: response_text,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| SyncError::Provider {
            status: status.as_u16(),
            message: format!("Failed to parse {} response: {}", what, e),
        })
    }

    /// Delete helper shared by both surfaces. 404/410 count as success:
    /// the item being gone is exactly the desired end state.
    async fn execute_delete(&self, url: String, what: &str) -> Result<(), SyncError> {
        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 404 || status.as_u16() == 410 {
            debug!("Google {} delete: {}", what, status);
            return Ok(());
        }

        let response_text = response.text().await.unwrap_or_default();
        warn!("Google {} delete failed: {} - {}", what, status, response_text);
        Err(SyncError::Provider {
            status: status.as_u16(),
            message: response_text,
        })
    }

    // ------------------------------------------------------------------
    // Tasks surface
    // ------------------------------------------------------------------

    /// GET /tasks/v1/lists/@default/tasks/{id}
    pub async fn get_task(&self, task_id: &str) -> Result<GoogleTask, SyncError> {
        self.execute(self.client.get(self.tasks_url(Some(task_id))), "task get")
            .await
    }

    /// GET /tasks/v1/lists/@default/tasks. Returns one page, with completed
    /// and hidden tasks included so terminal items stay findable.
    pub async fn list_tasks(&self, page_token: Option<&str>) -> Result<TaskListResponse, SyncError> {
        let mut request = self.client.get(self.tasks_url(None)).query(&[
            ("showCompleted", "true"),
            ("showHidden", "true"),
            ("maxResults", "100"),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        self.execute(request, "task list").await
    }

    /// POST /tasks/v1/lists/@default/tasks
    pub async fn insert_task(&self, body: &TaskBody) -> Result<GoogleTask, SyncError> {
        self.execute(self.client.post(self.tasks_url(None)).json(body), "task insert")
            .await
    }

    /// PATCH /tasks/v1/lists/@default/tasks/{id}
    pub async fn patch_task(&self, task_id: &str, body: &TaskBody) -> Result<GoogleTask, SyncError> {
        self.execute(
            self.client.patch(self.tasks_url(Some(task_id))).json(body),
            "task patch",
        )
        .await
    }

    /// DELETE /tasks/v1/lists/@default/tasks/{id}
    pub async fn delete_task(&self, task_id: &str) -> Result<(), SyncError> {
        self.execute_delete(self.tasks_url(Some(task_id)), "task").await
    }

    // ------------------------------------------------------------------
    // Events surface
    // ------------------------------------------------------------------

    /// GET /calendar/v3/calendars/primary/events/{id}
    pub async fn get_event(&self, event_id: &str) -> Result<GoogleEvent, SyncError> {
        self.execute(self.client.get(self.events_url(Some(event_id))), "event get")
            .await
    }

    /// GET /calendar/v3/calendars/primary/events. Returns one page,
    /// optionally bounded to a time window.
    pub async fn list_events(
        &self,
        time_min: Option<DateTime<Utc>>,
        time_max: Option<DateTime<Utc>>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, SyncError> {
        let mut request = self.client.get(self.events_url(None)).query(&[
            ("singleEvents", "true"),
            ("maxResults", "250"),
        ]);
        if let Some(min) = time_min {
            request = request.query(&[("timeMin", min.to_rfc3339())]);
        }
        if let Some(max) = time_max {
            request = request.query(&[("timeMax", max.to_rfc3339())]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        self.execute(request, "event list").await
    }

    /// POST /calendar/v3/calendars/primary/events
    pub async fn insert_event(&self, body: &EventBody) -> Result<GoogleEvent, SyncError> {
        self.execute(self.client.post(self.events_url(None)).json(body), "event insert")
            .await
    }

    /// PATCH /calendar/v3/calendars/primary/events/{id}
    pub async fn patch_event(&self, event_id: &str, body: &EventBody) -> Result<GoogleEvent, SyncError> {
        self.execute(
            self.client.patch(self.events_url(Some(event_id))).json(body),
            "event patch",
        )
        .await
    }

    /// DELETE /calendar/v3/calendars/primary/events/{id}
    pub async fn delete_event(&self, event_id: &str) -> Result<(), SyncError> {
        self.execute_delete(self.events_url(Some(event_id)), "event").await
    }
}
