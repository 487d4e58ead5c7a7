use std::env;
use tracing::warn;

/// Which representation appointments are mirrored as in the doctor's
/// Google account. Read once at startup; changing it does not migrate
/// items created under the other mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Tasks,
    Calendar,
}

impl SyncMode {
    pub fn from_env_value(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "calendar" | "events" => SyncMode::Calendar,
            _ => SyncMode::Tasks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_oauth_base_url: String,
    pub google_tasks_base_url: String,
    pub google_calendar_base_url: String,
    pub google_timeout_secs: u64,
    pub sync_mode: SyncMode,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_CLIENT_ID not set, using empty value");
                    String::new()
                }),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_CLIENT_SECRET not set, using empty value");
                    String::new()
                }),
            google_oauth_base_url: env::var("GOOGLE_OAUTH_BASE_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com".to_string()),
            google_tasks_base_url: env::var("GOOGLE_TASKS_BASE_URL")
                .unwrap_or_else(|_| "https://tasks.googleapis.com".to_string()),
            google_calendar_base_url: env::var("GOOGLE_CALENDAR_BASE_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com".to_string()),
            google_timeout_secs: env::var("GOOGLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            sync_mode: SyncMode::from_env_value(
                &env::var("GOOGLE_SYNC_MODE").unwrap_or_else(|_| "tasks".to_string()),
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_google_sync_configured(&self) -> bool {
        !self.google_client_id.is_empty() && !self.google_client_secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_defaults_to_tasks() {
        assert_eq!(SyncMode::from_env_value(""), SyncMode::Tasks);
        assert_eq!(SyncMode::from_env_value("tasks"), SyncMode::Tasks);
        assert_eq!(SyncMode::from_env_value("nonsense"), SyncMode::Tasks);
    }

    #[test]
    fn sync_mode_accepts_calendar_spellings() {
        assert_eq!(SyncMode::from_env_value("calendar"), SyncMode::Calendar);
        assert_eq!(SyncMode::from_env_value("Calendar"), SyncMode::Calendar);
        assert_eq!(SyncMode::from_env_value("events"), SyncMode::Calendar);
    }
}
