use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, SyncMode};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub sync_mode: SyncMode,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            sync_mode: SyncMode::Tasks,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            google_client_id: "test-client-id".to_string(),
            google_client_secret: "test-client-secret".to_string(),
            google_oauth_base_url: "http://localhost:59991".to_string(),
            google_tasks_base_url: "http://localhost:59992".to_string(),
            google_calendar_base_url: "http://localhost:59993".to_string(),
            google_timeout_secs: 5,
            sync_mode: self.sync_mode,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "doctor".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned Supabase rows for the tables the sync cell touches.
pub struct MockSupabaseRows;

impl MockSupabaseRows {
    pub fn appointment(
        id: &str,
        doctor_id: &str,
        patient_id: &str,
        patient_name: &str,
        slot_date: &str,
        slot_time: &str,
    ) -> Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "patient_name": patient_name,
            "slot_date": slot_date,
            "slot_time": slot_time,
            "cancelled": false,
            "is_completed": false,
            "provider_task_id": null,
            "provider_event_id": null
        })
    }

    pub fn doctor(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name
        })
    }

    pub fn patient(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name
        })
    }

    pub fn credential(doctor_id: &str, refresh_token: &str) -> Value {
        json!({
            "doctor_id": doctor_id,
            "refresh_token": refresh_token
        })
    }
}

/// Canned Google API payloads (OAuth token endpoint, Tasks, Calendar).
pub struct MockGoogleResponses;

impl MockGoogleResponses {
    pub fn token_response(access_token: &str) -> Value {
        json!({
            "access_token": access_token,
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "https://www.googleapis.com/auth/tasks https://www.googleapis.com/auth/calendar"
        })
    }

    pub fn task(id: &str, title: &str, notes: &str, due_rfc3339: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "notes": notes,
            "due": due_rfc3339,
            "status": "needsAction"
        })
    }

    pub fn task_list(items: Vec<Value>) -> Value {
        json!({ "items": items })
    }

    pub fn event(id: &str, summary: &str, description: &str, start_rfc3339: &str, end_rfc3339: &str) -> Value {
        json!({
            "id": id,
            "summary": summary,
            "description": description,
            "start": { "dateTime": start_rfc3339 },
            "end": { "dateTime": end_rfc3339 }
        })
    }

    pub fn event_list(items: Vec<Value>) -> Value {
        json!({ "items": items })
    }
}
