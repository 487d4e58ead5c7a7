use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

/// Thin authenticated wrapper over the Supabase REST surface. The sync
/// cell only touches the narrow slice it owns: appointment reads, the
/// provider-linkage patch, and doctor/patient lookups.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, returning: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if returning {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
            );
        }

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        let returning = matches!(method, Method::POST | Method::PATCH);
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token, returning);

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Fetch a single appointment row, or None when the id is unknown.
    pub async fn get_appointment(&self, appointment_id: &str, auth_token: Option<&str>) -> Result<Option<Value>> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.request(Method::GET, &path, auth_token, None).await?;
        Ok(rows.into_iter().next())
    }

    /// Patch a subset of appointment fields (last-write-wins). The sync
    /// cell only ever writes provider linkage and the denormalized
    /// patient name through this.
    pub async fn update_appointment(&self, appointment_id: &str, patch: Value, auth_token: Option<&str>) -> Result<()> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _rows: Vec<Value> = self.request(Method::PATCH, &path, auth_token, Some(patch)).await?;
        Ok(())
    }

    /// All appointments for a doctor, optionally excluding cancelled ones
    /// (bulk sync operates on the non-cancelled scope).
    pub async fn get_doctor_appointments(&self, doctor_id: &str, include_cancelled: bool, auth_token: Option<&str>) -> Result<Vec<Value>> {
        let mut path = format!("/rest/v1/appointments?doctor_id=eq.{}", doctor_id);
        if !include_cancelled {
            path.push_str("&cancelled=eq.false");
        }
        self.request(Method::GET, &path, auth_token, None).await
    }

    /// The doctor's stored Google refresh token, or None when the doctor
    /// never connected an account.
    pub async fn get_doctor_credential(&self, doctor_id: &str, auth_token: Option<&str>) -> Result<Option<String>> {
        let path = format!("/rest/v1/doctor_calendar_credentials?doctor_id=eq.{}", doctor_id);
        let rows: Vec<Value> = self.request(Method::GET, &path, auth_token, None).await?;
        Ok(rows.into_iter().next().and_then(|row| {
            row.get("refresh_token")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        }))
    }

    pub async fn get_doctor_name(&self, doctor_id: &str, auth_token: Option<&str>) -> Result<Option<String>> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=name", doctor_id);
        let rows: Vec<Value> = self.request(Method::GET, &path, auth_token, None).await?;
        Ok(rows.into_iter().next().and_then(|row| {
            row.get("name").and_then(|v| v.as_str()).map(|s| s.to_string())
        }))
    }

    pub async fn get_patient_name(&self, patient_id: &str, auth_token: Option<&str>) -> Result<Option<String>> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=name", patient_id);
        let rows: Vec<Value> = self.request(Method::GET, &path, auth_token, None).await?;
        Ok(rows.into_iter().next().and_then(|row| {
            row.get("name").and_then(|v| v.as_str()).map(|s| s.to_string())
        }))
    }

    /// Clear both provider id fields on every appointment of a doctor.
    /// Used after an account purge so stale references do not linger.
    pub async fn clear_provider_links(&self, doctor_id: &str, auth_token: Option<&str>) -> Result<()> {
        let path = format!("/rest/v1/appointments?doctor_id=eq.{}", doctor_id);
        let patch = json!({ "provider_task_id": null, "provider_event_id": null });
        let _rows: Vec<Value> = self.request(Method::PATCH, &path, auth_token, Some(patch)).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
