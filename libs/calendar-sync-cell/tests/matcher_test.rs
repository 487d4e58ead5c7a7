use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calendar_sync_cell::models::Appointment;
use calendar_sync_cell::services::google::GoogleSyncClient;
use calendar_sync_cell::services::matcher::ItemMatcher;
use shared_config::{AppConfig, SyncMode};
use shared_utils::test_utils::{MockGoogleResponses, TestConfig};

const TASKS_PATH: &str = "/tasks/v1/lists/@default/tasks";
const EVENTS_PATH: &str = "/calendar/v3/calendars/primary/events";

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.google_oauth_base_url = mock_server.uri();
    config.google_tasks_base_url = mock_server.uri();
    config.google_calendar_base_url = mock_server.uri();
    config
}

async fn connect(mock_server: &MockServer) -> GoogleSyncClient {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(MockGoogleResponses::token_response("access-token-1")),
        )
        .mount(mock_server)
        .await;

    GoogleSyncClient::connect(&mock_config(mock_server), "refresh-token-1")
        .await
        .expect("token exchange should succeed")
}

fn appointment(task_id: Option<&str>, event_id: Option<&str>) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        patient_name: Some("Jane Doe".to_string()),
        slot_date: "2025-03-14".to_string(),
        slot_time: "10:00 AM".to_string(),
        cancelled: false,
        is_completed: false,
        provider_task_id: task_id.map(|s| s.to_string()),
        provider_event_id: event_id.map(|s| s.to_string()),
    }
}

#[tokio::test]
async fn stored_task_id_resolves_directly() {
    let mock_server = MockServer::start().await;
    let google = connect(&mock_server).await;
    let apt = appointment(Some("task-1"), None);
    let slot = apt.scheduled_instant().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("{}/task-1", TASKS_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockGoogleResponses::task(
            "task-1",
            "whatever",
            "whatever",
            "2025-03-14T10:00:00Z",
        )))
        .mount(&mock_server)
        .await;

    let outcome = ItemMatcher::new(&google)
        .find(&apt, slot, SyncMode::Tasks)
        .await
        .unwrap();
    assert_eq!(outcome.item_id.as_deref(), Some("task-1"));
    assert!(outcome.stale_id.is_none());
}

#[tokio::test]
async fn marker_match_is_authoritative() {
    let mock_server = MockServer::start().await;
    let google = connect(&mock_server).await;
    let apt = appointment(None, None);
    let slot = apt.scheduled_instant().unwrap();
    let marker = format!("APT_ID:{}", apt.id);

    // A heuristic-plausible decoy sits before the marker item in
    // enumeration order; the marker still wins.
    Mock::given(method("GET"))
        .and(path(TASKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockGoogleResponses::task_list(vec![
            MockGoogleResponses::task(
                "task-decoy",
                "10:00 AM - Appointment with Jane Doe ⏳ PENDING",
                "no marker here",
                "2025-03-14T10:02:00Z",
            ),
            MockGoogleResponses::task(
                "task-marked",
                "some ancient title",
                &format!("Doctor: Dr. Test\n{}", marker),
                "2025-03-14T09:00:00Z",
            ),
        ])))
        .mount(&mock_server)
        .await;

    let outcome = ItemMatcher::new(&google)
        .find(&apt, slot, SyncMode::Tasks)
        .await
        .unwrap();
    assert_eq!(outcome.item_id.as_deref(), Some("task-marked"));
}

#[tokio::test]
async fn heuristic_takes_first_in_window_title_match() {
    let mock_server = MockServer::start().await;
    let google = connect(&mock_server).await;
    let apt = appointment(None, None);
    let slot = apt.scheduled_instant().unwrap();

    Mock::given(method("GET"))
        .and(path(TASKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockGoogleResponses::task_list(vec![
            // Outside the ±5 minute window
            MockGoogleResponses::task(
                "task-far",
                "9:00 AM - Appointment with Jane Doe ⏳ PENDING",
                "notes",
                "2025-03-14T09:00:00Z",
            ),
            // Wrong patient
            MockGoogleResponses::task(
                "task-other",
                "10:00 AM - Appointment with John Roe ⏳ PENDING",
                "notes",
                "2025-03-14T10:00:00Z",
            ),
            // In window, right title fragment
            MockGoogleResponses::task(
                "task-near",
                "10:00 AM - Appointment with Jane Doe ⏳ PENDING",
                "notes",
                "2025-03-14T10:03:00Z",
            ),
        ])))
        .mount(&mock_server)
        .await;

    let outcome = ItemMatcher::new(&google)
        .find(&apt, slot, SyncMode::Tasks)
        .await
        .unwrap();
    assert_eq!(outcome.item_id.as_deref(), Some("task-near"));
}

#[tokio::test]
async fn stale_stored_id_is_reported_and_search_continues() {
    let mock_server = MockServer::start().await;
    let google = connect(&mock_server).await;
    let apt = appointment(Some("ghost"), None);
    let slot = apt.scheduled_instant().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("{}/ghost", TASKS_PATH)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Not Found" })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(TASKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockGoogleResponses::task_list(vec![])))
        .mount(&mock_server)
        .await;

    let outcome = ItemMatcher::new(&google)
        .find(&apt, slot, SyncMode::Tasks)
        .await
        .unwrap();
    assert!(outcome.item_id.is_none());
    assert_eq!(outcome.stale_id.as_deref(), Some("ghost"));
}

#[tokio::test]
async fn event_surface_matches_by_marker_in_description() {
    let mock_server = MockServer::start().await;
    let google = connect(&mock_server).await;
    let apt = appointment(None, None);
    let slot = apt.scheduled_instant().unwrap();
    let marker = format!("APT_ID:{}", apt.id);

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockGoogleResponses::event_list(vec![
            MockGoogleResponses::event(
                "evt-other",
                "Team standup",
                "not ours",
                "2025-03-14T09:00:00Z",
                "2025-03-14T09:30:00Z",
            ),
            MockGoogleResponses::event(
                "evt-ours",
                "10:00 AM - Appointment with Jane Doe ⏳ PENDING",
                &format!("Doctor: Dr. Test\n{}", marker),
                "2025-03-14T10:00:00Z",
                "2025-03-14T10:05:00Z",
            ),
        ])))
        .mount(&mock_server)
        .await;

    let outcome = ItemMatcher::new(&google)
        .find(&apt, slot, SyncMode::Calendar)
        .await
        .unwrap();
    assert_eq!(outcome.item_id.as_deref(), Some("evt-ours"));
}

#[tokio::test]
async fn no_match_means_create() {
    let mock_server = MockServer::start().await;
    let google = connect(&mock_server).await;
    let apt = appointment(None, None);
    let slot = apt.scheduled_instant().unwrap();

    Mock::given(method("GET"))
        .and(path(TASKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockGoogleResponses::task_list(vec![
            MockGoogleResponses::task("task-foreign", "Buy milk", "errand", "2025-03-14T10:00:00Z"),
        ])))
        .mount(&mock_server)
        .await;

    let outcome = ItemMatcher::new(&google)
        .find(&apt, slot, SyncMode::Tasks)
        .await
        .unwrap();
    assert!(outcome.item_id.is_none());
    assert!(outcome.stale_id.is_none());
}
