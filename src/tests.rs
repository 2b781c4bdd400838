//! Integration tests for the tutoring backend.

use std::sync::Arc;

use futures_util::future::join_all;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::ws::DeliveryChannel;
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));
        let channel = Arc::new(DeliveryChannel::new());

        // Create config
        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let state = AppState {
            repo,
            channel,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create_tag(&self, name: &str) -> i64 {
        let resp = self
            .client
            .post(self.url("/api/tags"))
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_i64().unwrap()
    }

    async fn create_tutor(&self, uid: i64) -> i64 {
        let resp = self
            .client
            .post(self.url("/api/tutors"))
            .json(&json!({ "uid": uid }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_i64().unwrap()
    }

    async fn set_tutor_tags(&self, tutor_id: i64, tag_ids: &[i64]) {
        let resp = self
            .client
            .put(self.url(&format!("/api/tutors/{}/tags", tutor_id)))
            .json(&json!({ "tagIds": tag_ids }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    async fn add_slot(&self, tutor_id: i64, day: &str, start_time: i64, end_time: i64) -> Value {
        let resp = self
            .client
            .post(self.url(&format!("/api/tutors/{}/availability", tutor_id)))
            .json(&json!({ "day": day, "startTime": start_time, "endTime": end_time }))
            .send()
            .await
            .unwrap();
        resp.json().await.unwrap()
    }

    /// Register a tutor offering one subject with one weekly slot. Returns
    /// (tutor id, tag id).
    async fn setup_tutor(
        &self,
        tutor_uid: i64,
        tag_name: &str,
        day: &str,
        start_time: i64,
        end_time: i64,
    ) -> (i64, i64) {
        let tag_id = self.create_tag(tag_name).await;
        let tutor_id = self.create_tutor(tutor_uid).await;
        self.set_tutor_tags(tutor_id, &[tag_id]).await;

        let resp = self
            .client
            .put(self.url(&format!("/api/tutors/{}/availability", tutor_id)))
            .json(&json!({
                "slots": [{ "day": day, "startTime": start_time, "endTime": end_time }]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        (tutor_id, tag_id)
    }

    async fn book(
        &self,
        student_uid: i64,
        tutor_id: i64,
        tag_id: i64,
        day: &str,
        time: i64,
    ) -> reqwest::Response {
        self.client
            .post(self.url("/api/bookings"))
            .json(&json!({
                "studentUid": student_uid,
                "tutorId": tutor_id,
                "tagId": tag_id,
                "day": day,
                "time": time
            }))
            .send()
            .await
            .unwrap()
    }

    async fn send_message(&self, sender_uid: i64, receiver_uid: i64, content: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/messages"))
            .json(&json!({
                "senderUid": sender_uid,
                "receiverUid": receiver_uid,
                "content": content
            }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::with_psk(Some("secret-key".to_string())).await;

    // Request without API key
    let client = Client::new();
    let resp = client
        .get(fixture.url("/api/tags"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Request with wrong API key
    let resp = client
        .get(fixture.url("/api/tags"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_valid_psk() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/tags"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_tutor_registration_and_tags() {
    let fixture = TestFixture::new().await;

    let algebra = fixture.create_tag("Algebra").await;
    let physics = fixture.create_tag("Physics").await;
    let tutor_id = fixture.create_tutor(42).await;
    fixture.set_tutor_tags(tutor_id, &[physics, algebra]).await;

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/tutors/{}", tutor_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["uid"], 42);
    let tags = body["data"]["tags"].as_array().unwrap();
    assert_eq!(tags.len(), 2);
    // Ordered by name
    assert_eq!(tags[0]["name"], "Algebra");
    assert_eq!(tags[1]["name"], "Physics");

    // Registering the same user twice is rejected
    let resp = fixture
        .client
        .post(fixture.url("/api/tutors"))
        .json(&json!({ "uid": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Unknown tutor is a 404
    let resp = fixture
        .client
        .get(fixture.url("/api/tutors/9999"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_set_and_list_slots() {
    let fixture = TestFixture::new().await;
    let tutor_id = fixture.create_tutor(10).await;

    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/tutors/{}/availability", tutor_id)))
        .json(&json!({
            "slots": [
                { "day": "Tuesday", "startTime": 14, "endTime": 16 },
                { "day": "Monday", "startTime": 9, "endTime": 11 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let slots = body["data"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    // Ordered by day then start
    assert_eq!(slots[0]["day"], "Monday");
    assert_eq!(slots[1]["day"], "Tuesday");

    // Day filter
    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/tutors/{}/availability?day=Monday",
            tutor_id
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let slots = body["data"].as_array().unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["startTime"], 9);
    assert_eq!(slots[0]["endTime"], 11);
}

#[tokio::test]
async fn test_set_slots_overlap_rejected_keeps_prior_schedule() {
    let fixture = TestFixture::new().await;
    let tutor_id = fixture.create_tutor(10).await;

    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/tutors/{}/availability", tutor_id)))
        .json(&json!({
            "slots": [{ "day": "Monday", "startTime": 9, "endTime": 11 }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Replacement containing two overlapping Monday windows is rejected
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/tutors/{}/availability", tutor_id)))
        .json(&json!({
            "slots": [
                { "day": "Monday", "startTime": 13, "endTime": 15 },
                { "day": "Monday", "startTime": 14, "endTime": 16 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Prior configuration is unchanged
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/tutors/{}/availability", tutor_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let slots = body["data"].as_array().unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["day"], "Monday");
    assert_eq!(slots[0]["startTime"], 9);

    // Inverted window is also a validation error
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/tutors/{}/availability", tutor_id)))
        .json(&json!({
            "slots": [{ "day": "Friday", "startTime": 15, "endTime": 13 }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_add_slot_overlap_conflict() {
    let fixture = TestFixture::new().await;
    let tutor_id = fixture.create_tutor(10).await;

    let body = fixture.add_slot(tutor_id, "Monday", 9, 11).await;
    assert_eq!(body["success"], true);

    // Overlapping insert loses
    let body = fixture.add_slot(tutor_id, "Monday", 10, 12).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SLOT_OVERLAP");

    // Adjacent half-open window is fine
    let body = fixture.add_slot(tutor_id, "Monday", 11, 13).await;
    assert_eq!(body["success"], true);

    // Same window on another day is fine
    let body = fixture.add_slot(tutor_id, "Tuesday", 9, 11).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_remove_slot_idempotent() {
    let fixture = TestFixture::new().await;
    let tutor_id = fixture.create_tutor(10).await;

    let body = fixture.add_slot(tutor_id, "Monday", 9, 11).await;
    let slot_id = body["data"]["id"].as_i64().unwrap();

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/availability/{}", slot_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Removing an already-inactive slot still succeeds
    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/availability/{}", slot_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Unknown slot is a 404
    let resp = fixture
        .client
        .delete(fixture.url("/api/availability/9999"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // The deactivated slot no longer shows up
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/tutors/{}/availability", tutor_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_bookable_times_resolution() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 12).await;

    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/tutors/{}/bookable-times?day=Monday",
            tutor_id
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([9, 10, 11]));

    // Claim the middle hour
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 10).await;
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/tutors/{}/bookable-times?day=Monday",
            tutor_id
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([9, 11]));

    // Membership check agrees
    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/tutors/{}/bookable?day=Monday&time=10",
            tutor_id
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], false);

    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/tutors/{}/bookable?day=Monday&time=9",
            tutor_id
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], true);

    // A day with no slots resolves to nothing
    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/tutors/{}/bookable-times?day=Friday",
            tutor_id
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_booking_conflict_and_key_reuse() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;

    // Student S books Monday 9:00
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let booking_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["studentUid"], 20);
    assert!(body["data"].get("startedAt").is_none());

    // Student S2 asks for the identical key and loses
    let resp = fixture.book(21, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SLOT_UNAVAILABLE");

    // S's session runs and concludes
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/start", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/conclude", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["concludedAt"].is_string());

    // The key is immediately reusable: S2's retry commits
    let resp = fixture.book(21, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["studentUid"], 21);
}

#[tokio::test]
async fn test_booking_validation_errors() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;
    let other_tag = fixture.create_tag("Chemistry").await;

    // Tutor booking themselves
    let resp = fixture.book(10, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SELF_BOOKING");

    // Subject the tutor does not offer
    let resp = fixture.book(20, tutor_id, other_tag, "Monday", 9).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "TAG_MISMATCH");

    // Outside any slot
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 15).await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SLOT_UNAVAILABLE");

    // Right day, wrong weekday
    let resp = fixture.book(20, tutor_id, tag_id, "Tuesday", 9).await;
    assert_eq!(resp.status(), 409);

    // Unknown tutor
    let resp = fixture.book(20, 9999, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 404);

    // Out-of-range hour
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 24).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_booking_lifecycle_order() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;

    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 9).await;
    let body: Value = resp.json().await.unwrap();
    let booking_id = body["data"]["id"].as_i64().unwrap();

    // Conclude before start is a lifecycle violation
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/conclude", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_STARTED");

    // Start once
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/start", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["startedAt"].is_string());

    // Starting again conflicts
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/start", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "ALREADY_STARTED");

    // Conclude, then conclude again: idempotent
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/conclude", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let first: Value = resp.json().await.unwrap();

    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/bookings/{}/conclude", booking_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let second: Value = resp.json().await.unwrap();
    assert_eq!(first["data"]["concludedAt"], second["data"]["concludedAt"]);

    // Lifecycle ops on unknown bookings are 404s
    let resp = fixture
        .client
        .put(fixture.url("/api/bookings/9999/start"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_concurrent_bookings_single_winner() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;

    // N students race for the identical (tutor, day, time) key
    let requests = (0..8i64).map(|i| fixture.book(100 + i, tutor_id, tag_id, "Monday", 9));
    let responses = join_all(requests).await;

    let mut committed = 0;
    let mut conflicts = 0;
    for resp in responses {
        match resp.status().as_u16() {
            200 => committed += 1,
            409 => {
                let body: Value = resp.json().await.unwrap();
                assert_eq!(body["error"]["code"], "SLOT_UNAVAILABLE");
                conflicts += 1;
            }
            status => panic!("Unexpected status {}", status),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(conflicts, 7);

    // Exactly one active booking holds the key
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/tutors/{}/bookings", tutor_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_booking_listings() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 12).await;

    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 10).await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.book(21, tutor_id, tag_id, "Monday", 11).await;
    assert_eq!(resp.status(), 200);

    // Student view, newest first
    let resp = fixture
        .client
        .get(fixture.url("/api/users/20/bookings"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let bookings = body["data"].as_array().unwrap();
    assert_eq!(bookings.len(), 2);
    assert_eq!(bookings[0]["time"], 10);
    assert_eq!(bookings[1]["time"], 9);

    // Tutor view sees all three
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/tutors/{}/bookings", tutor_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    // Fetch one by id
    let id = body["data"][0]["id"].as_i64().unwrap();
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/bookings/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_messaging_permission_gate() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;

    // No shared booking yet
    let resp = fixture
        .client
        .get(fixture.url("/api/messages/can-message/20/10"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["allowed"], false);

    let resp = fixture.send_message(20, 10, "hi").await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    // A booking linking student 20 to the tutor owned by user 10 opens the gate
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 200);

    // Symmetric in both orientations
    for (a, b) in [(20, 10), (10, 20)] {
        let resp = fixture
            .client
            .get(fixture.url(&format!("/api/messages/can-message/{}/{}", a, b)))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["allowed"], true);
    }

    // The identical send now succeeds
    let resp = fixture.send_message(20, 10, "hi").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["content"], "hi");

    // And the conversation contains exactly that one message
    let resp = fixture
        .client
        .get(fixture.url("/api/messages/20/10?limit=10&offset=0"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let messages = body["data"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hi");

    // Empty content is rejected after the gate opens
    let resp = fixture.send_message(20, 10, "   ").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Unrelated users remain gated
    let resp = fixture.send_message(20, 99, "hello stranger").await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_conversation_ordering_and_pagination() {
    let fixture = TestFixture::new().await;
    let (tutor_id, tag_id) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;
    let resp = fixture.book(20, tutor_id, tag_id, "Monday", 9).await;
    assert_eq!(resp.status(), 200);

    // Alternating directions
    for i in 0..6 {
        let (sender, receiver) = if i % 2 == 0 { (20, 10) } else { (10, 20) };
        let resp = fixture
            .send_message(sender, receiver, &format!("message {}", i))
            .await;
        assert_eq!(resp.status(), 200);
    }

    // Full fetch is oldest-first with non-decreasing (timestamp, id)
    let resp = fixture
        .client
        .get(fixture.url("/api/messages/20/10?limit=50&offset=0"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let full: Vec<Value> = body["data"].as_array().unwrap().clone();
    assert_eq!(full.len(), 6);
    for pair in full.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let key_a = (a["timestamp"].as_str().unwrap(), a["id"].as_i64().unwrap());
        let key_b = (b["timestamp"].as_str().unwrap(), b["id"].as_i64().unwrap());
        assert!(key_a <= key_b);
    }
    for (i, message) in full.iter().enumerate() {
        assert_eq!(message["content"], format!("message {}", i));
    }

    // Concatenated pages reproduce the full ledger with no gaps or duplicates
    let mut paged: Vec<Value> = Vec::new();
    for offset in (0..6).step_by(2) {
        let resp = fixture
            .client
            .get(fixture.url(&format!("/api/messages/20/10?limit=2&offset={}", offset)))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        paged.extend(body["data"].as_array().unwrap().clone());
    }
    assert_eq!(paged, full);

    // The pair order in the path does not matter
    let resp = fixture
        .client
        .get(fixture.url("/api/messages/10/20?limit=50&offset=0"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().clone(), full);
}

#[tokio::test]
async fn test_recent_conversations() {
    let fixture = TestFixture::new().await;

    // Student 20 books with two different tutors
    let (tutor_a, tag_a) = fixture.setup_tutor(10, "Calculus", "Monday", 9, 11).await;
    let (tutor_b, tag_b) = fixture.setup_tutor(11, "Biology", "Tuesday", 9, 11).await;
    let resp = fixture.book(20, tutor_a, tag_a, "Monday", 9).await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.book(20, tutor_b, tag_b, "Tuesday", 9).await;
    assert_eq!(resp.status(), 200);

    let resp = fixture.send_message(20, 10, "hello calculus").await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.send_message(20, 11, "hello biology").await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.send_message(11, 20, "biology replies").await;
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url("/api/users/20/conversations"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let conversations = body["data"].as_array().unwrap();
    assert_eq!(conversations.len(), 2);

    // Most recent counterpart first, one summary per counterpart
    assert_eq!(conversations[0]["counterpartUid"], 11);
    assert_eq!(conversations[0]["lastMessage"], "biology replies");
    assert_eq!(conversations[1]["counterpartUid"], 10);
    assert_eq!(conversations[1]["lastMessage"], "hello calculus");

    // Limit applies
    let resp = fixture
        .client
        .get(fixture.url("/api/users/20/conversations?limit=1"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
