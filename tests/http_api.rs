use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use clinicd::api::{ApiContext, build_router};
use clinicd::engine::Engine;

const TOKEN: &str = "integration-token";

// ── Test infrastructure ──────────────────────────────────────

struct TestApp {
    router: Router,
    engine: Arc<Engine>,
}

impl TestApp {
    fn start() -> Self {
        let dir = std::env::temp_dir().join(format!("clinicd_int_test_{}", Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        let engine = Arc::new(Engine::open(dir.join("clinicd.wal")).unwrap());
        let router = build_router(ApiContext::new(engine.clone(), TOKEN, 64));
        Self { router, engine }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {TOKEN}"));
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    async fn doctor(&self, name: &str) -> String {
        let (status, body) = self.post("/api/doctors", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn patient(&self, name: &str) -> String {
        let (status, body) = self.post("/api/patients", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn book(&self, doctor: &str, patient: &str, start: &str, minutes: u32) -> (StatusCode, Value) {
        self.post(
            "/api/appointments",
            json!({
                "doctorId": doctor,
                "patientId": patient,
                "startTime": start,
                "durationMinutes": minutes,
            }),
        )
        .await
    }
}

// ── Booking ──────────────────────────────────────────────────

#[tokio::test]
async fn booking_returns_201_with_appointment() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;

    let (status, body) = app.book(&d, &p, "2026-01-05T10:00:00Z", 45).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["doctorId"], d);
    assert_eq!(body["startTime"], "2026-01-05T10:00:00Z");
    assert_eq!(body["endTime"], "2026-01-05T10:45:00Z");
    assert_eq!(body["status"], "scheduled");
}

#[tokio::test]
async fn duration_defaults_to_30_minutes() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;

    let (status, body) = app
        .post(
            "/api/appointments",
            json!({ "doctorId": d, "patientId": p, "startTime": "2026-01-05T10:00:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["durationMinutes"], 30);
}

#[tokio::test]
async fn conflicting_booking_returns_400_with_message() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;

    app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let (status, body) = app.book(&d, &p, "2026-01-05T10:15:00Z", 30).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Doctor is not available at this time");
}

#[tokio::test]
async fn offsets_are_compared_as_instants() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;

    app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let (status, _) = app.book(&d, &p, "2026-01-05T12:10:00+02:00", 30).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_doctor_is_404() {
    let app = TestApp::start();
    let p = app.patient("Lina Sorensen").await;

    let (status, body) = app
        .book(&Ulid::new().to_string(), &p, "2026-01-05T10:00:00Z", 30)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_bodies_are_400() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;

    let (status, _) = app
        .post("/api/appointments", json!({ "doctorId": d, "patientId": p }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.book("not-a-ulid", &p, "2026-01-05T10:00:00Z", 30).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.book(&d, &p, "yesterday", 30).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.book(&d, &p, "2026-01-05T10:00:00Z", 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Updates and status ───────────────────────────────────────

#[tokio::test]
async fn update_keeping_own_slot_succeeds() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    let (_, a) = app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let id = a["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/appointments/{id}"),
            Some(json!({ "startTime": "2026-01-05T10:00:00Z", "durationMinutes": 45 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["endTime"], "2026-01-05T10:45:00Z");
}

#[tokio::test]
async fn update_into_taken_slot_returns_400() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let (_, later) = app.book(&d, &p, "2026-01-05T11:00:00Z", 30).await;
    let id = later["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/appointments/{id}"),
            Some(json!({ "startTime": "2026-01-05T10:20:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Doctor is not available at this time");
}

#[tokio::test]
async fn cancelling_frees_the_slot() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    let (_, a) = app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let id = a["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/appointments/{id}/status"),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn delete_appointment_returns_204_then_404() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    let (_, a) = app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let uri = format!("/api/appointments/{}", a["id"].as_str().unwrap());

    let (status, _) = app.call(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Availability probe ───────────────────────────────────────

#[tokio::test]
async fn availability_probe_reports_conflicts_and_exclusion() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    let (_, a) = app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let id = a["id"].as_str().unwrap();

    let base = format!("/api/doctors/{d}/availability?startTime=2026-01-05T10:00:00Z&durationMinutes=30");
    let (status, body) = app.get(&base).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    let (_, body) = app.get(&format!("{base}&excludeAppointmentId={id}")).await;
    assert_eq!(body["available"], true);

    let (_, body) = app
        .get(&format!("/api/doctors/{d}/availability?startTime=2026-01-05T10:30:00Z"))
        .await;
    assert_eq!(body["available"], true);
    assert_eq!(body["endTime"], "2026-01-05T11:00:00Z");
}

#[tokio::test]
async fn availability_for_unknown_doctor_is_404() {
    let app = TestApp::start();
    let (status, _) = app
        .get(&format!(
            "/api/doctors/{}/availability?startTime=2026-01-05T10:00:00Z",
            Ulid::new()
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Listing ──────────────────────────────────────────────────

#[tokio::test]
async fn appointment_list_is_paginated_and_filtered() {
    let app = TestApp::start();
    let d1 = app.doctor("Dr. Haddad").await;
    let d2 = app.doctor("Dr. Okafor").await;
    let p = app.patient("Lina Sorensen").await;
    for hour in 8..20 {
        let (status, _) = app
            .book(&d1, &p, &format!("2026-01-05T{hour:02}:00:00Z"), 30)
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    app.book(&d2, &p, "2026-01-05T08:00:00Z", 30).await;

    let (status, body) = app.get("/api/appointments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 13);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 10);

    let (_, body) = app
        .get(&format!("/api/appointments?doctorId={d1}&page=2&limit=5"))
        .await;
    assert_eq!(body["total"], 12);
    assert_eq!(body["items"][0]["startTime"], "2026-01-05T13:00:00Z");

    let (_, body) = app
        .get("/api/appointments?from=2026-01-05T18:00:00Z&to=2026-01-05T23:00:00Z")
        .await;
    assert_eq!(body["total"], 2);

    let (status, _) = app.get("/api/appointments?status=unknown").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patient_search_and_treatments() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    app.patient("Ada Okoro").await;

    let (_, body) = app.get("/api/patients?name=sor").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["name"], "Lina Sorensen");

    let (status, t) = app
        .post(
            &format!("/api/patients/{p}/treatments"),
            json!({
                "doctorId": d,
                "description": "composite filling",
                "tooth": "36",
                "costCents": 12000,
                "performedAt": "2026-01-05T10:30:00Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{t}");
    assert_eq!(t["performedAt"], "2026-01-05T10:30:00Z");

    let (_, log) = app.get(&format!("/api/patients/{p}/treatments")).await;
    assert_eq!(log.as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/treatments/{}", t["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, log) = app.get(&format!("/api/patients/{p}/treatments")).await;
    assert!(log.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn treatment_at_unix_epoch_is_kept() {
    let app = TestApp::start();
    let p = app.patient("Lina Sorensen").await;
    let (status, t) = app
        .post(
            &format!("/api/patients/{p}/treatments"),
            json!({
                "description": "x-ray",
                "performedAt": "1970-01-01T00:00:00Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{t}");
    assert_eq!(t["performedAt"], "1970-01-01T00:00:00Z");
}

// ── Doctors and patients ─────────────────────────────────────

#[tokio::test]
async fn doctor_lifecycle() {
    let app = TestApp::start();
    let d = app.doctor("Dr. Haddad").await;
    let p = app.patient("Lina Sorensen").await;
    let uri = format!("/api/doctors/{d}");

    let (status, body) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "name": "Dr. Haddad", "specialty": "endodontics" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["specialty"], "endodontics");

    let (_, a) = app.book(&d, &p, "2026-01-05T10:00:00Z", 30).await;
    let (status, body) = app.call(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "IN_USE");

    app.call(
        Method::PATCH,
        &format!("/api/appointments/{}/status", a["id"].as_str().unwrap()),
        Some(json!({ "status": "completed" })),
    )
    .await;
    let (status, _) = app.call(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_doctor_name_is_400() {
    let app = TestApp::start();
    let (status, body) = app.post("/api/doctors", json!({ "name": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn health_reports_counts() {
    let app = TestApp::start();
    app.doctor("Dr. Haddad").await;
    app.patient("Lina Sorensen").await;

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctors"], 1);
    assert_eq!(body["patients"], 1);
}

// ── Durability ───────────────────────────────────────────────

#[tokio::test]
async fn closed_engine_returns_500() {
    let app = TestApp::start();
    app.engine.close().await.unwrap();

    let (status, body) = app.post("/api/doctors", json!({ "name": "Dr. Haddad" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "An internal error occurred");
}
