use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub doctors: usize,
    pub patients: usize,
}

/// `GET /api/health`: liveness probe, no auth.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        doctors: ctx.engine.doctor_count(),
        patients: ctx.engine.patient_count(),
    })
}
