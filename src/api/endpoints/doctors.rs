//! Doctor endpoints, including the availability probe.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use ulid::Ulid;

use crate::api::error::ApiError;
use crate::api::types::*;
use crate::model::{Doctor, Page, Span};

/// `GET /api/doctors`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Page<Doctor>>, ApiError> {
    let Query(query) = query?;
    let (page, limit) = page_params(query.page, query.limit);
    let doctors = ctx.engine.list_doctors().await;
    Ok(Json(Page::paginate(doctors, page, limit)))
}

/// `POST /api/doctors`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<DoctorRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Doctor>), ApiError> {
    let Json(req) = body?;
    let doctor = ctx
        .engine
        .register_doctor(Ulid::new(), req.name, req.specialty)
        .await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

/// `GET /api/doctors/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<Doctor>, ApiError> {
    let Path(id) = path?;
    ctx.engine
        .get_doctor(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("doctor {id} not found")))
}

/// `PUT /api/doctors/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<DoctorRequest>, JsonRejection>,
) -> Result<Json<Doctor>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let doctor = ctx.engine.update_doctor(id, req.name, req.specialty).await?;
    Ok(Json(doctor))
}

/// `DELETE /api/doctors/:id`: refused while the doctor has active appointments.
pub async fn remove(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    ctx.engine.remove_doctor(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/doctors/:id/availability?startTime=..&durationMinutes=..&excludeAppointmentId=..`
pub async fn availability(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let Path(doctor_id) = path?;
    let Query(q) = query?;
    let start = to_ms(q.start_time);
    let available = ctx
        .engine
        .is_doctor_available(doctor_id, start, q.duration_minutes, q.exclude_appointment_id)
        .await?;
    let slot = Span::from_minutes(start, q.duration_minutes);
    Ok(Json(AvailabilityResponse {
        doctor_id,
        start_time: q.start_time,
        end_time: from_ms(slot.end),
        duration_minutes: q.duration_minutes,
        available,
    }))
}
