//! Appointment endpoints.
//!
//! Create and update are the two call sites of the availability check; both
//! answer `400 {"message": "Doctor is not available at this time"}` when the
//! doctor's calendar is taken.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use ulid::Ulid;

use crate::api::error::ApiError;
use crate::api::types::*;
use crate::model::Page;

/// `GET /api/appointments`: filters: doctorId, patientId, status, from, to.
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<AppointmentListQuery>, QueryRejection>,
) -> Result<Json<Page<AppointmentView>>, ApiError> {
    let Query(query) = query?;
    let (page, limit) = page_params(query.page, query.limit);
    let appointments = ctx.engine.list_appointments(&query.filter()).await?;
    Ok(Json(
        Page::paginate(appointments, page, limit).map(AppointmentView::from),
    ))
}

/// `POST /api/appointments`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AppointmentView>), ApiError> {
    let Json(req) = body?;
    let appointment = ctx
        .engine
        .book_appointment(req.into_appointment(Ulid::new()))
        .await?;
    Ok((StatusCode::CREATED, Json(appointment.into())))
}

/// `GET /api/appointments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<AppointmentView>, ApiError> {
    let Path(id) = path?;
    ctx.engine
        .get_appointment(id)
        .await
        .map(|a| Json(a.into()))
        .ok_or_else(|| ApiError::NotFound(format!("appointment {id} not found")))
}

/// `PUT /api/appointments/:id`: partial update; re-checks the slot when it moves.
pub async fn update(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<UpdateAppointmentRequest>, JsonRejection>,
) -> Result<Json<AppointmentView>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let appointment = ctx.engine.update_appointment(id, req.into()).await?;
    Ok(Json(appointment.into()))
}

/// `PATCH /api/appointments/:id/status`
pub async fn set_status(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<AppointmentView>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let appointment = ctx.engine.set_appointment_status(id, req.status).await?;
    Ok(Json(appointment.into()))
}

/// `DELETE /api/appointments/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    ctx.engine.delete_appointment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
