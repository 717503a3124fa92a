use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ulid::Ulid;

use crate::api::error::ApiError;
use crate::api::types::*;

/// `GET /api/patients/:id/treatments`: most recent first.
pub async fn list(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<Vec<TreatmentView>>, ApiError> {
    let Path(patient_id) = path?;
    let log = ctx.engine.list_treatments(patient_id)?;
    Ok(Json(log.into_iter().map(TreatmentView::from).collect()))
}

/// `POST /api/patients/:id/treatments`
pub async fn create(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<TreatmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TreatmentView>), ApiError> {
    let Path(patient_id) = path?;
    let Json(req) = body?;
    let treatment = ctx
        .engine
        .log_treatment(req.into_treatment(Ulid::new(), patient_id))
        .await?;
    Ok((StatusCode::CREATED, Json(treatment.into())))
}

/// `DELETE /api/treatments/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    ctx.engine.remove_treatment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
