//! Patient endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use ulid::Ulid;

use crate::api::error::ApiError;
use crate::api::types::*;
use crate::model::{Page, Patient};

/// `GET /api/patients?name=..`: optional case-insensitive name search.
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<PatientListQuery>, QueryRejection>,
) -> Result<Json<Page<Patient>>, ApiError> {
    let Query(query) = query?;
    let (page, limit) = page_params(query.page, query.limit);
    let patients = ctx.engine.list_patients(query.name.as_deref());
    Ok(Json(Page::paginate(patients, page, limit)))
}

/// `POST /api/patients`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<PatientRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let Json(req) = body?;
    let patient = ctx
        .engine
        .register_patient(req.into_patient(Ulid::new()))
        .await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = path?;
    ctx.engine
        .get_patient(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("patient {id} not found")))
}

/// `PUT /api/patients/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<PatientRequest>, JsonRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let patient = ctx.engine.update_patient(req.into_patient(id)).await?;
    Ok(Json(patient))
}

/// `DELETE /api/patients/:id`: also drops the treatment log.
pub async fn remove(
    State(ctx): State<ApiContext>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    ctx.engine.remove_patient(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
