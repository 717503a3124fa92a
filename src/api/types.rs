//! Shared API context and request/response shapes.
//!
//! Instants cross the wire as RFC 3339 strings and are held as Unix
//! milliseconds inside the engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use ulid::Ulid;

use crate::engine::{AppointmentChanges, AppointmentFilter, Engine, NewTreatment};
use crate::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::*;

/// Default appointment length when the request omits it.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

fn default_duration() -> u32 {
    DEFAULT_DURATION_MINUTES
}

/// State shared by handlers (`State`) and middleware (`Extension`).
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<Engine>,
    pub api_token: Arc<str>,
    pub in_flight: Arc<Semaphore>,
}

impl ApiContext {
    pub fn new(engine: Arc<Engine>, api_token: &str, max_in_flight: usize) -> Self {
        Self {
            engine,
            api_token: Arc::from(api_token),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
        }
    }
}

pub fn to_ms(t: DateTime<Utc>) -> Ms {
    t.timestamp_millis()
}

pub fn from_ms(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════
// Pagination
// ═══════════════════════════════════════════════════════════

/// Resolve optional `page`/`limit` query values. Pages are 1-based; the limit
/// is capped at `MAX_PAGE_SIZE`.
pub fn page_params(page: Option<usize>, limit: Option<usize>) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════
// Doctors and patients
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorRequest {
    pub name: String,
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRequest {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<String>,
}

impl PatientRequest {
    pub fn into_patient(self, id: Ulid) -> Patient {
        Patient {
            id,
            name: self.name,
            phone: self.phone,
            email: self.email,
            birth_date: self.birth_date,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientListQuery {
    pub name: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════
// Availability
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    pub exclude_appointment_id: Option<Ulid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub doctor_id: Ulid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub available: bool,
}

// ═══════════════════════════════════════════════════════════
// Appointments
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn into_appointment(self, id: Ulid) -> Appointment {
        Appointment {
            id,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            start: to_ms(self.start_time),
            duration_minutes: self.duration_minutes,
            status: self.status,
            reason: self.reason,
            notes: self.notes,
        }
    }
}

/// Partial update: absent fields stay as they are.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    pub doctor_id: Option<Ulid>,
    pub patient_id: Option<Ulid>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub status: Option<AppointmentStatus>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl From<UpdateAppointmentRequest> for AppointmentChanges {
    fn from(req: UpdateAppointmentRequest) -> Self {
        AppointmentChanges {
            doctor_id: req.doctor_id,
            patient_id: req.patient_id,
            start: req.start_time.map(to_ms),
            duration_minutes: req.duration_minutes,
            status: req.status,
            reason: req.reason,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListQuery {
    pub doctor_id: Option<Ulid>,
    pub patient_id: Option<Ulid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl AppointmentListQuery {
    pub fn filter(&self) -> AppointmentFilter {
        AppointmentFilter {
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            status: self.status,
            from: self.from.map(to_ms),
            to: self.to.map(to_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: Ulid,
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl From<Appointment> for AppointmentView {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            doctor_id: a.doctor_id,
            patient_id: a.patient_id,
            start_time: from_ms(a.start),
            end_time: from_ms(a.end()),
            duration_minutes: a.duration_minutes,
            status: a.status,
            reason: a.reason,
            notes: a.notes,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Treatments
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentRequest {
    pub doctor_id: Option<Ulid>,
    pub appointment_id: Option<Ulid>,
    pub description: String,
    pub tooth: Option<String>,
    pub cost_cents: Option<u64>,
    pub performed_at: Option<DateTime<Utc>>,
}

impl TreatmentRequest {
    /// A missing `performedAt` is stamped with the current time by the engine.
    pub fn into_treatment(self, id: Ulid, patient_id: Ulid) -> NewTreatment {
        NewTreatment {
            id,
            patient_id,
            doctor_id: self.doctor_id,
            appointment_id: self.appointment_id,
            description: self.description,
            tooth: self.tooth,
            cost_cents: self.cost_cents,
            performed_at: self.performed_at.map(to_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentView {
    pub id: Ulid,
    pub patient_id: Ulid,
    pub doctor_id: Option<Ulid>,
    pub appointment_id: Option<Ulid>,
    pub description: String,
    pub tooth: Option<String>,
    pub cost_cents: Option<u64>,
    pub performed_at: DateTime<Utc>,
}

impl From<Treatment> for TreatmentView {
    fn from(t: Treatment) -> Self {
        Self {
            id: t.id,
            patient_id: t.patient_id,
            doctor_id: t.doctor_id,
            appointment_id: t.appointment_id,
            description: t.description,
            tooth: t.tooth,
            cost_cents: t.cost_cents,
            performed_at: from_ms(t.performed_at),
        }
    }
}
