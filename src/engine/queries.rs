use ulid::Ulid;

use crate::model::*;

use super::availability::Proposal;
use super::validate::validate_slot;
use super::{Engine, EngineError};

/// Appointment listing filters. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Ulid>,
    pub patient_id: Option<Ulid>,
    pub status: Option<AppointmentStatus>,
    /// Appointments starting at or after this instant.
    pub from: Option<Ms>,
    /// Appointments starting before this instant.
    pub to: Option<Ms>,
}

impl AppointmentFilter {
    fn matches(&self, a: &Appointment) -> bool {
        self.patient_id.is_none_or(|p| a.patient_id == p)
            && self.status.is_none_or(|s| a.status == s)
            && self.from.is_none_or(|f| a.start >= f)
            && self.to.is_none_or(|t| a.start < t)
    }
}

impl Engine {
    /// Whether `doctor_id` can take `[start, start + duration_minutes)`.
    /// `exclude` skips the appointment being moved. Unknown doctors are an
    /// error, never "available".
    pub async fn is_doctor_available(
        &self,
        doctor_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        validate_slot(start, duration_minutes)?;
        let rs = self
            .get_schedule(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let guard = rs.read().await;
        let proposal = Proposal::new(start, duration_minutes).excluding(exclude);
        Ok(self.check_slot(&guard, proposal))
    }

    pub async fn get_doctor(&self, id: Ulid) -> Option<Doctor> {
        let rs = self.get_schedule(&id)?;
        let guard = rs.read().await;
        Some(guard.doctor.clone())
    }

    /// All doctors ordered by name.
    pub async fn list_doctors(&self) -> Vec<Doctor> {
        let schedules: Vec<_> = self.doctors.iter().map(|e| e.value().clone()).collect();
        let mut doctors = Vec::with_capacity(schedules.len());
        for rs in schedules {
            doctors.push(rs.read().await.doctor.clone());
        }
        doctors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        doctors
    }

    pub fn doctor_count(&self) -> usize {
        self.doctors.len()
    }

    pub fn get_patient(&self, id: Ulid) -> Option<Patient> {
        self.patients.get(&id).map(|e| e.value().clone())
    }

    /// Patients ordered by name, optionally filtered by a case-insensitive
    /// name fragment.
    pub fn list_patients(&self, name_contains: Option<&str>) -> Vec<Patient> {
        let needle = name_contains.map(str::to_lowercase);
        let mut patients: Vec<Patient> = self
            .patients
            .iter()
            .filter(|e| {
                needle
                    .as_deref()
                    .is_none_or(|n| e.value().name.to_lowercase().contains(n))
            })
            .map(|e| e.value().clone())
            .collect();
        patients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        patients
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub async fn get_appointment(&self, id: Ulid) -> Option<Appointment> {
        let doctor_id = self.doctor_for_appointment(&id)?;
        let rs = self.get_schedule(&doctor_id)?;
        let guard = rs.read().await;
        guard.appointment(id).cloned()
    }

    /// Appointments matching `filter`, ordered by start time.
    pub async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, EngineError> {
        let mut out = match filter.doctor_id {
            Some(doctor_id) => {
                let rs = self
                    .get_schedule(&doctor_id)
                    .ok_or(EngineError::NotFound(doctor_id))?;
                let guard = rs.read().await;
                guard
                    .appointments
                    .iter()
                    .filter(|a| filter.matches(a))
                    .cloned()
                    .collect()
            }
            None => self.appointments_matching(|a| filter.matches(a)).await,
        };
        out.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Scan every doctor's schedule.
    pub(super) async fn appointments_matching(
        &self,
        pred: impl Fn(&Appointment) -> bool,
    ) -> Vec<Appointment> {
        let schedules: Vec<_> = self.doctors.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in schedules {
            let guard = rs.read().await;
            out.extend(guard.appointments.iter().filter(|a| pred(a)).cloned());
        }
        out
    }

    /// A patient's treatment log, most recent first.
    pub fn list_treatments(&self, patient_id: Ulid) -> Result<Vec<Treatment>, EngineError> {
        if !self.patients.contains_key(&patient_id) {
            return Err(EngineError::NotFound(patient_id));
        }
        let mut log = self
            .treatments
            .get(&patient_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        log.sort_by(|a, b| b.performed_at.cmp(&a.performed_at).then(b.id.cmp(&a.id)));
        Ok(log)
    }
}
