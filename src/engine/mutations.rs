use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::Proposal;
use super::validate::{now_ms, validate_name, validate_optional, validate_slot};
use super::{Engine, EngineError, WalCommand, apply_to_schedule};

/// Partial update of an appointment. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentChanges {
    pub doctor_id: Option<Ulid>,
    pub patient_id: Option<Ulid>,
    pub start: Option<Ms>,
    pub duration_minutes: Option<u32>,
    pub status: Option<AppointmentStatus>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl AppointmentChanges {
    /// Whether the change moves the appointment on the calendar.
    pub fn reschedules(&self) -> bool {
        self.doctor_id.is_some() || self.start.is_some() || self.duration_minutes.is_some()
    }
}

/// A treatment to log. A missing `performed_at` is stamped with the current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreatment {
    pub id: Ulid,
    pub patient_id: Ulid,
    pub doctor_id: Option<Ulid>,
    pub appointment_id: Option<Ulid>,
    pub description: String,
    pub tooth: Option<String>,
    pub cost_cents: Option<u64>,
    pub performed_at: Option<Ms>,
}

fn validate_appointment_text(reason: Option<&str>, notes: Option<&str>) -> Result<(), EngineError> {
    validate_optional(reason, MAX_TEXT_LEN, "reason too long")?;
    validate_optional(notes, MAX_TEXT_LEN, "notes too long")
}

fn validate_patient(p: &Patient) -> Result<(), EngineError> {
    validate_name(&p.name)?;
    validate_optional(p.phone.as_deref(), MAX_CONTACT_LEN, "phone too long")?;
    validate_optional(p.email.as_deref(), MAX_CONTACT_LEN, "email too long")?;
    validate_optional(p.birth_date.as_deref(), MAX_CONTACT_LEN, "birth date too long")
}

impl Engine {
    // ── Doctors ──────────────────────────────────────────────

    pub async fn register_doctor(
        &self,
        id: Ulid,
        name: String,
        specialty: Option<String>,
    ) -> Result<Doctor, EngineError> {
        let _gate = self.write_gate.read().await;
        if self.doctors.len() >= MAX_DOCTORS {
            return Err(EngineError::LimitExceeded("too many doctors"));
        }
        validate_name(&name)?;
        validate_optional(specialty.as_deref(), MAX_NAME_LEN, "specialty too long")?;
        if self.doctors.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::DoctorRegistered {
            id,
            name: name.clone(),
            specialty: specialty.clone(),
        };
        self.wal_append(&event).await?;
        let doctor = Doctor { id, name, specialty };
        self.doctors
            .insert(id, Arc::new(RwLock::new(Schedule::new(doctor.clone()))));
        info!(doctor = %id, "doctor registered");
        Ok(doctor)
    }

    pub async fn update_doctor(
        &self,
        id: Ulid,
        name: String,
        specialty: Option<String>,
    ) -> Result<Doctor, EngineError> {
        let _gate = self.write_gate.read().await;
        validate_name(&name)?;
        validate_optional(specialty.as_deref(), MAX_NAME_LEN, "specialty too long")?;
        let rs = self.get_schedule(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        let event = Event::DoctorUpdated { id, name, specialty };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.doctor.clone())
    }

    /// Remove a doctor. Rejected while the doctor has active appointments.
    /// Holds the write gate exclusively so no booking or move can land on the
    /// schedule after it is dropped.
    pub async fn remove_doctor(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        let rs = self.get_schedule(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;
        if guard.has_active_appointments() {
            return Err(EngineError::InUse(id));
        }

        let event = Event::DoctorRemoved { id };
        self.wal_append(&event).await?;
        for a in &guard.appointments {
            self.appointment_to_doctor.remove(&a.id);
        }
        drop(guard);
        self.doctors.remove(&id);
        info!(doctor = %id, "doctor removed");
        Ok(())
    }

    // ── Patients ─────────────────────────────────────────────

    pub async fn register_patient(&self, patient: Patient) -> Result<Patient, EngineError> {
        let _gate = self.write_gate.read().await;
        if self.patients.len() >= MAX_PATIENTS {
            return Err(EngineError::LimitExceeded("too many patients"));
        }
        validate_patient(&patient)?;
        if self.patients.contains_key(&patient.id) {
            return Err(EngineError::AlreadyExists(patient.id));
        }

        let event = Event::PatientRegistered {
            id: patient.id,
            name: patient.name.clone(),
            phone: patient.phone.clone(),
            email: patient.email.clone(),
            birth_date: patient.birth_date.clone(),
        };
        self.persist_record(&event).await?;
        Ok(patient)
    }

    pub async fn update_patient(&self, patient: Patient) -> Result<Patient, EngineError> {
        let _gate = self.write_gate.read().await;
        validate_patient(&patient)?;
        if !self.patients.contains_key(&patient.id) {
            return Err(EngineError::NotFound(patient.id));
        }

        let event = Event::PatientUpdated {
            id: patient.id,
            name: patient.name.clone(),
            phone: patient.phone.clone(),
            email: patient.email.clone(),
            birth_date: patient.birth_date.clone(),
        };
        self.persist_record(&event).await?;
        Ok(patient)
    }

    /// Remove a patient and their treatment log. Rejected while the patient
    /// still has active appointments. Exclusive on the write gate, so bookings
    /// and treatments that already saw the patient finish first.
    pub async fn remove_patient(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        if !self.patients.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let active = self
            .appointments_matching(|a| a.patient_id == id && a.status.is_active())
            .await;
        if !active.is_empty() {
            return Err(EngineError::InUse(id));
        }

        self.persist_record(&Event::PatientRemoved { id }).await
    }

    // ── Appointments ─────────────────────────────────────────

    /// Book an appointment after checking the doctor's calendar. Check and
    /// persist run under the doctor's write lock.
    pub async fn book_appointment(&self, appointment: Appointment) -> Result<Appointment, EngineError> {
        let _gate = self.write_gate.read().await;
        validate_slot(appointment.start, appointment.duration_minutes)?;
        validate_appointment_text(appointment.reason.as_deref(), appointment.notes.as_deref())?;
        if !self.patients.contains_key(&appointment.patient_id) {
            return Err(EngineError::NotFound(appointment.patient_id));
        }
        let rs = self
            .get_schedule(&appointment.doctor_id)
            .ok_or(EngineError::NotFound(appointment.doctor_id))?;
        let mut guard = rs.write().await;
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_DOCTOR {
            return Err(EngineError::LimitExceeded("too many appointments for doctor"));
        }
        if self.appointment_to_doctor.contains_key(&appointment.id) {
            return Err(EngineError::AlreadyExists(appointment.id));
        }

        let proposal = Proposal::new(appointment.start, appointment.duration_minutes);
        if !self.check_slot(&guard, proposal) {
            return Err(EngineError::DoctorUnavailable);
        }

        let event = Event::booked(&appointment);
        self.persist_and_apply(&mut guard, &event).await?;
        info!(appointment = %appointment.id, doctor = %appointment.doctor_id, "appointment booked");
        Ok(appointment)
    }

    /// Apply a partial update. The availability check is re-run, excluding
    /// this appointment, when the change moves it (start, duration, doctor) or
    /// brings a terminal appointment back to an active status.
    pub async fn update_appointment(
        &self,
        id: Ulid,
        changes: AppointmentChanges,
    ) -> Result<Appointment, EngineError> {
        let _gate = self.write_gate.read().await;
        validate_appointment_text(changes.reason.as_deref(), changes.notes.as_deref())?;
        if let Some(pid) = changes.patient_id
            && !self.patients.contains_key(&pid)
        {
            return Err(EngineError::NotFound(pid));
        }
        let current_doctor = self
            .doctor_for_appointment(&id)
            .ok_or(EngineError::NotFound(id))?;
        let target_doctor = changes.doctor_id.unwrap_or(current_doctor);

        let (mut current, mut target) = self.lock_pair(current_doctor, target_doctor).await?;

        let existing = current
            .appointment(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let mut next = existing.clone();
        next.doctor_id = target_doctor;
        if let Some(pid) = changes.patient_id {
            next.patient_id = pid;
        }
        if let Some(start) = changes.start {
            next.start = start;
        }
        if let Some(minutes) = changes.duration_minutes {
            next.duration_minutes = minutes;
        }
        if let Some(status) = changes.status {
            next.status = status;
        }
        if changes.reason.is_some() {
            next.reason = changes.reason.clone();
        }
        if changes.notes.is_some() {
            next.notes = changes.notes.clone();
        }
        validate_slot(next.start, next.duration_minutes)?;

        let reactivated = !existing.status.is_active() && next.status.is_active();
        if changes.reschedules() || reactivated {
            let calendar = target.as_deref().unwrap_or(&*current);
            if target.is_some() && calendar.appointments.len() >= MAX_APPOINTMENTS_PER_DOCTOR {
                return Err(EngineError::LimitExceeded("too many appointments for doctor"));
            }
            let proposal = Proposal::new(next.start, next.duration_minutes).excluding(Some(id));
            if !self.check_slot(calendar, proposal) {
                return Err(EngineError::DoctorUnavailable);
            }
        }

        let event = Event::updated(current_doctor, &next);
        self.persist_and_apply(&mut current, &event).await?;
        if let Some(target) = target.as_mut() {
            apply_to_schedule(target, &event, &self.appointment_to_doctor);
            info!(appointment = %id, from = %current_doctor, to = %target_doctor, "appointment moved");
        }
        Ok(next)
    }

    /// Change only the status. Terminal transitions free the slot without a
    /// check; reactivating a terminal appointment re-checks its slot.
    pub async fn set_appointment_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let _gate = self.write_gate.read().await;
        let mut guard = self.resolve_appointment_write(&id).await?;
        let existing = guard
            .appointment(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if !existing.status.is_active() && status.is_active() {
            let proposal =
                Proposal::new(existing.start, existing.duration_minutes).excluding(Some(id));
            if !self.check_slot(&guard, proposal) {
                return Err(EngineError::DoctorUnavailable);
            }
        }

        let event = Event::AppointmentStatusChanged {
            id,
            doctor_id: existing.doctor_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(Appointment { status, ..existing })
    }

    pub async fn delete_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let _gate = self.write_gate.read().await;
        let mut guard = self.resolve_appointment_write(&id).await?;
        let existing = guard
            .appointment(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::AppointmentDeleted {
            id,
            doctor_id: existing.doctor_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(existing)
    }

    /// Write-lock one or two doctors' schedules, in id order to prevent deadlocks.
    /// Returns `(first, Some(second))` only when the ids differ.
    #[allow(clippy::type_complexity)]
    async fn lock_pair(
        &self,
        first: Ulid,
        second: Ulid,
    ) -> Result<
        (
            OwnedRwLockWriteGuard<Schedule>,
            Option<OwnedRwLockWriteGuard<Schedule>>,
        ),
        EngineError,
    > {
        let a = self.get_schedule(&first).ok_or(EngineError::NotFound(first))?;
        if first == second {
            return Ok((a.write_owned().await, None));
        }
        let b = self.get_schedule(&second).ok_or(EngineError::NotFound(second))?;
        if first < second {
            let ga = a.write_owned().await;
            let gb = b.write_owned().await;
            Ok((ga, Some(gb)))
        } else {
            let gb = b.write_owned().await;
            let ga = a.write_owned().await;
            Ok((ga, Some(gb)))
        }
    }

    // ── Treatments ───────────────────────────────────────────

    pub async fn log_treatment(&self, new: NewTreatment) -> Result<Treatment, EngineError> {
        let _gate = self.write_gate.read().await;
        let treatment = Treatment {
            id: new.id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            appointment_id: new.appointment_id,
            description: new.description,
            tooth: new.tooth,
            cost_cents: new.cost_cents,
            performed_at: new.performed_at.unwrap_or_else(now_ms),
        };
        if treatment.description.trim().is_empty() {
            return Err(EngineError::Invalid("description is required"));
        }
        validate_optional(Some(&treatment.description), MAX_TEXT_LEN, "description too long")?;
        validate_optional(treatment.tooth.as_deref(), MAX_NAME_LEN, "tooth too long")?;
        if !self.patients.contains_key(&treatment.patient_id) {
            return Err(EngineError::NotFound(treatment.patient_id));
        }
        if let Some(did) = treatment.doctor_id
            && !self.doctors.contains_key(&did)
        {
            return Err(EngineError::NotFound(did));
        }
        if let Some(aid) = treatment.appointment_id
            && !self.appointment_to_doctor.contains_key(&aid)
        {
            return Err(EngineError::NotFound(aid));
        }
        if self.treatment_to_patient.contains_key(&treatment.id) {
            return Err(EngineError::AlreadyExists(treatment.id));
        }
        let logged = self
            .treatments
            .get(&treatment.patient_id)
            .map_or(0, |log| log.len());
        if logged >= MAX_TREATMENTS_PER_PATIENT {
            return Err(EngineError::LimitExceeded("too many treatments for patient"));
        }

        let event = Event::TreatmentLogged {
            id: treatment.id,
            patient_id: treatment.patient_id,
            doctor_id: treatment.doctor_id,
            appointment_id: treatment.appointment_id,
            description: treatment.description.clone(),
            tooth: treatment.tooth.clone(),
            cost_cents: treatment.cost_cents,
            performed_at: treatment.performed_at,
        };
        self.persist_record(&event).await?;
        Ok(treatment)
    }

    pub async fn remove_treatment(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let patient_id = self
            .treatment_to_patient
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        self.persist_record(&Event::TreatmentRemoved { id, patient_id })
            .await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        let mut events = Vec::new();

        for entry in self.patients.iter() {
            let p = entry.value();
            events.push(Event::PatientRegistered {
                id: p.id,
                name: p.name.clone(),
                phone: p.phone.clone(),
                email: p.email.clone(),
                birth_date: p.birth_date.clone(),
            });
        }

        let schedules: Vec<_> = self.doctors.iter().map(|e| e.value().clone()).collect();
        for rs in schedules {
            let guard = rs.read().await;
            events.push(Event::DoctorRegistered {
                id: guard.doctor.id,
                name: guard.doctor.name.clone(),
                specialty: guard.doctor.specialty.clone(),
            });
            events.extend(guard.appointments.iter().map(Event::booked));
        }

        for entry in self.treatments.iter() {
            for t in entry.value() {
                events.push(Event::TreatmentLogged {
                    id: t.id,
                    patient_id: t.patient_id,
                    doctor_id: t.doctor_id,
                    appointment_id: t.appointment_id,
                    description: t.description.clone(),
                    tooth: t.tooth.clone(),
                    cost_cents: t.cost_cents,
                    performed_at: t.performed_at,
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
