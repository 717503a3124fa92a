mod availability;
mod error;
mod mutations;
mod queries;
mod validate;

pub use availability::{LOOKBACK_MS, Proposal, candidates, conflicts, first_conflict, is_available};
pub use error::EngineError;
pub use mutations::{AppointmentChanges, NewTreatment};
pub use queries::AppointmentFilter;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedSchedule = Arc<RwLock<Schedule>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    Close {
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
///
/// Exits after answering a Close; later sends fail.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = pending
                    && handle_non_append(&mut wal, other).is_break()
                {
                    break;
                }
            }
            other => {
                if handle_non_append(&mut wal, other).is_break() {
                    break;
                }
            }
        }
    }
    debug!("WAL writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) -> std::ops::ControlFlow<()> {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Close { response } => {
            let _ = response.send(wal.flush_sync());
            return std::ops::ControlFlow::Break(());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
    std::ops::ControlFlow::Continue(())
}

/// The practice's storage handle: in-memory state rebuilt from the WAL on
/// open, with every mutation persisted before it is applied.
pub struct Engine {
    pub(super) doctors: DashMap<Ulid, SharedSchedule>,
    pub(super) patients: DashMap<Ulid, Patient>,
    /// Patient id → treatment log.
    pub(super) treatments: DashMap<Ulid, Vec<Treatment>>,
    /// Reverse lookup: appointment id → doctor id
    pub(super) appointment_to_doctor: DashMap<Ulid, Ulid>,
    /// Reverse lookup: treatment id → patient id
    pub(super) treatment_to_patient: DashMap<Ulid, Ulid>,
    /// Held shared by every mutation. Compaction and doctor/patient removal
    /// hold it exclusively: a snapshot never misses a logged event, and nothing
    /// references a record between its last check and its removal.
    pub(super) write_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

/// Apply an event to one doctor's schedule (no locking — caller holds the lock).
fn apply_to_schedule(rs: &mut Schedule, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::AppointmentBooked {
            id,
            doctor_id,
            patient_id,
            start,
            duration_minutes,
            status,
            reason,
            notes,
        } => {
            rs.insert_appointment(Appointment {
                id: *id,
                doctor_id: *doctor_id,
                patient_id: *patient_id,
                start: *start,
                duration_minutes: *duration_minutes,
                status: *status,
                reason: reason.clone(),
                notes: notes.clone(),
            });
            index.insert(*id, *doctor_id);
        }
        Event::AppointmentUpdated {
            id,
            previous_doctor_id,
            doctor_id,
            patient_id,
            start,
            duration_minutes,
            status,
            reason,
            notes,
        } => {
            // Applied to both schedules when the doctor changes.
            if rs.id() == *previous_doctor_id {
                rs.remove_appointment(*id);
            }
            if rs.id() == *doctor_id {
                rs.insert_appointment(Appointment {
                    id: *id,
                    doctor_id: *doctor_id,
                    patient_id: *patient_id,
                    start: *start,
                    duration_minutes: *duration_minutes,
                    status: *status,
                    reason: reason.clone(),
                    notes: notes.clone(),
                });
                index.insert(*id, *doctor_id);
            }
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            if let Some(a) = rs.appointment_mut(*id) {
                a.status = *status;
            }
        }
        Event::AppointmentDeleted { id, .. } => {
            rs.remove_appointment(*id);
            index.remove(id);
        }
        Event::DoctorUpdated { name, specialty, .. } => {
            rs.doctor.name = name.clone();
            rs.doctor.specialty = specialty.clone();
        }
        // Registration/removal happen at the DashMap level; the rest are not schedule events.
        _ => {}
    }
}

impl Engine {
    /// Open (or create) the WAL at `wal_path`, rebuild state, and start the writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            doctors: DashMap::new(),
            patients: DashMap::new(),
            treatments: DashMap::new(),
            appointment_to_doctor: DashMap::new(),
            treatment_to_patient: DashMap::new(),
            write_gate: RwLock::new(()),
            wal_tx,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this runs
        // inside an async context.
        for event in &events {
            match event {
                Event::DoctorRegistered { id, name, specialty } => {
                    let schedule = Schedule::new(Doctor {
                        id: *id,
                        name: name.clone(),
                        specialty: specialty.clone(),
                    });
                    engine.doctors.insert(*id, Arc::new(RwLock::new(schedule)));
                }
                Event::DoctorRemoved { id } => {
                    if let Some((_, rs)) = engine.doctors.remove(id)
                        && let Ok(guard) = rs.try_read()
                    {
                        for a in &guard.appointments {
                            engine.appointment_to_doctor.remove(&a.id);
                        }
                    }
                }
                other => {
                    for doctor_id in event_doctor_ids(other) {
                        if let Some(rs) = engine.get_schedule(&doctor_id)
                            && let Ok(mut guard) = rs.try_write()
                        {
                            apply_to_schedule(&mut guard, other, &engine.appointment_to_doctor);
                        }
                    }
                    engine.apply_record(other);
                }
            }
        }

        tracing::info!(
            events = events.len(),
            doctors = engine.doctors.len(),
            patients = engine.patients.len(),
            "engine state restored from {}",
            wal_path.display()
        );
        Ok(engine)
    }

    /// Flush and stop the WAL writer. Mutations after this fail with a storage error.
    pub async fn close(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Close { response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub fn get_schedule(&self, id: &Ulid) -> Option<SharedSchedule> {
        self.doctors.get(id).map(|e| e.value().clone())
    }

    pub fn doctor_for_appointment(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_to_doctor.get(appointment_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut Schedule,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_schedule(rs, event, &self.appointment_to_doctor);
        debug!(event = event.label(), doctor = %rs.id(), "applied");
        Ok(())
    }

    /// WAL-append + apply for patient and treatment records.
    pub(super) async fn persist_record(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_record(event);
        debug!(event = event.label(), "applied");
        Ok(())
    }

    /// Apply patient/treatment events. Schedule events are ignored here.
    fn apply_record(&self, event: &Event) {
        match event {
            Event::PatientRegistered {
                id,
                name,
                phone,
                email,
                birth_date,
            }
            | Event::PatientUpdated {
                id,
                name,
                phone,
                email,
                birth_date,
            } => {
                self.patients.insert(
                    *id,
                    Patient {
                        id: *id,
                        name: name.clone(),
                        phone: phone.clone(),
                        email: email.clone(),
                        birth_date: birth_date.clone(),
                    },
                );
            }
            Event::PatientRemoved { id } => {
                self.patients.remove(id);
                if let Some((_, log)) = self.treatments.remove(id) {
                    for t in log {
                        self.treatment_to_patient.remove(&t.id);
                    }
                }
            }
            Event::TreatmentLogged {
                id,
                patient_id,
                doctor_id,
                appointment_id,
                description,
                tooth,
                cost_cents,
                performed_at,
            } => {
                self.treatments.entry(*patient_id).or_default().push(Treatment {
                    id: *id,
                    patient_id: *patient_id,
                    doctor_id: *doctor_id,
                    appointment_id: *appointment_id,
                    description: description.clone(),
                    tooth: tooth.clone(),
                    cost_cents: *cost_cents,
                    performed_at: *performed_at,
                });
                self.treatment_to_patient.insert(*id, *patient_id);
            }
            Event::TreatmentRemoved { id, patient_id } => {
                if let Some(mut log) = self.treatments.get_mut(patient_id) {
                    log.retain(|t| t.id != *id);
                }
                self.treatment_to_patient.remove(id);
            }
            _ => {}
        }
    }

    /// Lookup appointment → doctor, acquire that doctor's write lock.
    pub(super) async fn resolve_appointment_write(
        &self,
        appointment_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<Schedule>, EngineError> {
        let doctor_id = self
            .doctor_for_appointment(appointment_id)
            .ok_or(EngineError::NotFound(*appointment_id))?;
        let rs = self
            .get_schedule(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let guard = rs.write_owned().await;
        if guard.appointment(*appointment_id).is_none() {
            return Err(EngineError::NotFound(*appointment_id));
        }
        Ok(guard)
    }

    /// Run the availability check against a locked schedule and count the outcome.
    pub(super) fn check_slot(&self, rs: &Schedule, proposal: Proposal) -> bool {
        match first_conflict(rs, proposal) {
            Some(hit) => {
                debug!(doctor = %rs.id(), conflicting = %hit.id, "slot unavailable");
                metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "outcome" => "conflict")
                    .increment(1);
                false
            }
            None => {
                metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "outcome" => "available")
                    .increment(1);
                true
            }
        }
    }
}

/// Doctor schedules touched by a schedule-level event.
fn event_doctor_ids(event: &Event) -> Vec<Ulid> {
    match event {
        Event::AppointmentBooked { doctor_id, .. }
        | Event::AppointmentStatusChanged { doctor_id, .. }
        | Event::AppointmentDeleted { doctor_id, .. } => vec![*doctor_id],
        Event::AppointmentUpdated {
            previous_doctor_id,
            doctor_id,
            ..
        } => {
            if previous_doctor_id == doctor_id {
                vec![*doctor_id]
            } else {
                vec![*previous_doctor_id, *doctor_id]
            }
        }
        Event::DoctorUpdated { id, .. } => vec![*id],
        _ => Vec::new(),
    }
}
