use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type inside the engine.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Span starting at `start` lasting `minutes`.
    pub fn from_minutes(start: Ms, minutes: u32) -> Self {
        Self::new(start, start + minutes as Ms * MINUTE_MS)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Active appointments still occupy the doctor's calendar.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "noShow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    pub start: Ms,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl Appointment {
    pub fn end(&self) -> Ms {
        self.start + self.duration_minutes as Ms * MINUTE_MS
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Ulid,
    pub name: String,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Ulid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Ulid,
    pub patient_id: Ulid,
    pub doctor_id: Option<Ulid>,
    pub appointment_id: Option<Ulid>,
    pub description: String,
    pub tooth: Option<String>,
    pub cost_cents: Option<u64>,
    pub performed_at: Ms,
}

/// One doctor's calendar: the doctor record plus every appointment booked
/// against them, whatever the status.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub doctor: Doctor,
    /// Sorted by `start`.
    pub appointments: Vec<Appointment>,
}

impl Schedule {
    pub fn new(doctor: Doctor) -> Self {
        Self {
            doctor,
            appointments: Vec::new(),
        }
    }

    pub fn id(&self) -> Ulid {
        self.doctor.id
    }

    /// Insert appointment maintaining sort order by start.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.start, |a| a.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove_appointment(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn appointment_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Appointments with `after < start < before`, in start order.
    pub fn starting_between(&self, after: Ms, before: Ms) -> &[Appointment] {
        let lo = self.appointments.partition_point(|a| a.start <= after);
        let hi = self.appointments.partition_point(|a| a.start < before);
        if lo >= hi {
            return &[];
        }
        &self.appointments[lo..hi]
    }

    pub fn has_active_appointments(&self) -> bool {
        self.appointments.iter().any(|a| a.status.is_active())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    DoctorRegistered {
        id: Ulid,
        name: String,
        specialty: Option<String>,
    },
    DoctorUpdated {
        id: Ulid,
        name: String,
        specialty: Option<String>,
    },
    DoctorRemoved {
        id: Ulid,
    },
    PatientRegistered {
        id: Ulid,
        name: String,
        phone: Option<String>,
        email: Option<String>,
        birth_date: Option<String>,
    },
    PatientUpdated {
        id: Ulid,
        name: String,
        phone: Option<String>,
        email: Option<String>,
        birth_date: Option<String>,
    },
    PatientRemoved {
        id: Ulid,
    },
    AppointmentBooked {
        id: Ulid,
        doctor_id: Ulid,
        patient_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        status: AppointmentStatus,
        reason: Option<String>,
        notes: Option<String>,
    },
    /// Full replacement. `previous_doctor_id` differs from `doctor_id` when the
    /// appointment moved to another doctor.
    AppointmentUpdated {
        id: Ulid,
        previous_doctor_id: Ulid,
        doctor_id: Ulid,
        patient_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        status: AppointmentStatus,
        reason: Option<String>,
        notes: Option<String>,
    },
    AppointmentStatusChanged {
        id: Ulid,
        doctor_id: Ulid,
        status: AppointmentStatus,
    },
    AppointmentDeleted {
        id: Ulid,
        doctor_id: Ulid,
    },
    TreatmentLogged {
        id: Ulid,
        patient_id: Ulid,
        doctor_id: Option<Ulid>,
        appointment_id: Option<Ulid>,
        description: String,
        tooth: Option<String>,
        cost_cents: Option<u64>,
        performed_at: Ms,
    },
    TreatmentRemoved {
        id: Ulid,
        patient_id: Ulid,
    },
}

impl Event {
    pub fn booked(a: &Appointment) -> Self {
        Event::AppointmentBooked {
            id: a.id,
            doctor_id: a.doctor_id,
            patient_id: a.patient_id,
            start: a.start,
            duration_minutes: a.duration_minutes,
            status: a.status,
            reason: a.reason.clone(),
            notes: a.notes.clone(),
        }
    }

    pub fn updated(previous_doctor_id: Ulid, a: &Appointment) -> Self {
        Event::AppointmentUpdated {
            id: a.id,
            previous_doctor_id,
            doctor_id: a.doctor_id,
            patient_id: a.patient_id,
            start: a.start,
            duration_minutes: a.duration_minutes,
            status: a.status,
            reason: a.reason.clone(),
            notes: a.notes.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Event::DoctorRegistered { .. } => "doctor_registered",
            Event::DoctorUpdated { .. } => "doctor_updated",
            Event::DoctorRemoved { .. } => "doctor_removed",
            Event::PatientRegistered { .. } => "patient_registered",
            Event::PatientUpdated { .. } => "patient_updated",
            Event::PatientRemoved { .. } => "patient_removed",
            Event::AppointmentBooked { .. } => "appointment_booked",
            Event::AppointmentUpdated { .. } => "appointment_updated",
            Event::AppointmentStatusChanged { .. } => "appointment_status_changed",
            Event::AppointmentDeleted { .. } => "appointment_deleted",
            Event::TreatmentLogged { .. } => "treatment_logged",
            Event::TreatmentRemoved { .. } => "treatment_removed",
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One page of an offset/limit listing. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    /// Slice an already-filtered, already-ordered result set.
    pub fn paginate(all: Vec<T>, page: usize, limit: usize) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total = all.len();
        let pages = total.div_ceil(limit);
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            items,
            total,
            page,
            limit,
            pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
        }
    }
}
