use ulid::Ulid;

use crate::model::*;

// ── Availability Check ────────────────────────────────────────────

/// Existing appointments starting less than this long before a proposed start
/// are still candidates: a short appointment there may run into the proposal.
pub const LOOKBACK_MS: Ms = 30 * MINUTE_MS;

/// A slot someone wants to book on a doctor's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    pub start: Ms,
    pub duration_minutes: u32,
    /// The appointment being moved, so it never conflicts with itself.
    pub exclude: Option<Ulid>,
}

impl Proposal {
    pub fn new(start: Ms, duration_minutes: u32) -> Self {
        Self {
            start,
            duration_minutes,
            exclude: None,
        }
    }

    pub fn excluding(mut self, id: Option<Ulid>) -> Self {
        self.exclude = id;
        self
    }

    pub fn end(&self) -> Ms {
        self.start + self.duration_minutes as Ms * MINUTE_MS
    }
}

/// The comparison set: active appointments with
/// `start - LOOKBACK_MS < appointment.start < proposal.end`, minus the excluded one.
pub fn candidates(schedule: &Schedule, proposal: Proposal) -> impl Iterator<Item = &Appointment> {
    let lookback = proposal.start - LOOKBACK_MS;
    schedule
        .starting_between(lookback, proposal.end())
        .iter()
        .filter(|a| a.status.is_active())
        .filter(move |a| Some(a.id) != proposal.exclude)
}

/// Overlap test between `[start, end)` and an existing appointment.
///
/// Three cases: the proposal starts inside the candidate, ends inside it, or
/// encloses it. A candidate enclosing the proposal is caught by the first.
pub fn conflicts(start: Ms, end: Ms, candidate: &Appointment) -> bool {
    let c_start = candidate.start;
    let c_end = candidate.end();

    let starts_inside = start >= c_start && start < c_end;
    let ends_inside = end > c_start && end <= c_end;
    let encloses = start <= c_start && end >= c_end;

    starts_inside || ends_inside || encloses
}

/// First candidate the proposal collides with, if any.
pub fn first_conflict(schedule: &Schedule, proposal: Proposal) -> Option<&Appointment> {
    let end = proposal.end();
    candidates(schedule, proposal).find(|c| conflicts(proposal.start, end, c))
}

pub fn is_available(schedule: &Schedule, proposal: Proposal) -> bool {
    first_conflict(schedule, proposal).is_none()
}
