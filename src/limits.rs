use crate::model::Ms;

pub const MAX_DOCTORS: usize = 10_000;
pub const MAX_PATIENTS: usize = 1_000_000;
pub const MAX_APPOINTMENTS_PER_DOCTOR: usize = 100_000;
pub const MAX_TREATMENTS_PER_PATIENT: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTACT_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 4_096;

/// Largest encoded WAL payload. The biggest event carries two text fields.
pub const MAX_WAL_ENTRY_LEN: usize = 64 * 1024;

/// Appointments last between one minute and one day.
pub const MIN_DURATION_MINUTES: u32 = 1;
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
