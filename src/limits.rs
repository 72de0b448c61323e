pub const MIN_APPOINTMENT_MINUTES: u32 = 15;
pub const MAX_APPOINTMENT_MINUTES: u32 = 240;

pub const MIN_SLOT_MINUTES: u32 = 5;
pub const MAX_SLOT_MINUTES: u32 = 480;
pub const MAX_BUFFER_MINUTES: u32 = 240;

pub const MAX_NOTES_LEN: usize = 1000;
pub const MAX_REASON_LEN: usize = 500;

pub const MAX_PAGE_SIZE: usize = 100;

/// Accepted scheduling range, in calendar years.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;

pub const MAX_APPOINTMENTS_PER_TAILOR: usize = 100_000;
