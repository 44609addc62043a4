use crate::model::Ms;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;
pub const WEEK_MS: Ms = 7 * DAY_MS;

/// Longest single booking.
pub const MAX_ENTRY_DURATION_MS: Ms = DAY_MS;

/// Upper bound on entries one series request may create.
pub const MAX_SERIES_REPETITIONS: u32 = 366;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 320;

/// Accept timestamps between 1970-01-01 and 9999-12-31.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
