use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

const DAY_MS: Ms = 86_400_000;

/// A single window or booking may not be wider than this.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * DAY_MS;
/// Range queries (listing, window replacement) are capped to this width.
pub const MAX_QUERY_WINDOW_MS: Ms = 92 * DAY_MS;

pub const MAX_SLOT_DURATION_MINUTES: u32 = 8 * 60;
pub const MAX_WINDOWS_PER_REPLACE: usize = 2_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 500_000;
pub const MAX_USERS: usize = 1_000_000;
pub const MAX_BUSY_PERIODS: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTACT_LEN: usize = 320;
pub const MAX_REASON_LEN: usize = 4_096;
