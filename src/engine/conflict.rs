use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

fn validate_bounds(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Validation("start must be before end".into()));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// A window, booking, or busy period.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    validate_bounds(span)?;
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// A query or replacement range.
pub(crate) fn validate_range(range: &Span) -> Result<(), EngineError> {
    validate_bounds(range)?;
    if range.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// True if `[proposed_start, proposed_end)` overlaps any active, timed booking of `resource_id`.
pub fn has_conflict<'a>(
    resource_id: Ulid,
    proposed_start: Ms,
    proposed_end: Ms,
    existing: impl IntoIterator<Item = &'a Booking>,
) -> bool {
    first_conflict(resource_id, proposed_start, proposed_end, existing).is_some()
}

/// Id of the first booking that conflicts with the proposal, if any.
///
/// Cancelled bookings and bookings without a time are skipped. Touching
/// endpoints are not a conflict.
pub fn first_conflict<'a>(
    resource_id: Ulid,
    proposed_start: Ms,
    proposed_end: Ms,
    existing: impl IntoIterator<Item = &'a Booking>,
) -> Option<Ulid> {
    let proposed = Span {
        start: proposed_start,
        end: proposed_end,
    };
    existing
        .into_iter()
        .filter(|b| b.resource_id == resource_id)
        .find(|b| b.occupies(&proposed))
        .map(|b| b.id)
}

/// Commit-time guard: the span must be clear of active bookings on this schedule
/// and of the supplied external busy periods. Only bookings overlapping `span` are scanned.
pub(crate) fn check_no_conflict(rs: &ScheduleState, span: &Span, busy: &[BusyPeriod]) -> Result<(), EngineError> {
    if let Some(hit) = first_conflict(rs.id, span.start, span.end, rs.bookings_overlapping(span)) {
        return Err(EngineError::Conflict(hit));
    }
    if let Some(period) = busy.iter().find(|p| p.overlaps(span)) {
        return Err(EngineError::ExternalConflict(*period));
    }
    Ok(())
}
