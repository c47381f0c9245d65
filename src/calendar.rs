//! External calendar busy periods.
//!
//! Third-party calendars are read-only inputs: their busy periods block slots
//! and commits but are never written back or treated as bookings.

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::MAX_BUSY_PERIODS;
use crate::model::{BusyPeriod, Span};

#[derive(Debug)]
pub struct CalendarError(pub String);

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "calendar provider error: {}", self.0)
    }
}

impl std::error::Error for CalendarError {}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy periods for `resource_id` that overlap `range`, sorted by start.
    async fn busy_periods(&self, resource_id: Ulid, range: Span) -> Result<Vec<BusyPeriod>, CalendarError>;
}

/// No calendars connected.
#[derive(Debug, Default)]
pub struct NoCalendar;

#[async_trait]
impl CalendarProvider for NoCalendar {
    async fn busy_periods(&self, _resource_id: Ulid, _range: Span) -> Result<Vec<BusyPeriod>, CalendarError> {
        Ok(Vec::new())
    }
}

/// Busy periods pushed in by a calendar sync job, held per staff member.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    busy: DashMap<Ulid, Vec<BusyPeriod>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything known for `resource_id`.
    pub fn set_busy(&self, resource_id: Ulid, mut periods: Vec<BusyPeriod>) -> Result<(), CalendarError> {
        if periods.len() > MAX_BUSY_PERIODS {
            return Err(CalendarError(format!(
                "too many busy periods ({} > {MAX_BUSY_PERIODS})",
                periods.len()
            )));
        }
        periods.sort_by_key(|p| p.start);
        self.busy.insert(resource_id, periods);
        Ok(())
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn busy_periods(&self, resource_id: Ulid, range: Span) -> Result<Vec<BusyPeriod>, CalendarError> {
        Ok(self
            .busy
            .get(&resource_id)
            .map(|periods| periods.iter().filter(|p| p.overlaps(&range)).copied().collect())
            .unwrap_or_default())
    }
}
