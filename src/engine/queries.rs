use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::validate_range;
use super::directory::SubjectKey;
use super::slots::compute_available_slots_with_busy;
use super::{Engine, EngineError};

impl Engine {
    pub fn get_user(&self, id: Ulid) -> Option<UserRecord> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let resource_id = self.get_resource_for_booking(&id)?;
        let rs = self.get_schedule(&resource_id)?;
        let guard = rs.read().await;
        guard.booking(id).cloned()
    }

    pub async fn windows_in_range(
        &self,
        resource_id: Ulid,
        range: Span,
    ) -> Result<Vec<AvailabilityWindow>, EngineError> {
        validate_range(&range)?;
        let rs = self
            .get_schedule(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(guard.windows_overlapping(&range).cloned().collect())
    }

    /// Timed bookings of any status overlapping `range`, sorted by start.
    pub async fn bookings_in_range(
        &self,
        resource_id: Ulid,
        range: Span,
    ) -> Result<Vec<Booking>, EngineError> {
        validate_range(&range)?;
        let rs = self
            .get_schedule(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(guard.bookings_overlapping(&range).cloned().collect())
    }

    /// Untimed requests still waiting for a time, oldest first.
    pub async fn pending_requests(&self, resource_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .get_schedule(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        let mut pending: Vec<Booking> = guard
            .untimed()
            .filter(|b| b.status == BookingStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|b| (b.created_at, b.id));
        Ok(pending)
    }

    /// Slots of `slot_duration_minutes` for one staff member within `day`.
    ///
    /// Windows overlapping the day keep their own grid; only slots lying
    /// entirely inside the day are returned. Calendar busy periods are fetched
    /// after the schedule lock is released.
    pub async fn available_slots(
        &self,
        resource_id: Ulid,
        day: Span,
        slot_duration_minutes: u32,
    ) -> Result<Vec<Slot>, EngineError> {
        validate_range(&day)?;
        if slot_duration_minutes == 0 || slot_duration_minutes > MAX_SLOT_DURATION_MINUTES {
            return Err(EngineError::Validation(format!(
                "slot duration must be between 1 and {MAX_SLOT_DURATION_MINUTES} minutes"
            )));
        }

        let rs = self
            .get_schedule(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let (windows, bookings, covered) = {
            let guard = rs.read().await;
            let windows: Vec<AvailabilityWindow> =
                guard.windows_overlapping(&day).cloned().collect();
            let Some(covered) = cover(&windows) else {
                return Ok(Vec::new());
            };
            let bookings: Vec<Booking> = guard.bookings_overlapping(&covered).cloned().collect();
            (windows, bookings, covered)
        };

        let busy = self.calendar.busy_periods(resource_id, covered).await?;

        let mut slots =
            compute_available_slots_with_busy(&windows, &bookings, &busy, slot_duration_minutes);
        slots.retain(|s| day.contains_span(s));

        metrics::counter!(observability::SLOT_COMPUTATIONS_TOTAL).increment(1);
        debug!(
            staff = %resource_id,
            windows = windows.len(),
            bookings = bookings.len(),
            busy = busy.len(),
            slots = slots.len(),
            "slots computed"
        );
        Ok(slots)
    }

    /// Resolve the subject's assigned staff member, then compute their slots.
    pub async fn available_slots_for_subject(
        &self,
        subject: &SubjectKey,
        day: Span,
        slot_duration_minutes: u32,
    ) -> Result<(Ulid, Vec<Slot>), EngineError> {
        let resource_id = self
            .resolve_assigned_resource(subject)
            .ok_or_else(|| EngineError::NoAssignedStaff(subject.to_string()))?;
        let slots = self
            .available_slots(resource_id, day, slot_duration_minutes)
            .await?;
        Ok((resource_id, slots))
    }
}

/// Smallest span covering every window, or `None` when there are none.
fn cover(windows: &[AvailabilityWindow]) -> Option<Span> {
    let start = windows.iter().map(|w| w.span.start).min()?;
    let end = windows.iter().map(|w| w.span.end).max()?;
    Some(Span::new(start, end))
}
