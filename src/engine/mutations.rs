use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, now_ms, validate_range, validate_span};
use super::directory::SubjectKey;
use super::{Engine, EngineError};

/// A booking request with a concrete time.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub subject_id: Option<Ulid>,
    pub span: Span,
    pub status: BookingStatus,
    pub reason: Option<String>,
}

fn validate_reason(reason: &Option<String>) -> Result<(), EngineError> {
    if let Some(r) = reason
        && r.len() > MAX_REASON_LEN
    {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

fn validate_user(user: &UserRecord) -> Result<(), EngineError> {
    if user.name.trim().is_empty() {
        return Err(EngineError::Validation("name is required".into()));
    }
    if user.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    for field in [&user.email, &user.phone, &user.assigned_to].into_iter().flatten() {
        if field.len() > MAX_CONTACT_LEN {
            return Err(EngineError::LimitExceeded("contact field too long"));
        }
    }
    Ok(())
}

/// Anything the staff member still owes: untimed requests or bookings that have not ended.
fn ensure_no_active_future(rs: &ScheduleState, now: Ms) -> Result<(), EngineError> {
    let busy = rs
        .bookings
        .iter()
        .any(|b| b.is_active() && b.span.is_none_or(|s| s.end > now));
    if busy {
        return Err(EngineError::HasActiveBookings(rs.id));
    }
    Ok(())
}

fn record_commit(outcome: &Result<Booking, EngineError>) {
    let label = match outcome {
        Ok(_) => "committed",
        Err(e) => observability::error_label(e),
    };
    metrics::counter!(observability::BOOKING_COMMITS_TOTAL, "outcome" => label).increment(1);
}

impl Engine {
    pub async fn upsert_user(&self, user: UserRecord) -> Result<(), EngineError> {
        validate_user(&user)?;
        let _commit = self.commit_gate.read().await;
        if !self.users.contains_key(&user.id) && self.users.len() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }

        let event = Event::user_upserted(&user);
        // Demoting staff drops their schedule; only allowed once it is empty of obligations.
        let demoted = self
            .get_schedule(&user.id)
            .filter(|_| !user.role.owns_schedule());
        match demoted {
            Some(rs) => {
                let guard = rs.write_owned().await;
                ensure_no_active_future(&guard, now_ms())?;
                self.journal_append(&event).await?;
                self.apply_directory(&event, Some(&*guard));
            }
            None => {
                self.journal_append(&event).await?;
                self.apply_directory(&event, None);
            }
        }
        debug!(user = %user.id, role = ?user.role, "user upserted");
        Ok(())
    }

    pub async fn remove_user(&self, id: Ulid) -> Result<(), EngineError> {
        let _commit = self.commit_gate.read().await;
        if !self.users.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::UserRemoved { id };
        match self.get_schedule(&id) {
            Some(rs) => {
                let guard = rs.write_owned().await;
                ensure_no_active_future(&guard, now_ms())?;
                self.journal_append(&event).await?;
                self.apply_directory(&event, Some(&*guard));
            }
            None => {
                self.journal_append(&event).await?;
                self.apply_directory(&event, None);
            }
        }
        info!(user = %id, "user removed");
        Ok(())
    }

    /// Replace every window overlapping `range` with `windows`, as one journal record.
    pub async fn replace_windows(
        &self,
        resource_id: Ulid,
        range: Span,
        windows: Vec<Span>,
    ) -> Result<Vec<AvailabilityWindow>, EngineError> {
        validate_range(&range)?;
        if windows.len() > MAX_WINDOWS_PER_REPLACE {
            return Err(EngineError::LimitExceeded("too many windows"));
        }
        for w in &windows {
            validate_span(w)?;
            if !range.contains_span(w) {
                return Err(EngineError::Validation(format!(
                    "window [{}, {}) lies outside range [{}, {})",
                    w.start, w.end, range.start, range.end
                )));
            }
        }

        let _commit = self.commit_gate.read().await;
        let mut guard = self.lock_schedule(resource_id).await?;

        let windows: Vec<(Ulid, Span)> = windows.into_iter().map(|s| (Ulid::new(), s)).collect();
        let event = Event::WindowsReplaced {
            resource_id,
            range,
            windows: windows.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(staff = %resource_id, count = windows.len(), "availability windows replaced");

        Ok(windows
            .into_iter()
            .map(|(id, span)| AvailabilityWindow { id, resource_id, span })
            .collect())
    }

    /// Check-and-reserve under the schedule write lock: the conflict check and
    /// the insert cannot interleave with another commit for the same staff member.
    /// External calendar busy periods are checked too.
    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, EngineError> {
        let outcome = self.create_booking_inner(req).await;
        record_commit(&outcome);
        outcome
    }

    async fn create_booking_inner(&self, req: NewBooking) -> Result<Booking, EngineError> {
        validate_span(&req.span)?;
        validate_reason(&req.reason)?;
        if req.status == BookingStatus::Cancelled {
            return Err(EngineError::Validation("cannot create a cancelled booking".into()));
        }
        if let Some(sid) = req.subject_id
            && !self.users.contains_key(&sid)
        {
            return Err(EngineError::NotFound(sid));
        }

        // Calendar I/O happens before taking the lock.
        let busy = self.calendar.busy_periods(req.resource_id, req.span).await?;

        let _commit = self.commit_gate.read().await;
        let mut guard = self.lock_schedule(req.resource_id).await?;
        if self.booking_to_resource.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on schedule"));
        }

        if let Err(e) = check_no_conflict(&guard, &req.span, &busy) {
            warn!(staff = %req.resource_id, start = req.span.start, "booking rejected: {e}");
            return Err(e);
        }
        // Another staff member's commit may have taken the id since the check above.
        self.reserve_booking_id(req.id, req.resource_id)?;

        let booking = Booking {
            id: req.id,
            resource_id: req.resource_id,
            subject_id: req.subject_id,
            span: Some(req.span),
            status: req.status,
            reason: req.reason,
            created_at: now_ms(),
        };
        self.commit_reserved_booking(&mut guard, &booking).await?;
        info!(booking = %booking.id, staff = %booking.resource_id, "booking created");
        Ok(booking)
    }

    /// Record an urgent request with no time yet, for the subject's assigned staff member.
    pub async fn create_urgent_request(
        &self,
        id: Ulid,
        subject: &SubjectKey,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        validate_reason(&reason)?;
        let (subject_id, resource_id) = self
            .resolve_subject(subject)
            .ok_or_else(|| EngineError::NoAssignedStaff(subject.to_string()))?;

        let _commit = self.commit_gate.read().await;
        let mut guard = self.lock_schedule(resource_id).await?;
        if self.booking_to_resource.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on schedule"));
        }
        self.reserve_booking_id(id, resource_id)?;

        let booking = Booking {
            id,
            resource_id,
            subject_id: Some(subject_id),
            span: None,
            status: BookingStatus::Pending,
            reason,
            created_at: now_ms(),
        };
        self.commit_reserved_booking(&mut guard, &booking).await?;
        info!(booking = %id, staff = %resource_id, "urgent request recorded");
        Ok(booking)
    }

    /// Give a pending urgent request a time. Same atomic check as `create_booking`.
    pub async fn assign_time(&self, id: Ulid, span: Span) -> Result<Booking, EngineError> {
        validate_span(&span)?;
        let resource_id = self
            .get_resource_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let busy = self.calendar.busy_periods(resource_id, span).await?;

        let _commit = self.commit_gate.read().await;
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if booking.span.is_some() || booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id,
                reason: "only untimed pending requests can be assigned a time".into(),
            });
        }

        check_no_conflict(&guard, &span, &busy)?;

        let event = Event::BookingTimeAssigned { id, resource_id, span };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(booking = %id, staff = %resource_id, start = span.start, "time assigned");
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Forward-only status change. Cancelling is allowed until the booking starts.
    pub async fn transition_status(
        &self,
        id: Ulid,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _commit = self.commit_gate.read().await;
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;

        if !booking.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                id,
                reason: format!("{} -> {status} is not allowed", booking.status),
            });
        }
        match (status, booking.span) {
            (BookingStatus::Cancelled, Some(span)) if span.start <= now_ms() => {
                return Err(EngineError::InvalidTransition {
                    id,
                    reason: "booking has already started".into(),
                });
            }
            (BookingStatus::Scheduled | BookingStatus::Confirmed, None) => {
                return Err(EngineError::InvalidTransition {
                    id,
                    reason: "booking has no time assigned".into(),
                });
            }
            _ => {}
        }

        let event = Event::BookingStatusChanged { id, resource_id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(booking = %id, %status, "booking status changed");
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Rewrite the journal with the minimal set of events that recreates the current state.
    pub async fn compact(&self) -> Result<usize, EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let mut events: Vec<Event> = self
            .users
            .iter()
            .map(|u| Event::user_upserted(u.value()))
            .collect();

        let schedules: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        for rs in schedules {
            let guard = rs.read().await;
            if let (Some(first), Some(last_end)) = (
                guard.windows.first(),
                guard.windows.iter().map(|w| w.span.end).max(),
            ) {
                events.push(Event::WindowsReplaced {
                    resource_id: guard.id,
                    range: Span::new(first.span.start, last_end),
                    windows: guard.windows.iter().map(|w| (w.id, w.span)).collect(),
                });
            }
            events.extend(guard.bookings.iter().map(Event::booking_created));
        }

        let count = events.len();
        self.journal_compact(events).await?;
        info!(events = count, "journal compacted");
        Ok(count)
    }
}
