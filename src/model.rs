use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MAX_SPAN_DURATION_MS;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A derived, fixed-duration bookable interval. Never persisted.
pub type Slot = Span;

/// Occupied time reported by a connected third-party calendar.
pub type BusyPeriod = Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Scheduled,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Cancelled bookings are soft-deleted and never occupy time.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    /// Forward-only lifecycle. Whether a cancellation is still allowed
    /// (booking not yet started) is decided by the caller.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Pending, Confirmed)
                | (Scheduled, Confirmed)
                | (Pending, Cancelled)
                | (Scheduled, Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous period a staff member declared themselves available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub span: Span,
}

/// An appointment occupying a staff member's time.
///
/// `span` is `None` for urgent requests that have not been given a time yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub subject_id: Option<Ulid>,
    pub span: Option<Span>,
    pub status: BookingStatus,
    pub reason: Option<String>,
    pub created_at: Ms,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// True if this booking is active, timed, and overlaps `span`.
    pub fn occupies(&self, span: &Span) -> bool {
        self.is_active() && self.span.is_some_and(|s| s.overlaps(span))
    }

    fn sort_key(&self) -> Ms {
        self.span.map_or(Ms::MIN, |s| s.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Staff,
    Admin,
}

impl Role {
    /// Staff and admins have schedules that clients can be booked into.
    pub fn owns_schedule(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// A row of the user directory: clients and the staff who serve them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Ulid,
    pub role: Role,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Contact-style reference to the assigned staff member (email or name).
    /// Not checked for referential integrity.
    pub assigned_to: Option<String>,
}

/// A staff member's schedule: availability windows and bookings.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub id: Ulid,
    /// Sorted by `span.start`.
    pub windows: Vec<AvailabilityWindow>,
    /// Sorted by `span.start`; untimed bookings sort first.
    pub bookings: Vec<Booking>,
}

impl ScheduleState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            windows: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = booking.sort_key();
        let pos = self.bookings.partition_point(|b| b.sort_key() <= key);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Drop every window overlapping `range` and insert `windows` in its place.
    pub fn replace_windows(&mut self, range: &Span, windows: Vec<AvailabilityWindow>) {
        self.windows.retain(|w| !w.span.overlaps(range));
        self.windows.extend(windows);
        self.windows.sort_by_key(|w| w.span.start);
    }

    /// Windows whose span overlaps the query.
    pub fn windows_overlapping(&self, query: &Span) -> impl Iterator<Item = &AvailabilityWindow> {
        let earliest = earliest_overlapping_start(query);
        let left_bound = self.windows.partition_point(|w| w.span.start < earliest);
        let right_bound = self.windows.partition_point(|w| w.span.start < query.end);
        self.windows[left_bound..right_bound]
            .iter()
            .filter(move |w| w.span.end > query.start)
    }

    /// Timed bookings (any status) whose span overlaps the query.
    /// Both ends are binary searched: untimed bookings, bookings too old to reach
    /// `query.start`, and bookings starting at or after `query.end` are never visited.
    pub fn bookings_overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let earliest = earliest_overlapping_start(query);
        let left_bound = self
            .bookings
            .partition_point(|b| b.span.is_none_or(|s| s.start < earliest));
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.is_none_or(|s| s.start < query.end));
        self.bookings[left_bound..right_bound]
            .iter()
            .filter(move |b| b.span.is_some_and(|s| s.end > query.start))
    }

    /// Bookings that have not been given a time.
    pub fn untimed(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().take_while(|b| b.span.is_none())
    }
}

/// Stored spans are at most `MAX_SPAN_DURATION_MS` wide, so nothing starting
/// earlier than this can reach `query.start`.
fn earliest_overlapping_start(query: &Span) -> Ms {
    query.start.saturating_sub(MAX_SPAN_DURATION_MS)
}

/// The event types. Flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserUpserted {
        id: Ulid,
        role: Role,
        name: String,
        email: Option<String>,
        phone: Option<String>,
        assigned_to: Option<String>,
    },
    UserRemoved {
        id: Ulid,
    },
    /// Old windows overlapping `range` are dropped and `windows` inserted, as one record.
    WindowsReplaced {
        resource_id: Ulid,
        range: Span,
        windows: Vec<(Ulid, Span)>,
    },
    BookingCreated {
        id: Ulid,
        resource_id: Ulid,
        subject_id: Option<Ulid>,
        span: Option<Span>,
        status: BookingStatus,
        reason: Option<String>,
        created_at: Ms,
    },
    BookingTimeAssigned {
        id: Ulid,
        resource_id: Ulid,
        span: Span,
    },
    BookingStatusChanged {
        id: Ulid,
        resource_id: Ulid,
        status: BookingStatus,
    },
}

impl Event {
    pub fn user_upserted(user: &UserRecord) -> Self {
        Event::UserUpserted {
            id: user.id,
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            assigned_to: user.assigned_to.clone(),
        }
    }

    pub fn booking_created(booking: &Booking) -> Self {
        Event::BookingCreated {
            id: booking.id,
            resource_id: booking.resource_id,
            subject_id: booking.subject_id,
            span: booking.span,
            status: booking.status,
            reason: booking.reason.clone(),
            created_at: booking.created_at,
        }
    }
}
