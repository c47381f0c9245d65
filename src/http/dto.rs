//! Wire types. Timestamps are RFC 3339 on the wire and unix millis inside.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{EngineError, SubjectKey};
use crate::model::*;

pub fn to_ms(t: DateTime<Utc>) -> Ms {
    t.timestamp_millis()
}

pub fn from_ms(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// The half-open span covering `date` in the clinic's local offset.
pub fn day_span(date: NaiveDate, offset: FixedOffset) -> Result<Span, EngineError> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(offset).single())
        .ok_or_else(|| EngineError::Validation(format!("date out of range: {date}")))?
        .timestamp_millis();
    Ok(Span::new(start, start + 24 * 60 * MINUTE_MS))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpanBody {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SpanBody {
    pub fn to_span(self) -> Result<Span, EngineError> {
        Span::try_new(to_ms(self.start), to_ms(self.end)).ok_or_else(|| {
            EngineError::Validation(format!("start {} must be before end {}", self.start, self.end))
        })
    }
}

impl From<Span> for SpanBody {
    fn from(span: Span) -> Self {
        Self {
            start: from_ms(span.start),
            end: from_ms(span.end),
        }
    }
}

/// Subject given either by id or by email / phone.
#[derive(Debug, Default, Deserialize)]
pub struct SubjectRef {
    pub subject_id: Option<Ulid>,
    pub contact: Option<String>,
}

impl SubjectRef {
    pub fn key(&self) -> Option<SubjectKey> {
        match (&self.subject_id, &self.contact) {
            (Some(id), _) => Some(SubjectKey::Id(*id)),
            (None, Some(c)) if !c.trim().is_empty() => Some(SubjectKey::Contact(c.clone())),
            _ => None,
        }
    }
}

// ── Users ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserBody {
    pub role: Role,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub assigned_to: Option<String>,
}

impl UserBody {
    pub fn into_record(self, id: Ulid) -> UserRecord {
        UserRecord {
            id,
            role: self.role,
            name: self.name,
            email: self.email,
            phone: self.phone,
            assigned_to: self.assigned_to,
        }
    }
}

// ── Availability ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub subject_id: Option<Ulid>,
    pub contact: Option<String>,
    /// Slot length in minutes; overrides `urgent`.
    pub duration: Option<u32>,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub staff_id: Ulid,
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub slots: Vec<SpanBody>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl RangeQuery {
    pub fn to_span(&self) -> Result<Span, EngineError> {
        SpanBody {
            start: self.from,
            end: self.to,
        }
        .to_span()
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplaceWindowsBody {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub windows: Vec<SpanBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowView {
    pub id: Ulid,
    pub staff_id: Ulid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<AvailabilityWindow> for WindowView {
    fn from(w: AvailabilityWindow) -> Self {
        Self {
            id: w.id,
            staff_id: w.resource_id,
            start: from_ms(w.span.start),
            end: from_ms(w.span.end),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BusyBody {
    pub periods: Vec<SpanBody>,
}

// ── Bookings ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub id: Option<Ulid>,
    /// Book this staff member directly; otherwise the subject's assigned one.
    pub staff_id: Option<Ulid>,
    #[serde(flatten)]
    pub subject: SubjectRef,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: Option<BookingStatus>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrgentBody {
    pub id: Option<Ulid>,
    #[serde(flatten)]
    pub subject: SubjectRef,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingView {
    pub id: Ulid,
    pub staff_id: Ulid,
    pub subject_id: Option<Ulid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            staff_id: b.resource_id,
            subject_id: b.subject_id,
            start: b.span.map(|s| from_ms(s.start)),
            end: b.span.map(|s| from_ms(s.end)),
            status: b.status,
            reason: b.reason,
            created_at: from_ms(b.created_at),
        }
    }
}
