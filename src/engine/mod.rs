mod conflict;
mod directory;
mod error;
mod mutations;
mod queries;
mod slots;

pub use conflict::{first_conflict, has_conflict};
pub use directory::{resolve_assignment, SubjectKey};
pub use error::EngineError;
pub use mutations::NewBooking;
pub use slots::{compute_available_slots, compute_available_slots_with_busy, dedup_slots};

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::calendar::CalendarProvider;
use crate::journal::{Journal, MemoryJournal, WalJournal};
use crate::model::*;

pub type SharedSchedule = Arc<RwLock<ScheduleState>>;

pub struct Engine {
    pub(super) schedules: DashMap<Ulid, SharedSchedule>,
    pub(super) users: DashMap<Ulid, UserRecord>,
    /// Reverse lookup: booking id → staff (resource) id
    pub(super) booking_to_resource: DashMap<Ulid, Ulid>,
    journal: Box<dyn Journal>,
    pub(super) calendar: Arc<dyn CalendarProvider>,
    /// Mutations hold this shared; compaction holds it exclusively so the
    /// snapshot it writes cannot miss a concurrent append.
    pub(super) commit_gate: RwLock<()>,
}

/// Apply a schedule event directly to a ScheduleState (no locking; caller holds the lock).
fn apply_to_schedule(rs: &mut ScheduleState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::WindowsReplaced {
            resource_id,
            range,
            windows,
        } => {
            let windows = windows
                .iter()
                .map(|&(id, span)| AvailabilityWindow {
                    id,
                    resource_id: *resource_id,
                    span,
                })
                .collect();
            rs.replace_windows(range, windows);
        }
        Event::BookingCreated {
            id,
            resource_id,
            subject_id,
            span,
            status,
            reason,
            created_at,
        } => {
            rs.insert_booking(Booking {
                id: *id,
                resource_id: *resource_id,
                subject_id: *subject_id,
                span: *span,
                status: *status,
                reason: reason.clone(),
                created_at: *created_at,
            });
            index.insert(*id, *resource_id);
        }
        Event::BookingTimeAssigned { id, span, .. } => {
            // Re-insert: the sort key changes with the span.
            if let Some(mut booking) = rs.remove_booking(*id) {
                booking.span = Some(*span);
                booking.status = BookingStatus::Scheduled;
                rs.insert_booking(booking);
            }
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(booking) = rs.booking_mut(*id) {
                booking.status = *status;
            }
        }
        // Directory events are handled at the DashMap level, not here
        Event::UserUpserted { .. } | Event::UserRemoved { .. } => {}
    }
}

/// Extract the staff id from a schedule event.
fn event_resource_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::WindowsReplaced { resource_id, .. }
        | Event::BookingCreated { resource_id, .. }
        | Event::BookingTimeAssigned { resource_id, .. }
        | Event::BookingStatusChanged { resource_id, .. } => Some(*resource_id),
        Event::UserUpserted { .. } | Event::UserRemoved { .. } => None,
    }
}

impl Engine {
    /// Durable engine backed by the WAL at `wal_path`.
    pub fn open(wal_path: &Path, calendar: Arc<dyn CalendarProvider>) -> std::io::Result<Self> {
        let (journal, events) = WalJournal::open(wal_path)?;
        Ok(Self::with_journal(Box::new(journal), &events, calendar))
    }

    /// Engine whose state lives only in memory.
    pub fn ephemeral(calendar: Arc<dyn CalendarProvider>) -> Self {
        Self::with_journal(Box::new(MemoryJournal::new()), &[], calendar)
    }

    /// Build from any journal, replaying `events` first.
    pub fn with_journal(
        journal: Box<dyn Journal>,
        events: &[Event],
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        let engine = Self {
            schedules: DashMap::new(),
            users: DashMap::new(),
            booking_to_resource: DashMap::new(),
            journal,
            calendar,
            commit_gate: RwLock::new(()),
        };

        // We're the sole owner of these Arcs, so try_write always succeeds.
        // Never block here: this may run inside an async context.
        for event in events {
            match event_resource_id(event) {
                None => engine.apply_directory(event, None),
                Some(resource_id) => {
                    let Some(rs) = engine.get_schedule(&resource_id) else {
                        continue;
                    };
                    if let Ok(mut guard) = rs.try_write() {
                        apply_to_schedule(&mut guard, event, &engine.booking_to_resource);
                    }
                }
            }
        }

        engine
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_durable()
    }

    pub fn get_schedule(&self, id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_resource.get(booking_id).map(|e| *e.value())
    }

    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        self.journal
            .append(event)
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) async fn journal_compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        self.journal
            .compact(events)
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }

    /// Journal + apply in one call. Caller holds the schedule write lock.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ScheduleState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_schedule(rs, event, &self.booking_to_resource);
        Ok(())
    }

    /// Apply a directory event. `held` is the schedule being dropped when the
    /// caller already holds its lock.
    pub(super) fn apply_directory(&self, event: &Event, held: Option<&ScheduleState>) {
        match event {
            Event::UserUpserted {
                id,
                role,
                name,
                email,
                phone,
                assigned_to,
            } => {
                if role.owns_schedule() {
                    self.schedules
                        .entry(*id)
                        .or_insert_with(|| Arc::new(RwLock::new(ScheduleState::new(*id))));
                } else {
                    self.drop_schedule(id, held);
                }
                self.users.insert(
                    *id,
                    UserRecord {
                        id: *id,
                        role: *role,
                        name: name.clone(),
                        email: email.clone(),
                        phone: phone.clone(),
                        assigned_to: assigned_to.clone(),
                    },
                );
            }
            Event::UserRemoved { id } => {
                self.users.remove(id);
                self.drop_schedule(id, held);
            }
            _ => {}
        }
    }

    fn drop_schedule(&self, id: &Ulid, held: Option<&ScheduleState>) {
        let Some((_, rs)) = self.schedules.remove(id) else {
            return;
        };
        let unindex = |state: &ScheduleState| {
            for b in &state.bookings {
                self.booking_to_resource.remove(&b.id);
            }
        };
        match held {
            Some(state) => unindex(state),
            None => {
                if let Ok(guard) = rs.try_read() {
                    unindex(&guard);
                }
            }
        }
    }

    /// Claim `booking_id` for `resource_id` in the global index. Ids are unique across
    /// every schedule, so this is the only duplicate check that holds under concurrency.
    pub(super) fn reserve_booking_id(
        &self,
        booking_id: Ulid,
        resource_id: Ulid,
    ) -> Result<(), EngineError> {
        match self.booking_to_resource.entry(booking_id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(booking_id)),
            Entry::Vacant(slot) => {
                slot.insert(resource_id);
                Ok(())
            }
        }
    }

    /// Journal and apply a new booking whose id is already reserved. The
    /// reservation is released if anything fails before the booking is applied.
    pub(super) async fn commit_reserved_booking(
        &self,
        rs: &mut ScheduleState,
        booking: &Booking,
    ) -> Result<(), EngineError> {
        let result = self.persist_and_apply(rs, &Event::booking_created(booking)).await;
        if result.is_err() {
            self.booking_to_resource.remove(&booking.id);
        }
        result
    }

    /// Acquire a schedule's write lock, re-checking it was not dropped while we waited.
    pub(super) async fn lock_schedule(
        &self,
        resource_id: Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<ScheduleState>, EngineError> {
        let rs = self
            .get_schedule(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.write_owned().await;
        if !self.schedules.contains_key(&resource_id) {
            return Err(EngineError::NotFound(resource_id));
        }
        Ok(guard)
    }

    /// Lookup booking → staff, get schedule, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ScheduleState>), EngineError> {
        let resource_id = self
            .get_resource_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = self.lock_schedule(resource_id).await?;
        Ok((resource_id, guard))
    }
}
