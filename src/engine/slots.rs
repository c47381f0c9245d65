use crate::model::*;

// ── Slot calculator ──────────────────────────────────────────────

/// Bookable fixed-duration slots inside `windows` that avoid every active booking.
///
/// Each window is walked on its own grid starting at `window.start`; a candidate
/// must fit entirely inside its window. Cancelled and untimed bookings are ignored.
/// Overlapping windows are not merged, so they can yield duplicate slots.
/// The result is sorted by start (stable: ties keep window order).
pub fn compute_available_slots(
    windows: &[AvailabilityWindow],
    bookings: &[Booking],
    slot_duration_minutes: u32,
) -> Vec<Slot> {
    compute_available_slots_with_busy(windows, bookings, &[], slot_duration_minutes)
}

/// Same as [`compute_available_slots`], also excluding external busy periods.
pub fn compute_available_slots_with_busy(
    windows: &[AvailabilityWindow],
    bookings: &[Booking],
    busy: &[BusyPeriod],
    slot_duration_minutes: u32,
) -> Vec<Slot> {
    if slot_duration_minutes == 0 {
        return Vec::new();
    }
    let step = Ms::from(slot_duration_minutes) * MINUTE_MS;

    let occupied: Vec<Span> = bookings
        .iter()
        .filter(|b| b.is_active())
        .filter_map(|b| b.span)
        .chain(busy.iter().copied())
        .collect();

    let mut slots = Vec::new();
    for window in windows {
        let mut cursor = window.span.start;
        // Trailing partial slots are dropped.
        while cursor + step <= window.span.end {
            let candidate = Span::new(cursor, cursor + step);
            if !occupied.iter().any(|o| o.overlaps(&candidate)) {
                slots.push(candidate);
            }
            cursor += step;
        }
    }

    slots.sort_by_key(|s| s.start);
    slots
}

/// Collapse exact duplicates in a sorted slot list.
pub fn dedup_slots(mut slots: Vec<Slot>) -> Vec<Slot> {
    slots.dedup();
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const M: Ms = MINUTE_MS;

    fn window(start: Ms, end: Ms) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Ulid::new(),
            resource_id: Ulid::nil(),
            span: Span::new(start, end),
        }
    }

    fn booking(start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: Ulid::nil(),
            subject_id: None,
            span: Some(Span::new(start, end)),
            status,
            reason: None,
            created_at: 0,
        }
    }

    #[test]
    fn free_hour_yields_two_half_hours() {
        let slots = compute_available_slots(&[window(9 * H, 10 * H)], &[], 30);
        assert_eq!(
            slots,
            vec![Span::new(9 * H, 9 * H + 30 * M), Span::new(9 * H + 30 * M, 10 * H)]
        );
    }

    #[test]
    fn booking_straddling_both_candidates_empties_window() {
        let slots = compute_available_slots(
            &[window(9 * H, 10 * H)],
            &[booking(9 * H + 15 * M, 9 * H + 45 * M, BookingStatus::Scheduled)],
            30,
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn trailing_partial_slot_is_dropped() {
        let slots = compute_available_slots(&[window(9 * H, 9 * H + 50 * M)], &[], 30);
        assert_eq!(slots, vec![Span::new(9 * H, 9 * H + 30 * M)]);
    }

    #[test]
    fn overlapping_windows_produce_duplicates() {
        let slots = compute_available_slots(
            &[window(9 * H, 10 * H), window(9 * H + 30 * M, 10 * H + 30 * M)],
            &[],
            30,
        );
        assert_eq!(
            slots,
            vec![
                Span::new(9 * H, 9 * H + 30 * M),
                Span::new(9 * H + 30 * M, 10 * H),
                Span::new(9 * H + 30 * M, 10 * H),
                Span::new(10 * H, 10 * H + 30 * M),
            ]
        );
        assert_eq!(dedup_slots(slots).len(), 3);
    }

    #[test]
    fn no_windows_no_slots() {
        let slots = compute_available_slots(&[], &[booking(0, H, BookingStatus::Confirmed)], 15);
        assert!(slots.is_empty());
    }

    #[test]
    fn booking_containing_window_blocks_everything() {
        let slots = compute_available_slots(
            &[window(9 * H, 10 * H)],
            &[booking(8 * H, 11 * H, BookingStatus::Pending)],
            15,
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn cancelled_booking_is_ignored() {
        let slots = compute_available_slots(
            &[window(9 * H, 10 * H)],
            &[booking(9 * H, 10 * H, BookingStatus::Cancelled)],
            30,
        );
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn touching_booking_does_not_block() {
        let slots = compute_available_slots(
            &[window(9 * H, 10 * H)],
            &[booking(8 * H, 9 * H, BookingStatus::Confirmed), booking(10 * H, 11 * H, BookingStatus::Confirmed)],
            30,
        );
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn untimed_booking_is_ignored() {
        let mut pending = booking(0, 1, BookingStatus::Pending);
        pending.span = None;
        let slots = compute_available_slots(&[window(9 * H, 10 * H)], &[pending], 30);
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn grid_is_fixed_not_packed() {
        // Booking 9:10-9:20 knocks out the 9:00 slot; the next slot is still 9:30, not 9:20.
        let slots = compute_available_slots(
            &[window(9 * H, 10 * H)],
            &[booking(9 * H + 10 * M, 9 * H + 20 * M, BookingStatus::Scheduled)],
            30,
        );
        assert_eq!(slots, vec![Span::new(9 * H + 30 * M, 10 * H)]);
    }

    #[test]
    fn busy_periods_block_like_bookings() {
        let slots = compute_available_slots_with_busy(
            &[window(9 * H, 10 * H)],
            &[],
            &[Span::new(9 * H + 40 * M, 9 * H + 50 * M)],
            30,
        );
        assert_eq!(slots, vec![Span::new(9 * H, 9 * H + 30 * M)]);
    }

    #[test]
    fn zero_duration_yields_nothing() {
        assert!(compute_available_slots(&[window(9 * H, 10 * H)], &[], 0).is_empty());
    }

    #[test]
    fn output_is_sorted_across_windows() {
        let slots = compute_available_slots(&[window(14 * H, 15 * H), window(9 * H, 10 * H)], &[], 60);
        assert_eq!(slots, vec![Span::new(9 * H, 10 * H), Span::new(14 * H, 15 * H)]);
    }

    // ── properties ─────────────────────────────────────────────

    fn arb_status() -> impl Strategy<Value = BookingStatus> {
        prop_oneof![
            Just(BookingStatus::Pending),
            Just(BookingStatus::Scheduled),
            Just(BookingStatus::Confirmed),
            Just(BookingStatus::Cancelled),
        ]
    }

    fn arb_windows() -> impl Strategy<Value = Vec<AvailabilityWindow>> {
        prop::collection::vec((0i64..1_440, 1i64..300), 0..6).prop_map(|ws| {
            ws.into_iter()
                .map(|(s, len)| window(s * M, (s + len) * M))
                .collect()
        })
    }

    /// Non-overlapping windows laid out left to right with gaps.
    fn arb_disjoint_windows() -> impl Strategy<Value = Vec<AvailabilityWindow>> {
        prop::collection::vec((0i64..120, 1i64..240), 0..6).prop_map(|ws| {
            let mut cursor = 0;
            ws.into_iter()
                .map(|(gap, len)| {
                    let start = cursor + gap * M;
                    cursor = start + len * M;
                    window(start, cursor)
                })
                .collect()
        })
    }

    fn arb_bookings() -> impl Strategy<Value = Vec<Booking>> {
        prop::collection::vec((0i64..1_440, 1i64..120, arb_status()), 0..8).prop_map(|bs| {
            bs.into_iter()
                .map(|(s, len, status)| booking(s * M, (s + len) * M, status))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn slots_fit_have_exact_duration_and_avoid_active_bookings(
            windows in arb_windows(),
            bookings in arb_bookings(),
            minutes in 1u32..90,
        ) {
            let slots = compute_available_slots(&windows, &bookings, minutes);
            for slot in &slots {
                prop_assert_eq!(slot.duration_ms(), Ms::from(minutes) * M);
                prop_assert!(windows.iter().any(|w| w.span.contains_span(slot)));
                for b in bookings.iter().filter(|b| b.is_active()) {
                    prop_assert!(!b.span.unwrap().overlaps(slot));
                }
            }
            prop_assert!(slots.windows(2).all(|p| p[0].start <= p[1].start));
        }

        #[test]
        fn disjoint_windows_give_non_overlapping_slots(
            windows in arb_disjoint_windows(),
            bookings in arb_bookings(),
            minutes in 1u32..90,
        ) {
            let slots = compute_available_slots(&windows, &bookings, minutes);
            for pair in slots.windows(2) {
                prop_assert!(!pair[0].overlaps(&pair[1]));
            }
        }

        #[test]
        fn deterministic(
            windows in arb_windows(),
            bookings in arb_bookings(),
            minutes in 1u32..90,
        ) {
            let a = compute_available_slots(&windows, &bookings, minutes);
            let b = compute_available_slots(&windows, &bookings, minutes);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn cancelled_bookings_never_change_the_result(
            windows in arb_windows(),
            bookings in arb_bookings(),
            minutes in 1u32..90,
        ) {
            let active: Vec<Booking> = bookings.iter().filter(|b| b.is_active()).cloned().collect();
            prop_assert_eq!(
                compute_available_slots(&windows, &bookings, minutes),
                compute_available_slots(&windows, &active, minutes)
            );
        }
    }
}
