use chrono::{NaiveDate, TimeDelta};

use crate::model::*;

// ── Working window + slot generation ───────────────────────────────

/// A missing or inactive record means the tailor is off that day.
pub fn resolve_window(record: Option<&TailorAvailability>) -> Option<WorkingWindow> {
    record.filter(|a| a.is_active).map(WorkingWindow::from)
}

/// Back-to-back slots of `slot_duration_minutes` inside a working window.
///
/// Buffer time inserts no gap. A trailing partial slot is never emitted.
#[derive(Debug, Clone)]
pub struct Slots {
    next_start: Timestamp,
    window_end: Timestamp,
    step: TimeDelta,
}

impl Iterator for Slots {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.step <= TimeDelta::zero() {
            return None;
        }
        let end = self.next_start.checked_add_signed(self.step)?;
        if end > self.window_end {
            return None;
        }
        let slot = Span::new(self.next_start, end);
        self.next_start = end;
        Some(slot)
    }
}

pub fn generate_slots(window: &WorkingWindow, date: NaiveDate) -> Slots {
    let start = date.and_time(window.start_time);
    Slots {
        next_start: start,
        // An inverted window yields nothing.
        window_end: date.and_time(window.end_time).max(start),
        step: TimeDelta::minutes(i64::from(window.slot_duration_minutes)),
    }
}

/// Mark each slot against busy intervals. `busy` need not be sorted.
pub fn mark_slots(slots: Slots, busy: &[Span]) -> Vec<(Span, bool)> {
    let mut sorted = busy.to_vec();
    sorted.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&sorted);

    // Slots ascend, so the cursor only moves forward.
    let mut bi = 0;
    slots
        .map(|slot| {
            while bi < busy.len() && busy[bi].end <= slot.start {
                bi += 1;
            }
            let free = busy.get(bi).is_none_or(|b| !b.overlaps(&slot));
            (slot, free)
        })
        .collect()
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use ulid::Ulid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> Timestamp {
        date().and_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: (u32, u32), end: (u32, u32), slot: u32) -> WorkingWindow {
        WorkingWindow {
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            slot_duration_minutes: slot,
            buffer_time_minutes: 10,
            max_appointments_per_day: None,
        }
    }

    fn record(active: bool) -> TailorAvailability {
        TailorAvailability {
            tailor_id: Ulid::new(),
            branch_id: Ulid::new(),
            day_of_week: DayOfWeek::Monday,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            slot_duration_minutes: 30,
            buffer_time_minutes: 10,
            max_appointments_per_day: Some(8),
            is_active: active,
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    // ── resolve_window ────────────────────────────────────

    #[test]
    fn resolve_active_record() {
        let r = record(true);
        let w = resolve_window(Some(&r)).unwrap();
        assert_eq!(w.slot_duration_minutes, 30);
        assert_eq!(w.max_appointments_per_day, Some(8));
    }

    #[test]
    fn resolve_inactive_or_missing_is_off_day() {
        assert_eq!(resolve_window(Some(&record(false))), None);
        assert_eq!(resolve_window(None), None);
    }

    // ── generate_slots ────────────────────────────────────

    #[test]
    fn three_hour_window_hourly_slots() {
        let slots: Vec<_> = generate_slots(&window((9, 0), (12, 0), 60), date()).collect();
        assert_eq!(
            slots,
            vec![
                Span::new(at(9, 0), at(10, 0)),
                Span::new(at(10, 0), at(11, 0)),
                Span::new(at(11, 0), at(12, 0)),
            ]
        );
    }

    #[test]
    fn trailing_partial_slot_dropped() {
        let slots: Vec<_> = generate_slots(&window((9, 0), (11, 30), 60), date()).collect();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].end, at(11, 0));
    }

    #[test]
    fn zero_duration_or_short_window_yields_nothing() {
        assert_eq!(generate_slots(&window((9, 0), (12, 0), 0), date()).count(), 0);
        assert_eq!(generate_slots(&window((9, 0), (9, 20), 30), date()).count(), 0);
        assert_eq!(generate_slots(&window((12, 0), (9, 0), 30), date()).count(), 0);
    }

    #[test]
    fn last_representable_day_does_not_overflow() {
        let late = window((23, 0), (23, 59), 480);
        assert_eq!(generate_slots(&late, NaiveDate::MAX).count(), 0);
        let early = window((9, 0), (10, 0), 30);
        assert_eq!(generate_slots(&early, NaiveDate::MAX).count(), 2);
    }

    #[test]
    fn slots_restart_from_a_clone() {
        let slots = generate_slots(&window((9, 0), (10, 0), 15), date());
        let first: Vec<_> = slots.clone().collect();
        let second: Vec<_> = slots.collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn buffer_inserts_no_gap() {
        let slots: Vec<_> = generate_slots(&window((9, 0), (10, 0), 30), date()).collect();
        assert_eq!(slots[0].end, slots[1].start);
    }

    // ── mark_slots ────────────────────────────────────────

    #[test]
    fn marks_overlapped_slots_busy() {
        let slots = generate_slots(&window((9, 0), (12, 0), 60), date());
        let busy = vec![Span::new(at(10, 30), at(10, 45))];
        let marked: Vec<bool> = mark_slots(slots, &busy).into_iter().map(|(_, f)| f).collect();
        assert_eq!(marked, vec![true, false, true]);
    }

    #[test]
    fn touching_busy_interval_leaves_slot_free() {
        let slots = generate_slots(&window((9, 0), (11, 0), 60), date());
        let busy = vec![Span::new(at(8, 0), at(9, 0)), Span::new(at(11, 0), at(11, 30))];
        assert!(mark_slots(slots, &busy).iter().all(|(_, free)| *free));
    }

    #[test]
    fn unsorted_busy_intervals_spanning_slots() {
        let slots = generate_slots(&window((9, 0), (13, 0), 60), date());
        let busy = vec![
            Span::new(at(12, 15), at(12, 30)),
            Span::new(at(9, 30), at(11, 10)),
        ];
        let marked: Vec<bool> = mark_slots(slots, &busy).into_iter().map(|(_, f)| f).collect();
        assert_eq!(marked, vec![false, false, false, false]);
    }

    // ── merge_overlapping ─────────────────────────────────

    #[test]
    fn merge_adjacent_and_overlapping() {
        let merged = merge_overlapping(&[
            Span::new(at(9, 0), at(9, 30)),
            Span::new(at(9, 30), at(10, 0)),
            Span::new(at(9, 45), at(10, 15)),
            Span::new(at(11, 0), at(11, 30)),
        ]);
        assert_eq!(
            merged,
            vec![Span::new(at(9, 0), at(10, 15)), Span::new(at(11, 0), at(11, 30))]
        );
    }
}
