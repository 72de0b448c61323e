use std::cmp::Reverse;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::auth::{self, Actor, Role};
use crate::limits::*;
use crate::model::*;

use super::availability::{generate_slots, mark_slots, resolve_window};
use super::{Engine, EngineError, SharedSchedule};

const UNKNOWN_TAILOR: &str = "Unknown Tailor";

impl Engine {
    // ── Availability ─────────────────────────────────────────

    pub fn load_availability(
        &self,
        tailor_id: Ulid,
        branch_id: Ulid,
        day: DayOfWeek,
    ) -> Option<TailorAvailability> {
        self.store.get_availability(&AvailabilityKey { tailor_id, branch_id, day })
    }

    /// The tailor's working window at `branch_id` on `date`; `None` when off that day.
    pub fn resolve(&self, tailor_id: Ulid, branch_id: Ulid, date: NaiveDate) -> Option<WorkingWindow> {
        resolve_window(
            self.load_availability(tailor_id, branch_id, DayOfWeek::of(date))
                .as_ref(),
        )
    }

    /// Every record of a tailor, by branch then weekday.
    pub fn list_availability(&self, tailor_id: Ulid) -> Vec<TailorAvailability> {
        self.store.availability_of(tailor_id)
    }

    /// Live appointments of a tailor overlapping `range`, in start order.
    pub async fn load_live_appointments(&self, tailor_id: Ulid, range: &Span) -> Vec<Appointment> {
        let Some(schedule) = self.store.get_schedule(&tailor_id) else {
            return Vec::new();
        };
        let guard = schedule.read().await;
        guard
            .overlapping(range)
            .filter(|a| a.status.is_live())
            .cloned()
            .collect()
    }

    /// Slots of one day, each marked against the tailor's live appointments.
    pub async fn available_slots(&self, tailor_id: Ulid, branch_id: Ulid, date: NaiveDate) -> DaySlots {
        let mut day = DaySlots {
            date,
            branch_id,
            available_slots: Vec::new(),
        };
        let Some(window) = self.resolve(tailor_id, branch_id, date) else {
            return day;
        };
        let Some(range) = window.on(date) else {
            return day;
        };

        let busy: Vec<Span> = self
            .load_live_appointments(tailor_id, &range)
            .await
            .iter()
            .map(Appointment::span)
            .collect();
        let tailor_name = self
            .directory
            .display_name(&tailor_id)
            .unwrap_or_else(|| UNKNOWN_TAILOR.to_string());

        day.available_slots = mark_slots(generate_slots(&window, date), &busy)
            .into_iter()
            .map(|(slot, is_available)| SlotView {
                start_time: slot.start,
                end_time: slot.end,
                tailor_id,
                tailor_name: tailor_name.clone(),
                is_available,
            })
            .collect();
        day
    }

    // ── Appointments ─────────────────────────────────────────

    pub async fn get_appointment(&self, actor: &Actor, id: Ulid) -> Result<Appointment, EngineError> {
        let tailor_id = self.store.tailor_for(&id).ok_or(EngineError::NotFound(id))?;
        let schedule = self
            .store
            .get_schedule(&tailor_id)
            .ok_or(EngineError::NotFound(id))?;
        let appointment = schedule
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        if !auth::can_access(actor, &appointment) {
            return Err(EngineError::PermissionDenied("not your appointment"));
        }
        Ok(appointment)
    }

    /// Appointments visible to `actor`, newest first.
    pub async fn list_appointments(
        &self,
        actor: &Actor,
        filter: &AppointmentFilter,
    ) -> Result<AppointmentPage, EngineError> {
        if filter.page == 0 {
            return Err(EngineError::Validation("page must be at least 1"));
        }
        if filter.page_size == 0 || filter.page_size > MAX_PAGE_SIZE {
            return Err(EngineError::Validation("page_size must be between 1 and 100"));
        }

        let schedules: Vec<SharedSchedule> = match actor.role {
            Role::Tailor => self.store.get_schedule(&actor.id).into_iter().collect(),
            Role::Customer | Role::Staff | Role::Admin => self.store.schedules(),
        };
        let mut matching = Vec::new();
        for schedule in schedules {
            let guard = schedule.read().await;
            matching.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| auth::can_access(actor, a))
                    .filter(|a| filter.status.is_none_or(|s| a.status == s))
                    .filter(|a| filter.from_date.is_none_or(|from| a.scheduled_date >= from))
                    .filter(|a| filter.to_date.is_none_or(|to| a.scheduled_date <= to))
                    .cloned(),
            );
        }
        matching.sort_by_key(|a| Reverse(a.scheduled_date));

        let total = matching.len();
        let appointments = matching
            .into_iter()
            .skip((filter.page - 1).saturating_mul(filter.page_size))
            .take(filter.page_size)
            .collect();
        Ok(AppointmentPage {
            total,
            page: filter.page,
            page_size: filter.page_size,
            appointments,
        })
    }

    /// Confirmed appointments on the calendar day after `now` that have not been reminded.
    pub async fn collect_due_reminders(&self, now: Timestamp) -> Vec<Appointment> {
        let Some(tomorrow) = now.date().succ_opt() else {
            return Vec::new();
        };
        let mut due = Vec::new();
        for schedule in self.store.schedules() {
            let guard = schedule.read().await;
            due.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| {
                        a.status == AppointmentStatus::Confirmed
                            && !a.reminder_sent
                            && a.scheduled_date.date() == tomorrow
                    })
                    .cloned(),
            );
        }
        due
    }
}
