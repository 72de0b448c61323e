use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;

use super::SharedSchedule;

/// In-memory projection of the event log.
pub struct InMemoryStore {
    schedules: DashMap<Ulid, SharedSchedule>,
    availability: DashMap<AvailabilityKey, TailorAvailability>,
    /// Reverse lookup: appointment id → tailor id
    appointment_tailor: DashMap<Ulid, Ulid>,
    /// Serializes availability writes so log order matches apply order.
    pub(super) availability_write: Arc<Mutex<()>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            schedules: DashMap::new(),
            availability: DashMap::new(),
            appointment_tailor: DashMap::new(),
            availability_write: Arc::new(Mutex::new(())),
        }
    }

    /// Rebuild from a replayed log. Schedules are assembled unlocked, then shared.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Self::new();
        let mut schedules: HashMap<Ulid, TailorSchedule> = HashMap::new();
        for event in events {
            match event.tailor_id() {
                Some(tailor_id) => {
                    let schedule = schedules
                        .entry(tailor_id)
                        .or_insert_with(|| TailorSchedule::new(tailor_id));
                    store.apply_to_schedule(schedule, event);
                }
                None => store.apply_availability(event),
            }
        }
        for (tailor_id, schedule) in schedules {
            store
                .schedules
                .insert(tailor_id, Arc::new(RwLock::new(schedule)));
        }
        store
    }

    // ── Schedules ────────────────────────────────────────────

    pub fn get_schedule(&self, tailor_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(tailor_id).map(|e| e.value().clone())
    }

    pub fn schedule_or_create(&self, tailor_id: Ulid) -> SharedSchedule {
        self.schedules
            .entry(tailor_id)
            .or_insert_with(|| Arc::new(RwLock::new(TailorSchedule::new(tailor_id))))
            .value()
            .clone()
    }

    pub fn schedules(&self) -> Vec<SharedSchedule> {
        self.schedules.iter().map(|e| e.value().clone()).collect()
    }

    pub fn tailor_for(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_tailor
            .get(appointment_id)
            .map(|e| *e.value())
    }

    // ── Availability ─────────────────────────────────────────

    pub fn get_availability(&self, key: &AvailabilityKey) -> Option<TailorAvailability> {
        self.availability.get(key).map(|e| e.value().clone())
    }

    pub fn availability_of(&self, tailor_id: Ulid) -> Vec<TailorAvailability> {
        let mut records: Vec<_> = self
            .availability
            .iter()
            .filter(|e| e.key().tailor_id == tailor_id)
            .map(|e| e.value().clone())
            .collect();
        records.sort_by_key(|a| a.key());
        records
    }

    pub fn all_availability(&self) -> Vec<TailorAvailability> {
        let mut records: Vec<_> = self.availability.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|a| a.key());
        records
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_availability(&self, event: &Event) {
        match event {
            Event::AvailabilitySet { availability } => {
                self.availability
                    .insert(availability.key(), availability.clone());
            }
            Event::AvailabilityDeactivated {
                tailor_id,
                branch_id,
                day,
                at,
            } => {
                let key = AvailabilityKey {
                    tailor_id: *tailor_id,
                    branch_id: *branch_id,
                    day: *day,
                };
                if let Some(mut record) = self.availability.get_mut(&key) {
                    record.is_active = false;
                    record.updated_at = *at;
                }
            }
            _ => {}
        }
    }

    /// Apply an appointment event to its tailor's schedule (caller holds the lock).
    pub fn apply_to_schedule(&self, schedule: &mut TailorSchedule, event: &Event) {
        match event {
            Event::AppointmentBooked { appointment } => {
                schedule.remove(appointment.id);
                schedule.insert(appointment.clone());
                self.appointment_tailor
                    .insert(appointment.id, appointment.tailor_id);
            }
            Event::AppointmentStatusChanged {
                id,
                status,
                notes,
                at,
                ..
            } => {
                if let Some(a) = schedule.get_mut(*id) {
                    a.status = *status;
                    if let Some(notes) = notes {
                        a.tailor_notes = Some(notes.clone());
                    }
                    if *status == AppointmentStatus::Completed {
                        a.completed_at = Some(*at);
                    }
                    a.updated_at = *at;
                }
            }
            Event::AppointmentRescheduled {
                id,
                scheduled_date,
                at,
                ..
            } => {
                // Re-insert to keep start order.
                if let Some(mut a) = schedule.remove(*id) {
                    a.scheduled_date = *scheduled_date;
                    a.status = AppointmentStatus::Rescheduled;
                    a.reschedule_count += 1;
                    a.updated_at = *at;
                    schedule.insert(a);
                }
            }
            Event::AppointmentCancelled { id, reason, at, .. } => {
                if let Some(a) = schedule.get_mut(*id) {
                    a.status = AppointmentStatus::Cancelled;
                    a.cancellation_reason = Some(reason.clone());
                    a.cancelled_at = Some(*at);
                    a.updated_at = *at;
                }
            }
            Event::AppointmentUpdated {
                id,
                duration_minutes,
                customer_notes,
                tailor_notes,
                at,
                ..
            } => {
                if let Some(a) = schedule.get_mut(*id) {
                    if let Some(minutes) = duration_minutes {
                        a.duration_minutes = *minutes;
                    }
                    if let Some(notes) = customer_notes {
                        a.customer_notes = Some(notes.clone());
                    }
                    if let Some(notes) = tailor_notes {
                        a.tailor_notes = Some(notes.clone());
                    }
                    a.updated_at = *at;
                }
            }
            Event::AppointmentDeleted { id, .. } => {
                schedule.remove(*id);
                self.appointment_tailor.remove(id);
            }
            Event::ReminderSent { id, .. } => {
                if let Some(a) = schedule.get_mut(*id) {
                    a.reminder_sent = true;
                }
            }
            Event::AvailabilitySet { .. } | Event::AvailabilityDeactivated { .. } => {}
        }
    }
}
