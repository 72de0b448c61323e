use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Naive wall-clock timestamp. Zone conventions are fixed at the deployment boundary.
pub type Timestamp = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn from_minutes(start: Timestamp, minutes: u32) -> Self {
        Self::new(start, start + TimeDelta::minutes(i64::from(minutes)))
    }

    /// `None` when the end falls past the representable range or `minutes` is zero.
    pub fn try_from_minutes(start: Timestamp, minutes: u32) -> Option<Self> {
        let end = start.checked_add_signed(TimeDelta::minutes(i64::from(minutes)))?;
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

/// Identity of an availability record. At most one record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AvailabilityKey {
    pub tailor_id: Ulid,
    pub branch_id: Ulid,
    pub day: DayOfWeek,
}

/// A tailor's working hours at one branch on one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailorAvailability {
    pub tailor_id: Ulid,
    pub branch_id: Ulid,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: u32,
    /// Carried for slot-density decisions; slots are generated back-to-back.
    pub buffer_time_minutes: u32,
    pub max_appointments_per_day: Option<u32>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TailorAvailability {
    pub fn key(&self) -> AvailabilityKey {
        AvailabilityKey {
            tailor_id: self.tailor_id,
            branch_id: self.branch_id,
            day: self.day_of_week,
        }
    }
}

/// Working hours as supplied by a tailor or admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityHours {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_slot_minutes")]
    pub slot_duration_minutes: u32,
    #[serde(default = "default_buffer_minutes")]
    pub buffer_time_minutes: u32,
    #[serde(default)]
    pub max_appointments_per_day: Option<u32>,
}

fn default_slot_minutes() -> u32 {
    30
}

fn default_buffer_minutes() -> u32 {
    10
}

/// The resolved working window of a tailor for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: u32,
    pub buffer_time_minutes: u32,
    pub max_appointments_per_day: Option<u32>,
}

impl From<&TailorAvailability> for WorkingWindow {
    fn from(a: &TailorAvailability) -> Self {
        Self {
            start_time: a.start_time,
            end_time: a.end_time,
            slot_duration_minutes: a.slot_duration_minutes,
            buffer_time_minutes: a.buffer_time_minutes,
            max_appointments_per_day: a.max_appointments_per_day,
        }
    }
}

impl WorkingWindow {
    /// The window placed on a calendar date.
    pub fn on(&self, date: NaiveDate) -> Option<Span> {
        let start = date.and_time(self.start_time);
        let end = date.and_time(self.end_time);
        (start < end).then(|| Span::new(start, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
    NoShow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Measurement,
    Fitting,
    Delivery,
    Consultation,
    Alteration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub tailor_id: Ulid,
    pub branch_id: Ulid,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub scheduled_date: Timestamp,
    pub duration_minutes: u32,
    pub is_priority: bool,
    pub is_rush: bool,
    pub customer_notes: Option<String>,
    pub tailor_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub reminder_sent: bool,
    pub original_appointment_id: Option<Ulid>,
    pub reschedule_count: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::from_minutes(self.scheduled_date, self.duration_minutes)
    }
}

/// Every appointment of one tailor, sorted by `scheduled_date`.
#[derive(Debug, Clone)]
pub struct TailorSchedule {
    pub tailor_id: Ulid,
    pub appointments: Vec<Appointment>,
}

impl TailorSchedule {
    pub fn new(tailor_id: Ulid) -> Self {
        Self {
            tailor_id,
            appointments: Vec::new(),
        }
    }

    /// Insert maintaining sort order by `scheduled_date`.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.scheduled_date <= appointment.scheduled_date);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Appointments (any status) whose interval overlaps `query`.
    /// Everything at or past the partition point starts at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.scheduled_date < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span().end > query.start)
    }
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AvailabilitySet {
        availability: TailorAvailability,
    },
    AvailabilityDeactivated {
        tailor_id: Ulid,
        branch_id: Ulid,
        day: DayOfWeek,
        at: Timestamp,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        id: Ulid,
        tailor_id: Ulid,
        status: AppointmentStatus,
        notes: Option<String>,
        at: Timestamp,
    },
    AppointmentRescheduled {
        id: Ulid,
        tailor_id: Ulid,
        scheduled_date: Timestamp,
        at: Timestamp,
    },
    AppointmentCancelled {
        id: Ulid,
        tailor_id: Ulid,
        reason: String,
        at: Timestamp,
    },
    AppointmentUpdated {
        id: Ulid,
        tailor_id: Ulid,
        duration_minutes: Option<u32>,
        customer_notes: Option<String>,
        tailor_notes: Option<String>,
        at: Timestamp,
    },
    AppointmentDeleted {
        id: Ulid,
        tailor_id: Ulid,
    },
    ReminderSent {
        id: Ulid,
        tailor_id: Ulid,
    },
}

impl Event {
    /// The tailor whose schedule this event touches, if any.
    pub fn tailor_id(&self) -> Option<Ulid> {
        match self {
            Event::AppointmentBooked { appointment } => Some(appointment.tailor_id),
            Event::AppointmentStatusChanged { tailor_id, .. }
            | Event::AppointmentRescheduled { tailor_id, .. }
            | Event::AppointmentCancelled { tailor_id, .. }
            | Event::AppointmentUpdated { tailor_id, .. }
            | Event::AppointmentDeleted { tailor_id, .. }
            | Event::ReminderSent { tailor_id, .. } => Some(*tailor_id),
            Event::AvailabilitySet { .. } | Event::AvailabilityDeactivated { .. } => None,
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub tailor_id: Ulid,
    pub branch_id: Ulid,
    /// Required when staff, an admin or a tailor books on a customer's behalf.
    #[serde(default)]
    pub customer_id: Option<Ulid>,
    pub appointment_type: AppointmentType,
    pub scheduled_date: Timestamp,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub customer_notes: Option<String>,
    #[serde(default)]
    pub is_priority: bool,
    #[serde(default)]
    pub is_rush: bool,
}

fn default_duration_minutes() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub new_scheduled_date: Timestamp,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub cancellation_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentUpdate {
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub customer_notes: Option<String>,
    #[serde(default)]
    pub tailor_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentFilter {
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub from_date: Option<Timestamp>,
    #[serde(default)]
    pub to_date: Option<Timestamp>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for AppointmentFilter {
    fn default() -> Self {
        Self {
            status: None,
            from_date: None,
            to_date: None,
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub tailor_id: Ulid,
    pub tailor_name: String,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub branch_id: Ulid,
    pub available_slots: Vec<SlotView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub appointments: Vec<Appointment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn appointment(start: Timestamp, minutes: u32) -> Appointment {
        Appointment {
            id: Ulid::new(),
            customer_id: Ulid::new(),
            tailor_id: Ulid::new(),
            branch_id: Ulid::new(),
            appointment_type: AppointmentType::Fitting,
            status: AppointmentStatus::Pending,
            scheduled_date: start,
            duration_minutes: minutes,
            is_priority: false,
            is_rush: false,
            customer_notes: None,
            tailor_notes: None,
            cancellation_reason: None,
            reminder_sent: false,
            original_appointment_id: None,
            reschedule_count: 0,
            created_at: start,
            updated_at: start,
            cancelled_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(at(10, 0), at(10, 30));
        let b = Span::new(at(10, 15), at(10, 45));
        let c = Span::new(at(10, 30), at(11, 0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching
        assert_eq!(a.duration_minutes(), 30);
    }

    #[test]
    fn checked_span_at_the_end_of_time() {
        assert_eq!(Span::try_from_minutes(at(10, 0), 30), Some(Span::new(at(10, 0), at(10, 30))));
        assert_eq!(Span::try_from_minutes(at(10, 0), 0), None);
        assert_eq!(Span::try_from_minutes(NaiveDateTime::MAX, 1), None);
    }

    #[test]
    fn day_of_week_from_date() {
        // 2026-03-02 is a Monday
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(DayOfWeek::of(date), DayOfWeek::Monday);
        assert_eq!(DayOfWeek::of(date.succ_opt().unwrap()), DayOfWeek::Tuesday);
        assert_eq!(DayOfWeek::Sunday.as_str(), "sunday");
    }

    #[test]
    fn working_window_on_date() {
        let window = WorkingWindow {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            slot_duration_minutes: 60,
            buffer_time_minutes: 0,
            max_appointments_per_day: None,
        };
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(window.on(date), Some(Span::new(at(9, 0), at(12, 0))));
    }

    #[test]
    fn schedule_keeps_start_order() {
        let mut schedule = TailorSchedule::new(Ulid::new());
        schedule.insert(appointment(at(14, 0), 30));
        schedule.insert(appointment(at(9, 0), 30));
        schedule.insert(appointment(at(11, 0), 30));
        let starts: Vec<_> = schedule.appointments.iter().map(|a| a.scheduled_date).collect();
        assert_eq!(starts, vec![at(9, 0), at(11, 0), at(14, 0)]);
    }

    #[test]
    fn schedule_remove_nonexistent_returns_none() {
        let mut schedule = TailorSchedule::new(Ulid::new());
        schedule.insert(appointment(at(9, 0), 30));
        assert!(schedule.remove(Ulid::new()).is_none());
        assert_eq!(schedule.appointments.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut schedule = TailorSchedule::new(Ulid::new());
        schedule.insert(appointment(at(8, 0), 60)); // ends 9:00, touching
        schedule.insert(appointment(at(9, 30), 60));
        schedule.insert(appointment(at(11, 0), 30)); // starts at query end
        let query = Span::new(at(9, 0), at(11, 0));
        let hits: Vec<_> = schedule.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].scheduled_date, at(9, 30));
    }

    #[test]
    fn overlapping_long_appointment_spanning_query() {
        let mut schedule = TailorSchedule::new(Ulid::new());
        schedule.insert(appointment(at(8, 0), 240));
        let query = Span::new(at(10, 0), at(10, 30));
        assert_eq!(schedule.overlapping(&query).count(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::AppointmentBooked {
            appointment: appointment(at(10, 0), 45),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
