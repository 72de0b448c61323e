use chrono::Datelike;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now() -> Timestamp {
    chrono::Utc::now().naive_utc()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    let in_range = |t: &Timestamp| (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&t.year());
    if !in_range(&span.start) || !in_range(&span.end) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Build and range-check the interval a request asks for.
pub(crate) fn checked_span(start: Timestamp, minutes: u32) -> Result<Span, EngineError> {
    let span = Span::try_from_minutes(start, minutes)
        .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
    validate_span(&span)?;
    Ok(span)
}

pub(crate) fn validate_duration(minutes: u32) -> Result<(), EngineError> {
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        return Err(EngineError::Validation(
            "duration_minutes must be between 15 and 240",
        ));
    }
    Ok(())
}

/// Whether `candidate` is free for `tailor_id` given `existing` appointments.
///
/// Only live appointments of that tailor count; endpoints are half-open, so an
/// appointment ending at 10:30 does not block one starting at 10:30.
pub fn is_slot_available(tailor_id: Ulid, candidate: &Span, existing: &[Appointment]) -> bool {
    !existing.iter().any(|a| {
        a.tailor_id == tailor_id && a.status.is_live() && a.span().overlaps(candidate)
    })
}

/// First live appointment in `schedule` overlapping `span`, other than `exclude`.
pub(crate) fn check_no_conflict(
    schedule: &TailorSchedule,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let clash = schedule
        .overlapping(span)
        .find(|a| a.status.is_live() && Some(a.id) != exclude);
    match clash {
        Some(a) => Err(EngineError::Conflict {
            with: a.id,
            span: a.span(),
        }),
        None => Ok(()),
    }
}
