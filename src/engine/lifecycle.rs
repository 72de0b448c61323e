use ulid::Ulid;

use crate::model::AppointmentStatus;

use super::EngineError;

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Live appointments occupy the tailor's time and count toward conflicts.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn can_reschedule(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

/// Guard for a direct status assignment by a tailor, staff member or admin.
///
/// Cancellation and rescheduling have their own operations and cannot be set here,
/// and nothing moves back to `pending`.
pub(crate) fn check_status_update(
    id: Ulid,
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), EngineError> {
    use AppointmentStatus::*;

    let allowed = match to {
        Confirmed => matches!(from, Pending | Rescheduled),
        InProgress | NoShow => matches!(from, Pending | Confirmed),
        Completed => from.is_live(),
        Cancelled => return Err(EngineError::Validation("use the cancel operation")),
        Rescheduled => return Err(EngineError::Validation("use the reschedule operation")),
        Pending => return Err(EngineError::Validation("status cannot be reset to pending")),
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::PreconditionFailed { id, status: from })
    }
}

/// Whether moving `from` → `to` puts the appointment back on the tailor's calendar,
/// in which case its interval has to clear the conflict check again.
pub(crate) fn reenters_live_set(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    !from.is_live() && to.is_live()
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    const ALL: [AppointmentStatus; 7] = [
        Pending,
        Confirmed,
        InProgress,
        Completed,
        Cancelled,
        Rescheduled,
        NoShow,
    ];

    #[test]
    fn live_and_terminal_sets() {
        let live: Vec<_> = ALL.into_iter().filter(|s| s.is_live()).collect();
        assert_eq!(live, vec![Pending, Confirmed, InProgress]);
        let terminal: Vec<_> = ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Completed, Cancelled, NoShow]);
        assert!(!Rescheduled.is_live() && !Rescheduled.is_terminal());
    }

    #[test]
    fn cancel_and_reschedule_guards() {
        for s in ALL {
            let expected = matches!(s, Pending | Confirmed);
            assert_eq!(s.can_cancel(), expected, "{s:?}");
            assert_eq!(s.can_reschedule(), expected, "{s:?}");
        }
    }

    #[test]
    fn pending_can_move_forward() {
        let id = Ulid::new();
        for to in [Confirmed, InProgress, Completed, NoShow] {
            assert!(check_status_update(id, Pending, to).is_ok(), "{to:?}");
        }
    }

    #[test]
    fn in_progress_only_completes() {
        let id = Ulid::new();
        assert!(check_status_update(id, InProgress, Completed).is_ok());
        for to in [Confirmed, NoShow] {
            assert!(matches!(
                check_status_update(id, InProgress, to),
                Err(EngineError::PreconditionFailed { status: InProgress, .. })
            ));
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        let id = Ulid::new();
        for from in [Completed, Cancelled, NoShow] {
            for to in [Confirmed, InProgress, Completed, NoShow] {
                assert!(matches!(
                    check_status_update(id, from, to),
                    Err(EngineError::PreconditionFailed { .. })
                ));
            }
        }
    }

    #[test]
    fn rescheduled_can_be_confirmed_again() {
        let id = Ulid::new();
        assert!(check_status_update(id, Rescheduled, Confirmed).is_ok());
        assert!(check_status_update(id, Rescheduled, Completed).is_err());
        assert!(reenters_live_set(Rescheduled, Confirmed));
        assert!(!reenters_live_set(Pending, Confirmed));
    }

    #[test]
    fn dedicated_operations_are_not_assignable() {
        let id = Ulid::new();
        for to in [Cancelled, Rescheduled, Pending] {
            assert!(matches!(
                check_status_update(id, Confirmed, to),
                Err(EngineError::Validation(_))
            ));
        }
    }
}
