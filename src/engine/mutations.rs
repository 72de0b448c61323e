use chrono::NaiveTime;
use serde_json::json;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::audit::AuditAction;
use crate::auth::{self, Actor, Role};
use crate::limits::*;
use crate::model::*;
use crate::notify::NotificationKind;
use crate::observability::{BOOKINGS_TOTAL, BOOKING_CONFLICTS_TOTAL};

use super::conflict::{check_no_conflict, checked_span, now, validate_duration};
use super::lifecycle::{check_status_update, reenters_live_set};
use super::{Engine, EngineError, SideEffects, WalCommand};

fn check_text(text: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match text {
        Some(t) if t.chars().count() > max => Err(EngineError::Validation(what)),
        _ => Ok(()),
    }
}

fn validate_hours(hours: &AvailabilityHours) -> Result<(), EngineError> {
    if hours.start_time >= hours.end_time {
        return Err(EngineError::Validation("start_time must be before end_time"));
    }
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&hours.slot_duration_minutes) {
        return Err(EngineError::Validation(
            "slot_duration_minutes must be between 5 and 480",
        ));
    }
    if hours.buffer_time_minutes > MAX_BUFFER_MINUTES {
        return Err(EngineError::Validation(
            "buffer_time_minutes must be at most 240",
        ));
    }
    if hours.max_appointments_per_day == Some(0) {
        return Err(EngineError::Validation(
            "max_appointments_per_day must be at least 1",
        ));
    }
    Ok(())
}

/// Who the appointment is for, given who is asking.
fn booking_customer(actor: &Actor, request: &BookingRequest) -> Result<Ulid, EngineError> {
    match actor.role {
        Role::Customer => match request.customer_id {
            Some(other) if other != actor.id => Err(EngineError::PermissionDenied(
                "customers can only book for themselves",
            )),
            _ => Ok(actor.id),
        },
        Role::Tailor if request.tailor_id != actor.id => Err(EngineError::PermissionDenied(
            "tailors can only book on their own calendar",
        )),
        Role::Tailor | Role::Staff | Role::Admin => request
            .customer_id
            .ok_or(EngineError::Validation("customer_id is required")),
    }
}

impl Engine {
    // ── Availability ─────────────────────────────────────────

    pub async fn set_availability(
        &self,
        actor: &Actor,
        tailor_id: Ulid,
        branch_id: Ulid,
        day: DayOfWeek,
        hours: AvailabilityHours,
    ) -> Result<TailorAvailability, EngineError> {
        if !auth::can_manage_availability(actor, tailor_id) {
            return Err(EngineError::PermissionDenied(
                "only the tailor or an admin can set availability",
            ));
        }
        validate_hours(&hours)?;

        let _gate = self.commit_gate.read().await;
        let key = AvailabilityKey { tailor_id, branch_id, day };
        let at = now();
        let created_at = self
            .store
            .get_availability(&key)
            .map_or(at, |existing| existing.created_at);
        let record = TailorAvailability {
            tailor_id,
            branch_id,
            day_of_week: day,
            start_time: hours.start_time,
            end_time: hours.end_time,
            slot_duration_minutes: hours.slot_duration_minutes,
            buffer_time_minutes: hours.buffer_time_minutes,
            max_appointments_per_day: hours.max_appointments_per_day,
            is_active: true,
            created_at,
            updated_at: at,
        };
        self.persist_availability(Event::AvailabilitySet {
            availability: record.clone(),
        })
        .await?;

        tracing::info!(%tailor_id, %branch_id, day = day.as_str(), "availability set");
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AvailabilityUpdated,
                resource_type: "availability",
                resource_id: format!("{tailor_id}/{branch_id}/{}", day.as_str()),
                details: json!({
                    "start_time": fmt_time(record.start_time),
                    "end_time": fmt_time(record.end_time),
                    "slot_duration_minutes": record.slot_duration_minutes,
                    "buffer_time_minutes": record.buffer_time_minutes,
                }),
                notify: None,
            },
        );
        Ok(record)
    }

    pub async fn deactivate_availability(
        &self,
        actor: &Actor,
        tailor_id: Ulid,
        branch_id: Ulid,
        day: DayOfWeek,
    ) -> Result<TailorAvailability, EngineError> {
        if !auth::can_manage_availability(actor, tailor_id) {
            return Err(EngineError::PermissionDenied(
                "only the tailor or an admin can change availability",
            ));
        }

        let _gate = self.commit_gate.read().await;
        let key = AvailabilityKey { tailor_id, branch_id, day };
        if self.store.get_availability(&key).is_none() {
            return Err(EngineError::NotFound(tailor_id));
        }
        self.persist_availability(Event::AvailabilityDeactivated {
            tailor_id,
            branch_id,
            day,
            at: now(),
        })
        .await?;
        let record = self
            .store
            .get_availability(&key)
            .ok_or(EngineError::NotFound(tailor_id))?;

        tracing::info!(%tailor_id, %branch_id, day = day.as_str(), "availability deactivated");
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AvailabilityDeactivated,
                resource_type: "availability",
                resource_id: format!("{tailor_id}/{branch_id}/{}", day.as_str()),
                details: json!({}),
                notify: None,
            },
        );
        Ok(record)
    }

    // ── Booking ──────────────────────────────────────────────

    /// Reserve the tailor for `request` iff no live appointment overlaps it.
    pub async fn book(&self, actor: &Actor, request: BookingRequest) -> Result<Appointment, EngineError> {
        let customer_id = booking_customer(actor, &request)?;
        validate_duration(request.duration_minutes)?;
        check_text(
            request.customer_notes.as_deref(),
            MAX_NOTES_LEN,
            "customer_notes must be at most 1000 characters",
        )?;
        let span = checked_span(request.scheduled_date, request.duration_minutes)?;

        let _gate = self.commit_gate.read().await;
        let guard = self
            .store
            .schedule_or_create(request.tailor_id)
            .write_owned()
            .await;
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_TAILOR {
            return Err(EngineError::LimitExceeded("too many appointments for tailor"));
        }
        if let Err(e) = check_no_conflict(&guard, &span, None) {
            metrics::counter!(BOOKINGS_TOTAL, "outcome" => "conflict").increment(1);
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let at = now();
        let appointment = Appointment {
            id: Ulid::new(),
            customer_id,
            tailor_id: request.tailor_id,
            branch_id: request.branch_id,
            appointment_type: request.appointment_type,
            status: AppointmentStatus::Pending,
            scheduled_date: request.scheduled_date,
            duration_minutes: request.duration_minutes,
            is_priority: request.is_priority,
            is_rush: request.is_rush,
            customer_notes: request.customer_notes,
            tailor_notes: None,
            cancellation_reason: None,
            reminder_sent: false,
            original_appointment_id: None,
            reschedule_count: 0,
            created_at: at,
            updated_at: at,
            cancelled_at: None,
            completed_at: None,
        };
        let guard = self
            .persist_and_apply(
                guard,
                Event::AppointmentBooked {
                    appointment: appointment.clone(),
                },
            )
            .await?;
        drop(guard);

        metrics::counter!(BOOKINGS_TOTAL, "outcome" => "booked").increment(1);
        tracing::info!(
            id = %appointment.id,
            tailor_id = %appointment.tailor_id,
            start = %appointment.scheduled_date,
            "appointment booked"
        );
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AppointmentCreated,
                resource_type: "appointment",
                resource_id: appointment.id.to_string(),
                details: json!({
                    "appointment_id": appointment.id.to_string(),
                    "tailor_id": appointment.tailor_id.to_string(),
                    "appointment_type": appointment.appointment_type,
                    "scheduled_date": appointment.scheduled_date,
                    "duration_minutes": appointment.duration_minutes,
                }),
                notify: Some((appointment.customer_id, NotificationKind::AppointmentBooked)),
            },
        );
        Ok(appointment)
    }

    // ── Lifecycle ────────────────────────────────────────────

    pub async fn update_status(
        &self,
        actor: &Actor,
        id: Ulid,
        update: StatusUpdate,
    ) -> Result<Appointment, EngineError> {
        if !auth::has_role(actor, &[Role::Tailor, Role::Staff, Role::Admin]) {
            return Err(EngineError::PermissionDenied(
                "only tailors, staff and admins can update status",
            ));
        }
        check_text(
            update.notes.as_deref(),
            MAX_NOTES_LEN,
            "notes must be at most 1000 characters",
        )?;

        let _gate = self.commit_gate.read().await;
        let guard = self.resolve_appointment_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !auth::can_access(actor, &current) {
            return Err(EngineError::PermissionDenied("not the tailor of record"));
        }
        check_status_update(id, current.status, update.status)?;
        if reenters_live_set(current.status, update.status) {
            check_no_conflict(&guard, &current.span(), Some(id))?;
        }

        let event = Event::AppointmentStatusChanged {
            id,
            tailor_id: current.tailor_id,
            status: update.status,
            notes: update.notes.filter(|n| !n.is_empty()),
            at: now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        let updated = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        tracing::info!(
            %id,
            from = current.status.as_str(),
            to = updated.status.as_str(),
            "appointment status changed"
        );
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AppointmentStatusChanged,
                resource_type: "appointment",
                resource_id: id.to_string(),
                details: json!({
                    "appointment_id": id.to_string(),
                    "from": current.status,
                    "to": updated.status,
                }),
                notify: Some((updated.customer_id, NotificationKind::AppointmentStatusChanged)),
            },
        );
        Ok(updated)
    }

    /// Move an appointment to a new start time, keeping its duration.
    pub async fn reschedule(
        &self,
        actor: &Actor,
        id: Ulid,
        request: RescheduleRequest,
    ) -> Result<Appointment, EngineError> {
        check_text(
            request.reason.as_deref(),
            MAX_REASON_LEN,
            "reason must be at most 500 characters",
        )?;

        let _gate = self.commit_gate.read().await;
        let guard = self.resolve_appointment_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !auth::can_access(actor, &current) {
            return Err(EngineError::PermissionDenied(
                "cannot reschedule another customer's appointment",
            ));
        }
        if !current.status.can_reschedule() {
            return Err(EngineError::PreconditionFailed {
                id,
                status: current.status,
            });
        }
        let span = checked_span(request.new_scheduled_date, current.duration_minutes)?;
        check_no_conflict(&guard, &span, Some(id))?;

        let event = Event::AppointmentRescheduled {
            id,
            tailor_id: current.tailor_id,
            scheduled_date: request.new_scheduled_date,
            at: now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        let updated = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        tracing::info!(%id, from = %current.scheduled_date, to = %updated.scheduled_date, "appointment rescheduled");
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AppointmentRescheduled,
                resource_type: "appointment",
                resource_id: id.to_string(),
                details: json!({
                    "appointment_id": id.to_string(),
                    "from": current.scheduled_date,
                    "to": updated.scheduled_date,
                    "reason": request.reason,
                }),
                notify: Some((updated.customer_id, NotificationKind::AppointmentRescheduled)),
            },
        );
        Ok(updated)
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        id: Ulid,
        request: CancelRequest,
    ) -> Result<Appointment, EngineError> {
        let reason = request.cancellation_reason.trim();
        if reason.is_empty() {
            return Err(EngineError::Validation("cancellation_reason is required"));
        }
        check_text(
            Some(reason),
            MAX_REASON_LEN,
            "cancellation_reason must be at most 500 characters",
        )?;

        let _gate = self.commit_gate.read().await;
        let guard = self.resolve_appointment_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !auth::can_access(actor, &current) {
            return Err(EngineError::PermissionDenied(
                "cannot cancel another customer's appointment",
            ));
        }
        if !current.status.can_cancel() {
            return Err(EngineError::PreconditionFailed {
                id,
                status: current.status,
            });
        }

        let event = Event::AppointmentCancelled {
            id,
            tailor_id: current.tailor_id,
            reason: reason.to_string(),
            at: now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        let updated = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        tracing::info!(%id, "appointment cancelled");
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AppointmentCancelled,
                resource_type: "appointment",
                resource_id: id.to_string(),
                details: json!({
                    "appointment_id": id.to_string(),
                    "reason": reason,
                }),
                notify: Some((updated.customer_id, NotificationKind::AppointmentCancelled)),
            },
        );
        Ok(updated)
    }

    /// Duration and notes. A longer or shorter appointment must still fit.
    pub async fn update_details(
        &self,
        actor: &Actor,
        id: Ulid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, EngineError> {
        if let Some(minutes) = update.duration_minutes {
            validate_duration(minutes)?;
        }
        check_text(
            update.customer_notes.as_deref(),
            MAX_NOTES_LEN,
            "customer_notes must be at most 1000 characters",
        )?;
        check_text(
            update.tailor_notes.as_deref(),
            MAX_NOTES_LEN,
            "tailor_notes must be at most 1000 characters",
        )?;
        if actor.role == Role::Customer && update.tailor_notes.is_some() {
            return Err(EngineError::PermissionDenied("customers cannot set tailor notes"));
        }

        let _gate = self.commit_gate.read().await;
        let guard = self.resolve_appointment_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !auth::can_access(actor, &current) {
            return Err(EngineError::PermissionDenied(
                "cannot update another customer's appointment",
            ));
        }
        let duration_change = update
            .duration_minutes
            .filter(|m| *m != current.duration_minutes);
        if let Some(minutes) = duration_change {
            if !current.status.can_reschedule() {
                return Err(EngineError::PreconditionFailed {
                    id,
                    status: current.status,
                });
            }
            let span = checked_span(current.scheduled_date, minutes)?;
            check_no_conflict(&guard, &span, Some(id))?;
        }

        let event = Event::AppointmentUpdated {
            id,
            tailor_id: current.tailor_id,
            duration_minutes: duration_change,
            customer_notes: update.customer_notes,
            tailor_notes: update.tailor_notes,
            at: now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        let updated = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AppointmentUpdated,
                resource_type: "appointment",
                resource_id: id.to_string(),
                details: json!({
                    "appointment_id": id.to_string(),
                    "duration_minutes": updated.duration_minutes,
                }),
                notify: None,
            },
        );
        Ok(updated)
    }

    /// Administrative removal. Customers cancel instead.
    pub async fn delete_appointment(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        if !auth::has_role(actor, &[Role::Admin]) {
            return Err(EngineError::PermissionDenied("only admins can delete appointments"));
        }

        let _gate = self.commit_gate.read().await;
        let guard = self.resolve_appointment_write(&id).await?;
        let tailor_id = guard.tailor_id;
        let guard = self
            .persist_and_apply(guard, Event::AppointmentDeleted { id, tailor_id })
            .await?;
        drop(guard);

        tracing::info!(%id, "appointment deleted");
        self.after_commit(
            actor,
            SideEffects {
                action: AuditAction::AppointmentDeleted,
                resource_type: "appointment",
                resource_id: id.to_string(),
                details: json!({ "appointment_id": id.to_string() }),
                notify: None,
            },
        );
        Ok(())
    }

    /// Returns `false` when the reminder was already recorded or the
    /// appointment is no longer confirmed.
    pub async fn mark_reminder_sent(&self, id: Ulid) -> Result<bool, EngineError> {
        let _gate = self.commit_gate.read().await;
        let guard = self.resolve_appointment_write(&id).await?;
        let appointment = guard.get(id).ok_or(EngineError::NotFound(id))?;
        // Status may have changed since the appointment was collected.
        if appointment.reminder_sent || appointment.status != AppointmentStatus::Confirmed {
            return Ok(false);
        }
        let tailor_id = appointment.tailor_id;
        self.persist_and_apply(guard, Event::ReminderSent { id, tailor_id })
            .await?;
        Ok(true)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // No mutation is between its check and its apply while this is held.
        let _gate = self.commit_gate.write().await;

        let mut events: Vec<Event> = self
            .store
            .all_availability()
            .into_iter()
            .map(|availability| Event::AvailabilitySet { availability })
            .collect();
        for schedule in self.store.schedules() {
            let guard = schedule.read().await;
            events.extend(guard.appointments.iter().map(|a| Event::AppointmentBooked {
                appointment: a.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn fmt_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}
