use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::info;

use crate::engine::Engine;
use crate::notify::{self, NotificationKind};
use crate::observability::REMINDERS_SENT_TOTAL;

/// Background task that reminds customers of tomorrow's confirmed appointments.
pub async fn run_reminders(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let sent = send_due_reminders(&engine, chrono::Utc::now().naive_utc()).await;
        if sent > 0 {
            info!("sent {sent} appointment reminders");
        }
    }
}

/// One reminder pass. Returns how many reminders went out.
pub async fn send_due_reminders(engine: &Engine, now: chrono::NaiveDateTime) -> usize {
    let mut sent = 0;
    for appointment in engine.collect_due_reminders(now).await {
        // Recorded first so a crash never sends the same reminder twice.
        match engine.mark_reminder_sent(appointment.id).await {
            Ok(true) => {}
            // Already reminded, or cancelled / moved since it was collected.
            Ok(false) => continue,
            Err(e) => {
                // Deleted in the meantime.
                tracing::debug!("reminder skip {}: {e}", appointment.id);
                continue;
            }
        }
        notify::dispatch(
            engine.notifier.clone(),
            appointment.customer_id,
            NotificationKind::AppointmentReminder,
            json!({
                "appointment_id": appointment.id.to_string(),
                "tailor_id": appointment.tailor_id.to_string(),
                "scheduled_date": appointment.scheduled_date,
                "appointment_type": appointment.appointment_type,
            }),
        );
        metrics::counter!(REMINDERS_SENT_TOTAL).increment(1);
        sent += 1;
    }
    sent
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    if threshold == 0 {
        return;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await < threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}
