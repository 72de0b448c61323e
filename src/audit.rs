use std::sync::Mutex;

use serde::Serialize;
use ulid::Ulid;

use crate::auth::{Actor, Role};
use crate::model::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    AppointmentCreated,
    AppointmentUpdated,
    AppointmentStatusChanged,
    AppointmentRescheduled,
    AppointmentCancelled,
    AppointmentDeleted,
    AvailabilityUpdated,
    AvailabilityDeactivated,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::AppointmentCreated => "appointment.created",
            AuditAction::AppointmentUpdated => "appointment.updated",
            AuditAction::AppointmentStatusChanged => "appointment.status_changed",
            AuditAction::AppointmentRescheduled => "appointment.rescheduled",
            AuditAction::AppointmentCancelled => "appointment.cancelled",
            AuditAction::AppointmentDeleted => "appointment.deleted",
            AuditAction::AvailabilityUpdated => "availability.updated",
            AuditAction::AvailabilityDeactivated => "availability.deactivated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub actor_id: Ulid,
    pub actor_role: Role,
    pub resource_type: &'static str,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub at: Timestamp,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        actor: &Actor,
        resource_type: &'static str,
        resource_id: impl Into<String>,
        details: serde_json::Value,
        at: Timestamp,
    ) -> Self {
        Self {
            action,
            actor_id: actor.id,
            actor_role: actor.role,
            resource_type,
            resource_id: resource_id.into(),
            details,
            at,
        }
    }
}

pub type AuditError = Box<dyn std::error::Error + Send + Sync>;

/// Audit persistence. Called after a committed transition; failures are logged, never returned.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Writes each entry as a structured log line.
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: "stitchbook::audit",
            action = entry.action.as_str(),
            actor_id = %entry.actor_id,
            actor_role = entry.actor_role.as_str(),
            resource_type = entry.resource_type,
            resource_id = %entry.resource_id,
            details = %entry.details,
            "audit"
        );
        Ok(())
    }
}

/// Keeps entries in memory.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|e| e.to_string())?
            .push(entry.clone());
        Ok(())
    }
}
