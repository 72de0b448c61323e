use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::Appointment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Tailor,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Tailor => "tailor",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "tailor" => Ok(Role::Tailor),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn customer(id: Ulid) -> Self {
        Self::new(id, Role::Customer)
    }

    pub fn tailor(id: Ulid) -> Self {
        Self::new(id, Role::Tailor)
    }

    pub fn staff(id: Ulid) -> Self {
        Self::new(id, Role::Staff)
    }

    pub fn admin(id: Ulid) -> Self {
        Self::new(id, Role::Admin)
    }
}

pub const BACK_OFFICE: &[Role] = &[Role::Staff, Role::Admin];

/// The single capability check every guarded operation goes through.
pub fn has_role(actor: &Actor, required: &[Role]) -> bool {
    required.contains(&actor.role)
}

/// Ownership rule for an existing appointment: back-office sees everything,
/// a customer only their own, a tailor only the ones assigned to them.
pub fn can_access(actor: &Actor, appointment: &Appointment) -> bool {
    if has_role(actor, BACK_OFFICE) {
        return true;
    }
    match actor.role {
        Role::Customer => appointment.customer_id == actor.id,
        Role::Tailor => appointment.tailor_id == actor.id,
        Role::Staff | Role::Admin => false,
    }
}

/// Whether `actor` may manage the working hours of `tailor_id`.
pub fn can_manage_availability(actor: &Actor, tailor_id: Ulid) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Tailor => actor.id == tailor_id,
        Role::Customer | Role::Staff => false,
    }
}
