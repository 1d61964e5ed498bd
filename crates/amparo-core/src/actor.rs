//! The acting user, passed explicitly into every mutating operation.
//!
//! No component reads ambient session state; the caller at the I/O boundary
//! resolves the authenticated user and hands the engine an [`ActorContext`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of an acting user, as far as the engine needs to know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Professional,
  UnitLead,
  Admin,
}

impl Role {
  /// Whether this role may transfer a case between units or resolve an
  /// authority escalation.
  pub fn may_administer_case(self) -> bool {
    matches!(self, Self::UnitLead | Self::Admin)
  }
}

/// Who is performing an operation, and on behalf of which protection unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActorContext {
  pub user_id: Uuid,
  pub role:    Role,
  pub unit_id: Uuid,
}

/// A user as the engine sees one: enough to address a notification and to
/// enumerate the members of a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
  pub user_id:      Uuid,
  pub display_name: String,
  pub unit_id:      Uuid,
  pub role:         Role,
}
