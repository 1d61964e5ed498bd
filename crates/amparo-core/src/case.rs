//! Case (expediente) — the durable folder for one child.
//!
//! A case outlives any single intake. It is deactivated, never deleted, and
//! its `unit_id` is mutated only by the transfer coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
  pub case_id:     Uuid,
  /// Immutable, store-generated folder number, e.g. `EXP-2026-00042`.
  pub case_number: String,
  pub child_id:    Uuid,
  pub active:      bool,
  /// The protection unit currently responsible for the case.
  pub unit_id:     Uuid,
  /// The jurisdiction/zone the case belongs to.
  pub zone_id:     Uuid,
  pub opened_at:   DateTime<Utc>,
}

/// Input to [`crate::store::CaseStore::add_case`]. The case number, id and
/// opening date are assigned by the store; a new case starts active.
#[derive(Debug, Clone)]
pub struct NewCase {
  pub child_id: Uuid,
  pub unit_id:  Uuid,
  pub zone_id:  Uuid,
}
