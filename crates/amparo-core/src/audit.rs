//! Audit trail types.
//!
//! Every mutating operation of the lifecycle engine, cascading write
//! coordinator and transfer coordinator finishes by appending one entry.
//! Entries are append-only and never read back by the engine itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag describing what kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
  Insert,
  Update,
  Delete,
  /// An intake stage/status change.
  Transition,
  /// A case ownership handoff between units.
  Transfer,
  /// A partial failure left state needing operator reconciliation.
  Reconciliation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub audit_id:    Uuid,
  /// The table the mutated record lives in.
  pub table_name:  String,
  pub record_id:   Uuid,
  pub action:      AuditAction,
  pub actor_id:    Uuid,
  pub recorded_at: DateTime<Utc>,
  pub payload:     Option<serde_json::Value>,
}

/// Input to [`crate::store::CaseStore::append_audit`].
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub table_name: String,
  pub record_id:  Uuid,
  pub action:     AuditAction,
  pub actor_id:   Uuid,
  pub payload:    Option<serde_json::Value>,
}

// ─── Audit outcome ───────────────────────────────────────────────────────────

/// Whether the trailing audit write of an operation succeeded.
///
/// An audit failure never rolls back the business mutation; it is surfaced
/// here so the caller can tell "mutation succeeded but unaudited" apart from
/// a rolled-back mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditStatus {
  Recorded,
  Failed { message: String },
}

impl AuditStatus {
  pub fn is_recorded(&self) -> bool { matches!(self, Self::Recorded) }
}

/// A successful business result bundled with its audit outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audited<T> {
  pub value: T,
  pub audit: AuditStatus,
}

impl<T> Audited<T> {
  pub fn new(value: T, audit: AuditStatus) -> Self { Self { value, audit } }
}
