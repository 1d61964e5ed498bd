//! Intervention records — actions and interactions logged against an intake.
//!
//! An intervention flagged as a group record is evidentially relevant to
//! every child in the household with their own open intake; the cascading
//! write coordinator fans a copy out to each of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::records::NewDocument;

/// Prefix applied to the narrative of a replicated group intervention so a
/// reader can tell a copy from the canonical record.
pub const GROUP_COPY_PREFIX: &str = "[group intervention copy] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
  Interview,
  HomeVisit,
  PhoneCall,
  Meeting,
  Report,
  Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecord {
  pub intervention_id: Uuid,
  pub intake_id:       Uuid,
  pub kind:            InterventionKind,
  pub narrative:       String,
  /// When the interaction actually happened.
  pub occurred_at:     DateTime<Utc>,
  /// Server-assigned; never changes after creation.
  pub recorded_at:     DateTime<Utc>,
  pub recorded_by:     Uuid,
  /// Whether this record is shared across the household.
  pub group:           bool,
  /// For replicas: the canonical record this was copied from.
  pub replicated_from: Option<Uuid>,
  /// Professionals who attended, beyond the recording user.
  pub professionals:   Vec<Uuid>,
}

/// Input to [`crate::store::CaseStore::add_intervention`]. The id and
/// `recorded_at` are assigned by the store; attached documents are inserted
/// in the same transaction.
#[derive(Debug, Clone)]
pub struct NewIntervention {
  pub intake_id:       Uuid,
  pub kind:            InterventionKind,
  pub narrative:       String,
  pub occurred_at:     DateTime<Utc>,
  pub recorded_by:     Uuid,
  pub group:           bool,
  pub replicated_from: Option<Uuid>,
  pub professionals:   Vec<Uuid>,
  pub documents:       Vec<NewDocument>,
}
