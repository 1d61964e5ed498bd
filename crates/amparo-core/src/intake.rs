//! Intake (ingreso) — one lifecycle episode within a case.
//!
//! The stage machine is strictly linear; the only branch is the three-way
//! decision recorded when reception concludes. An intake's `version` column
//! implements optimistic concurrency: every state-changing write bumps it,
//! and callers must present the version they loaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Stage machine ───────────────────────────────────────────────────────────

/// Position of an intake in the fixed forward sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStage {
  Reception,
  Expansion,
  Synthesis,
  MeasureDefinition,
  Agreement,
  FollowUp,
  Closed,
}

impl IntakeStage {
  /// The next stage on the linear path, for stages past reception.
  ///
  /// Reception has no linear successor: its exit is owned by the decision
  /// branch. `FollowUp` exits through closure, not through an advance.
  pub fn next_linear(self) -> Option<IntakeStage> {
    match self {
      Self::Expansion => Some(Self::Synthesis),
      Self::Synthesis => Some(Self::MeasureDefinition),
      Self::MeasureDefinition => Some(Self::Agreement),
      Self::Agreement => Some(Self::FollowUp),
      Self::Reception | Self::FollowUp | Self::Closed => None,
    }
  }

  /// Ordinal used for "at or past stage X" checks.
  pub fn ordinal(self) -> u8 {
    match self {
      Self::Reception => 0,
      Self::Expansion => 1,
      Self::Synthesis => 2,
      Self::MeasureDefinition => 3,
      Self::Agreement => 4,
      Self::FollowUp => 5,
      Self::Closed => 6,
    }
  }

  pub fn at_least(self, other: IntakeStage) -> bool {
    self.ordinal() >= other.ordinal()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeStatus {
  Open,
  Closed,
}

// ─── Decision branch ─────────────────────────────────────────────────────────

/// The three-way outcome recorded when reception concludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceptionDecision {
  /// The episode ends with advice; the intake closes and the whole case is
  /// deactivated. The only path that closes the case itself.
  AdviceOnly,
  /// A full intervention begins; the intake advances to expansion.
  FullIntervention,
  /// Referral to the provincial authority. The intake stays open until the
  /// authority's resolution flows back.
  EscalateToAuthority,
}

/// The external authority's eventual resolution of an escalated intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationOutcome {
  /// The authority ratified the proposed measure; the intake finalises.
  MeasureRatified,
  /// The authority returned the case for continued local handling; the
  /// intake stays open at its current stage.
  ReturnedToUnit,
}

// ─── Closure ─────────────────────────────────────────────────────────────────

/// Fixed vocabulary of reasons for closing an intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureReason {
  RestitutionAchieved,
  RepeatedNonCompliance,
  Death,
  Relocation,
  Other,
  /// Suspends closure: the intake stays open pending the authority.
  EscalateToAuthority,
  /// Stamped when an advice-only decision concludes the episode.
  AdviceConcluded,
  /// Stamped when the external authority's resolution finalises an
  /// escalated intake.
  AuthorityResolution,
}

impl ClosureReason {
  /// Whether selecting this reason leaves the intake open.
  pub fn keeps_open(self) -> bool {
    matches!(self, Self::EscalateToAuthority)
  }
}

// ─── Intake ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intake {
  pub intake_id:             Uuid,
  pub case_id:               Uuid,
  /// Sequential per case, assigned by the store, monotonically increasing.
  pub seq_no:                i64,
  pub stage:                 IntakeStage,
  pub status:                IntakeStatus,
  pub opened_at:             DateTime<Utc>,
  pub closed_at:             Option<DateTime<Utc>>,
  pub closing_reason:        Option<ClosureReason>,
  pub assigned_professional: Uuid,
  pub last_modified_by:      Uuid,
  pub emergency:             bool,
  /// The reception decision, once recorded. Absent until reception
  /// concludes.
  pub decision:              Option<ReceptionDecision>,
  pub decision_narrative:    Option<String>,
  /// Set while the case awaits the external authority's resolution.
  pub escalation_pending:    bool,
  /// Optimistic-concurrency counter; bumped by every state-changing write.
  pub version:               i64,
}

impl Intake {
  pub fn is_open(&self) -> bool { self.status == IntakeStatus::Open }
}

/// Input to [`crate::store::CaseStore::open_intake`]. The sequence number,
/// opening date, initial stage (`reception`) and status (`open`) are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewIntake {
  pub case_id:               Uuid,
  pub assigned_professional: Uuid,
  pub opened_by:             Uuid,
  pub emergency:             bool,
}

// ─── Transition ──────────────────────────────────────────────────────────────

/// The net state change the lifecycle engine asks the store to apply.
///
/// `None` fields are left untouched. The store applies the whole change in
/// one statement conditioned on the caller's expected version.
#[derive(Debug, Clone, Default)]
pub struct IntakeTransition {
  pub stage:              Option<IntakeStage>,
  pub status:             Option<IntakeStatus>,
  pub closed_at:          Option<DateTime<Utc>>,
  pub closing_reason:     Option<ClosureReason>,
  pub decision:           Option<ReceptionDecision>,
  pub decision_narrative: Option<String>,
  pub escalation_pending: Option<bool>,
}
