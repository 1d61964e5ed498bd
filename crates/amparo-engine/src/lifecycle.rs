//! The case lifecycle engine — the only component that changes an intake's
//! stage or status.
//!
//! The stage machine is strictly linear; the single branch is the three-way
//! decision recorded when reception concludes. All transition requests are
//! validated before any mutation: a rejected request leaves no partial state
//! and writes no audit entry.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use amparo_core::{
  Error, Result,
  actor::ActorContext,
  audit::{AuditAction, Audited, NewAuditEntry},
  case::{Case, NewCase},
  child::{Child, NewChild},
  intake::{
    ClosureReason, EscalationOutcome, Intake, IntakeStage, IntakeStatus,
    IntakeTransition, NewIntake, ReceptionDecision,
  },
  measure::{Measure, NewMeasurePlan},
  records::CollectionBundle,
  store::CaseStore,
};

use crate::{audit::AuditRecorder, cascade::CascadeCoordinator};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// A new reception: child identity plus the unit/zone that takes the case.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceptionIntake {
  pub child:                 NewChild,
  pub unit_id:               Uuid,
  pub zone_id:               Uuid,
  pub assigned_professional: Uuid,
  #[serde(default)]
  pub emergency:             bool,
}

/// The payload of the reception-closing decision.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionSubmission {
  pub decision:    ReceptionDecision,
  pub narrative:   String,
  #[serde(default)]
  pub collections: CollectionBundle,
}

/// What a completed reception produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReceptionOutcome {
  pub child:  Child,
  pub case:   Case,
  pub intake: Intake,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct LifecycleEngine<S> {
  store:   Arc<S>,
  cascade: CascadeCoordinator<S>,
  audit:   AuditRecorder<S>,
}

impl<S> Clone for LifecycleEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      cascade: self.cascade.clone(),
      audit:   self.audit.clone(),
    }
  }
}

impl<S> LifecycleEngine<S>
where
  S: CaseStore + Send + Sync + 'static,
{
  pub fn new(store: Arc<S>, cascade: CascadeCoordinator<S>) -> Self {
    let audit = AuditRecorder::new(Arc::clone(&store));
    Self { store, cascade, audit }
  }

  // ── Reception ─────────────────────────────────────────────────────────

  /// Begin a new episode: find-or-create the child by national id,
  /// find-or-create their active case, and open the first intake at
  /// `reception`.
  ///
  /// Fails with [`Error::ActiveIntakeExists`] (no rows written) when the
  /// case already has an open intake.
  pub async fn register_reception(
    &self,
    input: ReceptionIntake,
    actor: ActorContext,
  ) -> Result<Audited<ReceptionOutcome>> {
    let child = match self
      .store
      .find_child_by_national_id(&input.child.national_id)
      .await
      .map_err(Into::into)?
    {
      // Reception edits overwrite the mutable identity fields in place so
      // repeated receptions never duplicate the person.
      Some(existing) => {
        let updated = Child {
          given_name: input.child.given_name,
          family_name: input.child.family_name,
          birth_date: input.child.birth_date,
          gender: input.child.gender,
          address: input.child.address,
          health_notes: input.child.health_notes,
          school: input.child.school,
          education_notes: input.child.education_notes,
          ..existing
        };
        self.store.update_child(updated).await.map_err(Into::into)?
      }
      None => {
        self.store.add_child(input.child).await.map_err(Into::into)?
      }
    };

    let case = match self
      .store
      .find_active_case(child.child_id)
      .await
      .map_err(Into::into)?
    {
      Some(case) => case,
      None => self
        .store
        .add_case(NewCase {
          child_id: child.child_id,
          unit_id:  input.unit_id,
          zone_id:  input.zone_id,
        })
        .await
        .map_err(Into::into)?,
    };

    let intake = self
      .store
      .open_intake(NewIntake {
        case_id:               case.case_id,
        assigned_professional: input.assigned_professional,
        opened_by:             actor.user_id,
        emergency:             input.emergency,
      })
      .await
      .map_err(Into::into)?;

    tracing::info!(
      case_number = %case.case_number,
      intake_id = %intake.intake_id,
      seq_no = intake.seq_no,
      "reception registered"
    );

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake.intake_id,
        action:     AuditAction::Insert,
        actor_id:   actor.user_id,
        payload:    Some(json!({ "case_id": case.case_id, "seq_no": intake.seq_no })),
      })
      .await;

    Ok(Audited::new(ReceptionOutcome { child, case, intake }, audit))
  }

  /// Open a subsequent intake on an existing case.
  pub async fn open_intake(
    &self,
    case_id: Uuid,
    assigned_professional: Uuid,
    emergency: bool,
    actor: ActorContext,
  ) -> Result<Audited<Intake>> {
    let intake = self
      .store
      .open_intake(NewIntake {
        case_id,
        assigned_professional,
        opened_by: actor.user_id,
        emergency,
      })
      .await
      .map_err(Into::into)?;

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake.intake_id,
        action:     AuditAction::Insert,
        actor_id:   actor.user_id,
        payload:    Some(json!({ "case_id": case_id, "seq_no": intake.seq_no })),
      })
      .await;

    Ok(Audited::new(intake, audit))
  }

  // ── Decision branch ───────────────────────────────────────────────────

  /// Record the three-way outcome that concludes the reception stage.
  ///
  /// - `advice_only` closes the intake *and* deactivates the whole case —
  ///   the only path that closes the case itself.
  /// - `full_intervention` advances the intake to `expansion`; requires at
  ///   least one right violation and a non-empty narrative.
  /// - `escalate_to_authority` records the decision and leaves the intake
  ///   open pending [`Self::resolve_escalation`].
  ///
  /// After its own mutation the engine unconditionally delegates the
  /// submitted collections to the cascading write coordinator, then writes
  /// one audit entry for the net change.
  pub async fn submit_reception_decision(
    &self,
    intake_id: Uuid,
    submission: DecisionSubmission,
    expected_version: i64,
    actor: ActorContext,
  ) -> Result<Audited<Intake>> {
    let intake = self.load_open_intake(intake_id).await?;
    if intake.stage != IntakeStage::Reception {
      return Err(Error::Validation(format!(
        "reception decision applies only at the reception stage, intake is \
         at {:?}",
        intake.stage
      )));
    }

    if submission.decision == ReceptionDecision::FullIntervention {
      if submission.narrative.trim().is_empty() {
        return Err(Error::Validation(
          "a full intervention requires a non-empty narrative".into(),
        ));
      }
      if submission.collections.right_violations.is_empty() {
        return Err(Error::Validation(
          "a full intervention requires at least one identified right \
           violation"
            .into(),
        ));
      }
    }

    let change = match submission.decision {
      ReceptionDecision::AdviceOnly => IntakeTransition {
        stage: Some(IntakeStage::Closed),
        status: Some(IntakeStatus::Closed),
        closed_at: Some(Utc::now()),
        closing_reason: Some(ClosureReason::AdviceConcluded),
        decision: Some(submission.decision),
        decision_narrative: Some(submission.narrative.clone()),
        ..IntakeTransition::default()
      },
      ReceptionDecision::FullIntervention => IntakeTransition {
        stage: Some(IntakeStage::Expansion),
        decision: Some(submission.decision),
        decision_narrative: Some(submission.narrative.clone()),
        ..IntakeTransition::default()
      },
      // The case cannot be finalised until the authority resolves the
      // escalation; the intake stays open.
      ReceptionDecision::EscalateToAuthority => IntakeTransition {
        decision: Some(submission.decision),
        decision_narrative: Some(submission.narrative.clone()),
        escalation_pending: Some(true),
        ..IntakeTransition::default()
      },
    };

    let updated = self
      .store
      .apply_intake_transition(intake_id, expected_version, change, actor.user_id)
      .await
      .map_err(Into::into)?;

    if submission.decision == ReceptionDecision::AdviceOnly {
      self
        .store
        .set_case_active(intake.case_id, false)
        .await
        .map_err(Into::into)?;
    }

    let updated = self
      .cascade
      .replace_collections(
        intake_id,
        updated.version,
        submission.collections,
        actor,
      )
      .await?;

    tracing::info!(
      %intake_id,
      decision = ?submission.decision,
      stage = ?updated.stage,
      "reception decision recorded"
    );

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake_id,
        action:     AuditAction::Transition,
        actor_id:   actor.user_id,
        payload:    Some(json!({
          "from_stage": intake.stage,
          "to_stage": updated.stage,
          "status": updated.status,
          "decision": submission.decision,
        })),
      })
      .await;

    Ok(Audited::new(updated, audit))
  }

  // ── Linear advancement ────────────────────────────────────────────────

  /// Move an open intake one step along the fixed forward path
  /// expansion → synthesis → measure-definition → agreement → follow-up.
  pub async fn advance_stage(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    actor: ActorContext,
  ) -> Result<Audited<Intake>> {
    let intake = self.load_open_intake(intake_id).await?;
    let Some(next) = intake.stage.next_linear() else {
      return Err(Error::Validation(format!(
        "stage {:?} has no linear successor; reception exits through the \
         decision branch and follow-up exits through closure",
        intake.stage
      )));
    };

    let updated = self
      .store
      .apply_intake_transition(
        intake_id,
        expected_version,
        IntakeTransition { stage: Some(next), ..IntakeTransition::default() },
        actor.user_id,
      )
      .await
      .map_err(Into::into)?;

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake_id,
        action:     AuditAction::Transition,
        actor_id:   actor.user_id,
        payload:    Some(json!({
          "from_stage": intake.stage,
          "to_stage": updated.stage,
        })),
      })
      .await;

    Ok(Audited::new(updated, audit))
  }

  // ── Closure ───────────────────────────────────────────────────────────

  /// Close an intake with a reason from the fixed vocabulary.
  ///
  /// `escalate_to_authority` is the one reason that keeps the intake open:
  /// the closure form is recorded but finalisation waits for
  /// [`Self::resolve_escalation`]. Closing never touches the case's
  /// `active` flag — only the advice-only decision branch does that.
  pub async fn close_intake(
    &self,
    intake_id: Uuid,
    reason: ClosureReason,
    expected_version: i64,
    actor: ActorContext,
  ) -> Result<Audited<Intake>> {
    let intake = self.load_open_intake(intake_id).await?;

    // An escalated intake is held for the authority; only
    // `resolve_escalation` may finalise (or release) it.
    if intake.escalation_pending {
      return Err(Error::Validation(
        "the intake awaits the external authority's resolution".into(),
      ));
    }
    if matches!(
      reason,
      ClosureReason::AdviceConcluded | ClosureReason::AuthorityResolution
    ) {
      return Err(Error::Validation(format!(
        "closing reason {reason:?} is stamped by the engine, not selectable"
      )));
    }
    if intake.stage != IntakeStage::FollowUp
      && intake.stage != IntakeStage::Reception
    {
      return Err(Error::Validation(format!(
        "an intake closes from reception or follow-up, not {:?}",
        intake.stage
      )));
    }
    if intake.stage == IntakeStage::Reception
      && intake.decision.is_none()
      && reason != ClosureReason::EscalateToAuthority
    {
      return Err(Error::Validation(
        "closing from reception requires a recorded reception decision"
          .into(),
      ));
    }

    let change = if reason.keeps_open() {
      IntakeTransition {
        closing_reason: Some(reason),
        escalation_pending: Some(true),
        ..IntakeTransition::default()
      }
    } else {
      IntakeTransition {
        stage: Some(IntakeStage::Closed),
        status: Some(IntakeStatus::Closed),
        closed_at: Some(Utc::now()),
        closing_reason: Some(reason),
        ..IntakeTransition::default()
      }
    };

    let updated = self
      .store
      .apply_intake_transition(intake_id, expected_version, change, actor.user_id)
      .await
      .map_err(Into::into)?;

    tracing::info!(%intake_id, ?reason, status = ?updated.status, "intake closure recorded");

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake_id,
        action:     AuditAction::Transition,
        actor_id:   actor.user_id,
        payload:    Some(json!({
          "from_stage": intake.stage,
          "to_stage": updated.stage,
          "status": updated.status,
          "closing_reason": reason,
        })),
      })
      .await;

    Ok(Audited::new(updated, audit))
  }

  /// Apply the external authority's resolution to an escalated intake.
  pub async fn resolve_escalation(
    &self,
    intake_id: Uuid,
    outcome: EscalationOutcome,
    expected_version: i64,
    actor: ActorContext,
  ) -> Result<Audited<Intake>> {
    if !actor.role.may_administer_case() {
      return Err(Error::Forbidden(
        "resolving an authority escalation requires a unit lead or admin"
          .into(),
      ));
    }

    let intake = self.load_open_intake(intake_id).await?;
    if !intake.escalation_pending {
      return Err(Error::Validation(format!(
        "intake {intake_id} has no pending authority escalation"
      )));
    }

    let change = match outcome {
      EscalationOutcome::MeasureRatified => IntakeTransition {
        stage: Some(IntakeStage::Closed),
        status: Some(IntakeStatus::Closed),
        closed_at: Some(Utc::now()),
        closing_reason: Some(ClosureReason::AuthorityResolution),
        escalation_pending: Some(false),
        ..IntakeTransition::default()
      },
      EscalationOutcome::ReturnedToUnit => IntakeTransition {
        escalation_pending: Some(false),
        ..IntakeTransition::default()
      },
    };

    let updated = self
      .store
      .apply_intake_transition(intake_id, expected_version, change, actor.user_id)
      .await
      .map_err(Into::into)?;

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake_id,
        action:     AuditAction::Transition,
        actor_id:   actor.user_id,
        payload:    Some(json!({ "escalation_outcome": outcome })),
      })
      .await;

    Ok(Audited::new(updated, audit))
  }

  // ── Measure plan ──────────────────────────────────────────────────────

  /// Save (replace) the intake's measure and action plan. Valid once the
  /// intake has reached measure-definition.
  pub async fn save_measure_plan(
    &self,
    intake_id: Uuid,
    plan: NewMeasurePlan,
    expected_version: i64,
    actor: ActorContext,
  ) -> Result<Audited<Measure>> {
    let intake = self.load_open_intake(intake_id).await?;
    if !intake.stage.at_least(IntakeStage::MeasureDefinition) {
      return Err(Error::Validation(format!(
        "a measure plan applies from measure-definition onwards, intake is \
         at {:?}",
        intake.stage
      )));
    }

    let measure = self
      .store
      .save_measure_plan(intake_id, expected_version, plan, actor.user_id)
      .await
      .map_err(Into::into)?;

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "measures".into(),
        record_id:  measure.measure_id,
        action:     AuditAction::Update,
        actor_id:   actor.user_id,
        payload:    Some(json!({
          "intake_id": intake_id,
          "actions": measure.actions.len(),
        })),
      })
      .await;

    Ok(Audited::new(measure, audit))
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  async fn load_open_intake(&self, intake_id: Uuid) -> Result<Intake> {
    let intake = self
      .store
      .get_intake(intake_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::IntakeNotFound(intake_id))?;
    if !intake.is_open() {
      return Err(Error::IntakeNotOpen(intake_id));
    }
    Ok(intake)
  }
}
