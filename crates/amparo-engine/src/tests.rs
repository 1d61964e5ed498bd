use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use amparo_core::{
  Error,
  actor::{ActorContext, Role, UserRef},
  child::{Gender, NewChild},
  intake::{
    ClosureReason, EscalationOutcome, Intake, IntakeStage, IntakeStatus,
    ReceptionDecision,
  },
  intervention::{GROUP_COPY_PREFIX, InterventionKind},
  measure::{ActionStatus, NewMeasureAction, NewMeasurePlan},
  notify::{Notification, Notifier},
  records::{CollectionBundle, NewHouseholdMember, NewRightViolation},
  store::CaseStore,
};
use amparo_store_sqlite::SqliteStore;

use crate::{
  cascade::{CascadeCoordinator, InterventionDraft},
  lifecycle::{DecisionSubmission, LifecycleEngine, ReceptionIntake},
  transfer::TransferCoordinator,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct RecordingNotifier {
  sent:     Mutex<Vec<Notification>>,
  fail_for: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
  fn new() -> Self {
    Self { sent: Mutex::new(Vec::new()), fail_for: Mutex::new(Vec::new()) }
  }

  fn sent_to(&self) -> Vec<Uuid> {
    self.sent.lock().unwrap().iter().map(|n| n.user_id).collect()
  }
}

impl Notifier for RecordingNotifier {
  fn notify(
    &self,
    notification: Notification,
  ) -> impl std::future::Future<Output = amparo_core::Result<()>> + Send + '_
  {
    async move {
      if self.fail_for.lock().unwrap().contains(&notification.user_id) {
        return Err(Error::Notification("dispatcher unavailable".into()));
      }
      self.sent.lock().unwrap().push(notification);
      Ok(())
    }
  }
}

async fn setup() -> (Arc<SqliteStore>, LifecycleEngine<SqliteStore>) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let cascade = CascadeCoordinator::new(Arc::clone(&store));
  let engine = LifecycleEngine::new(Arc::clone(&store), cascade);
  (store, engine)
}

fn actor(role: Role) -> ActorContext {
  ActorContext { user_id: Uuid::new_v4(), role, unit_id: Uuid::new_v4() }
}

fn child_input(national_id: &str) -> NewChild {
  NewChild {
    national_id:     national_id.into(),
    given_name:      "Ana".into(),
    family_name:     "Paredes".into(),
    birth_date:      None,
    gender:          Gender::Female,
    address:         Some("Calle 12 #40".into()),
    health_notes:    None,
    school:          None,
    education_notes: None,
  }
}

fn reception(national_id: &str, unit_id: Uuid) -> ReceptionIntake {
  ReceptionIntake {
    child: child_input(national_id),
    unit_id,
    zone_id: Uuid::new_v4(),
    assigned_professional: Uuid::new_v4(),
    emergency: false,
  }
}

fn one_violation() -> CollectionBundle {
  CollectionBundle {
    right_violations: vec![NewRightViolation {
      category:    amparo_core::records::ViolationCategory::Protection,
      description: "out of school for six months".into(),
    }],
    ..CollectionBundle::default()
  }
}

fn full_intervention(bundle: CollectionBundle) -> DecisionSubmission {
  DecisionSubmission {
    decision:    ReceptionDecision::FullIntervention,
    narrative:   "sustained intervention warranted".into(),
    collections: bundle,
  }
}

async fn advance_to(
  engine: &LifecycleEngine<SqliteStore>,
  mut intake: Intake,
  target: IntakeStage,
  a: ActorContext,
) -> Intake {
  while intake.stage != target {
    intake = engine
      .advance_stage(intake.intake_id, intake.version, a)
      .await
      .unwrap()
      .value;
  }
  intake
}

// ─── Reception and the single-open invariant ─────────────────────────────────

#[tokio::test]
async fn repeated_reception_reuses_child_and_case_but_rejects_second_intake() {
  let (store, engine) = setup().await;
  let a = actor(Role::Professional);
  let unit = Uuid::new_v4();

  let first = engine
    .register_reception(reception("30111222", unit), a)
    .await
    .unwrap()
    .value;
  assert_eq!(first.intake.stage, IntakeStage::Reception);
  assert_eq!(first.intake.seq_no, 1);
  assert!(!store
    .list_audit_for(first.intake.intake_id)
    .await
    .unwrap()
    .is_empty());

  let err = engine
    .register_reception(reception("30111222", unit), a)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ActiveIntakeExists(case_id)
    if case_id == first.case.case_id));

  // Same person, no duplicate child row.
  let again = store
    .find_child_by_national_id("30111222")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(again.child_id, first.child.child_id);
}

#[tokio::test]
async fn closing_an_intake_allows_a_later_one_with_the_next_seq_no() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);
  let unit = Uuid::new_v4();

  let first = engine
    .register_reception(reception("30111223", unit), a)
    .await
    .unwrap()
    .value;
  let expanded = engine
    .submit_reception_decision(
      first.intake.intake_id,
      full_intervention(one_violation()),
      first.intake.version,
      a,
    )
    .await
    .unwrap()
    .value;

  // Walk to follow-up, then close.
  let mut intake =
    advance_to(&engine, expanded, IntakeStage::FollowUp, a).await;
  intake = engine
    .close_intake(
      intake.intake_id,
      ClosureReason::RestitutionAchieved,
      intake.version,
      a,
    )
    .await
    .unwrap()
    .value;
  assert_eq!(intake.status, IntakeStatus::Closed);
  assert_eq!(intake.closing_reason, Some(ClosureReason::RestitutionAchieved));

  let second = engine
    .open_intake(first.case.case_id, Uuid::new_v4(), false, a)
    .await
    .unwrap()
    .value;
  assert_eq!(second.seq_no, 2);
  assert_eq!(second.stage, IntakeStage::Reception);
}

// ─── The decision branch ─────────────────────────────────────────────────────

#[tokio::test]
async fn advice_only_closes_the_intake_and_deactivates_the_case() {
  let (store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111224", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let updated = engine
    .submit_reception_decision(
      out.intake.intake_id,
      DecisionSubmission {
        decision:    ReceptionDecision::AdviceOnly,
        narrative:   "guidance given, no intervention needed".into(),
        collections: CollectionBundle::default(),
      },
      out.intake.version,
      a,
    )
    .await
    .unwrap()
    .value;

  assert_eq!(updated.status, IntakeStatus::Closed);
  assert_eq!(updated.closing_reason, Some(ClosureReason::AdviceConcluded));
  assert_eq!(updated.decision, Some(ReceptionDecision::AdviceOnly));

  let case = store.get_case(out.case.case_id).await.unwrap().unwrap();
  assert!(!case.active);
}

#[tokio::test]
async fn full_intervention_requires_a_right_violation() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111225", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let err = engine
    .submit_reception_decision(
      out.intake.intake_id,
      full_intervention(CollectionBundle::default()),
      out.intake.version,
      a,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let updated = engine
    .submit_reception_decision(
      out.intake.intake_id,
      full_intervention(one_violation()),
      out.intake.version,
      a,
    )
    .await
    .unwrap()
    .value;
  assert_eq!(updated.stage, IntakeStage::Expansion);
  assert_eq!(updated.status, IntakeStatus::Open);
}

#[tokio::test]
async fn escalation_holds_the_intake_open_until_the_authority_resolves() {
  let (_store, engine) = setup().await;
  let professional = actor(Role::Professional);
  let lead = actor(Role::UnitLead);

  let out = engine
    .register_reception(reception("30111226", Uuid::new_v4()), professional)
    .await
    .unwrap()
    .value;
  let escalated = engine
    .submit_reception_decision(
      out.intake.intake_id,
      DecisionSubmission {
        decision:    ReceptionDecision::EscalateToAuthority,
        narrative:   "exceeds local competence".into(),
        collections: one_violation(),
      },
      out.intake.version,
      professional,
    )
    .await
    .unwrap()
    .value;
  assert!(escalated.escalation_pending);
  assert_eq!(escalated.status, IntakeStatus::Open);

  // Only a unit lead or admin may apply the resolution.
  let err = engine
    .resolve_escalation(
      escalated.intake_id,
      EscalationOutcome::MeasureRatified,
      escalated.version,
      professional,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let resolved = engine
    .resolve_escalation(
      escalated.intake_id,
      EscalationOutcome::MeasureRatified,
      escalated.version,
      lead,
    )
    .await
    .unwrap()
    .value;
  assert_eq!(resolved.status, IntakeStatus::Closed);
  assert_eq!(
    resolved.closing_reason,
    Some(ClosureReason::AuthorityResolution)
  );
  assert!(!resolved.escalation_pending);
}

#[tokio::test]
async fn returned_to_unit_clears_the_pending_flag_and_keeps_the_intake_open() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);
  let lead = actor(Role::Admin);

  let out = engine
    .register_reception(reception("30111227", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let escalated = engine
    .submit_reception_decision(
      out.intake.intake_id,
      DecisionSubmission {
        decision:    ReceptionDecision::EscalateToAuthority,
        narrative:   "referred".into(),
        collections: CollectionBundle::default(),
      },
      out.intake.version,
      a,
    )
    .await
    .unwrap()
    .value;

  let resolved = engine
    .resolve_escalation(
      escalated.intake_id,
      EscalationOutcome::ReturnedToUnit,
      escalated.version,
      lead,
    )
    .await
    .unwrap()
    .value;
  assert_eq!(resolved.status, IntakeStatus::Open);
  assert!(!resolved.escalation_pending);
}

#[tokio::test]
async fn an_escalated_intake_cannot_be_closed_past_the_authority() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);
  let lead = actor(Role::UnitLead);

  let out = engine
    .register_reception(reception("30111243", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let expanded = engine
    .submit_reception_decision(
      out.intake.intake_id,
      full_intervention(one_violation()),
      out.intake.version,
      a,
    )
    .await
    .unwrap()
    .value;
  let intake = advance_to(&engine, expanded, IntakeStage::FollowUp, a).await;

  // The closure form escalates; the intake is held open for the authority.
  let held = engine
    .close_intake(
      intake.intake_id,
      ClosureReason::EscalateToAuthority,
      intake.version,
      a,
    )
    .await
    .unwrap()
    .value;
  assert!(held.escalation_pending);
  assert_eq!(held.status, IntakeStatus::Open);

  // No ordinary closure may finalise it while the hold stands.
  let err = engine
    .close_intake(
      held.intake_id,
      ClosureReason::RestitutionAchieved,
      held.version,
      a,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  // The authority's resolution remains the only way out.
  let resolved = engine
    .resolve_escalation(
      held.intake_id,
      EscalationOutcome::MeasureRatified,
      held.version,
      lead,
    )
    .await
    .unwrap()
    .value;
  assert_eq!(resolved.status, IntakeStatus::Closed);
  assert_eq!(
    resolved.closing_reason,
    Some(ClosureReason::AuthorityResolution)
  );
}

// ─── Stage machine guards ────────────────────────────────────────────────────

#[tokio::test]
async fn reception_has_no_linear_advance() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111228", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let err = engine
    .advance_stage(out.intake.intake_id, out.intake.version, a)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn closing_from_reception_requires_a_recorded_decision() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111229", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let err = engine
    .close_intake(
      out.intake.intake_id,
      ClosureReason::Other,
      out.intake.version,
      a,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn engine_stamped_closure_reasons_are_not_selectable() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111230", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  for reason in
    [ClosureReason::AdviceConcluded, ClosureReason::AuthorityResolution]
  {
    let err = engine
      .close_intake(out.intake.intake_id, reason, out.intake.version, a)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }
}

#[tokio::test]
async fn stale_version_is_rejected_with_a_conflict() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111231", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let stale = out.intake.version;
  engine
    .submit_reception_decision(
      out.intake.intake_id,
      full_intervention(one_violation()),
      stale,
      a,
    )
    .await
    .unwrap();

  // A second writer still holding the pre-decision version.
  let err = engine
    .advance_stage(out.intake.intake_id, stale, a)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict { expected, actual, .. }
    if expected == stale && actual > stale));
}

// ─── Measure plan ────────────────────────────────────────────────────────────

#[tokio::test]
async fn measure_plan_is_rejected_before_measure_definition() {
  let (_store, engine) = setup().await;
  let a = actor(Role::Professional);

  let out = engine
    .register_reception(reception("30111232", Uuid::new_v4()), a)
    .await
    .unwrap()
    .value;
  let expanded = engine
    .submit_reception_decision(
      out.intake.intake_id,
      full_intervention(one_violation()),
      out.intake.version,
      a,
    )
    .await
    .unwrap()
    .value;

  let plan = NewMeasurePlan {
    description: "family strengthening".into(),
    adopted_at:  Utc::now(),
    actions:     vec![NewMeasureAction {
      description: "re-enrol in school".into(),
      status:      ActionStatus::Pending,
      resource:    None,
    }],
  };
  let err = engine
    .save_measure_plan(expanded.intake_id, plan.clone(), expanded.version, a)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let intake =
    advance_to(&engine, expanded, IntakeStage::MeasureDefinition, a).await;
  let measure = engine
    .save_measure_plan(intake.intake_id, plan, intake.version, a)
    .await
    .unwrap()
    .value;
  assert_eq!(measure.actions.len(), 1);
  assert_eq!(measure.completion(), 0.0);
}

// ─── Group intervention replication ──────────────────────────────────────────

#[tokio::test]
async fn group_intervention_replicates_into_linked_open_intakes() {
  let (store, engine) = setup().await;
  let cascade = CascadeCoordinator::new(Arc::clone(&store));
  let a = actor(Role::Professional);
  let unit = Uuid::new_v4();

  let author = engine
    .register_reception(reception("30111233", unit), a)
    .await
    .unwrap()
    .value;
  let sibling = engine
    .register_reception(reception("30111234", unit), a)
    .await
    .unwrap()
    .value;

  // Link the sibling into the authoring intake's household.
  let linked = cascade
    .save_collections(
      author.intake.intake_id,
      author.intake.version,
      CollectionBundle {
        household_members: vec![NewHouseholdMember {
          full_name:        "Bruno Paredes".into(),
          national_id:      Some("30111234".into()),
          relationship:     "sibling".into(),
          birth_date:       None,
          cohabits:         true,
          linked_case_id:   Some(sibling.case.case_id),
          linked_intake_id: Some(sibling.intake.intake_id),
        }],
        ..CollectionBundle::default()
      },
      a,
    )
    .await
    .unwrap()
    .value;
  assert_eq!(linked.version, author.intake.version + 1);

  let outcome = cascade
    .record_intervention(
      author.intake.intake_id,
      InterventionDraft {
        kind:          InterventionKind::HomeVisit,
        narrative:     "joint home visit with both children".into(),
        occurred_at:   Utc::now(),
        professionals: vec![Uuid::new_v4()],
        documents:     Vec::new(),
      },
      true,
      a,
    )
    .await
    .unwrap()
    .value;

  assert!(outcome.primary.group);
  assert!(outcome.primary.replicated_from.is_none());
  assert_eq!(outcome.replicated.len(), 1);
  assert!(outcome.failed_targets.is_empty());

  let copies =
    store.list_interventions(sibling.intake.intake_id).await.unwrap();
  assert_eq!(copies.len(), 1);
  assert_eq!(
    copies[0].replicated_from,
    Some(outcome.primary.intervention_id)
  );
  assert!(copies[0].narrative.starts_with(GROUP_COPY_PREFIX));
  assert!(copies[0].narrative.ends_with("joint home visit with both children"));
}

#[tokio::test]
async fn replication_to_a_closed_intake_fails_that_target_only() {
  let (store, engine) = setup().await;
  let cascade = CascadeCoordinator::new(Arc::clone(&store));
  let a = actor(Role::Professional);
  let unit = Uuid::new_v4();

  let author = engine
    .register_reception(reception("30111235", unit), a)
    .await
    .unwrap()
    .value;
  let sibling = engine
    .register_reception(reception("30111236", unit), a)
    .await
    .unwrap()
    .value;

  // The sibling's episode ends in advice before the group record lands.
  engine
    .submit_reception_decision(
      sibling.intake.intake_id,
      DecisionSubmission {
        decision:    ReceptionDecision::AdviceOnly,
        narrative:   "advice only".into(),
        collections: CollectionBundle::default(),
      },
      sibling.intake.version,
      a,
    )
    .await
    .unwrap();

  cascade
    .save_collections(
      author.intake.intake_id,
      author.intake.version,
      CollectionBundle {
        household_members: vec![NewHouseholdMember {
          full_name:        "Bruno Paredes".into(),
          national_id:      None,
          relationship:     "sibling".into(),
          birth_date:       None,
          cohabits:         true,
          linked_case_id:   Some(sibling.case.case_id),
          linked_intake_id: Some(sibling.intake.intake_id),
        }],
        ..CollectionBundle::default()
      },
      a,
    )
    .await
    .unwrap();

  let outcome = cascade
    .record_intervention(
      author.intake.intake_id,
      InterventionDraft {
        kind:          InterventionKind::Meeting,
        narrative:     "household meeting".into(),
        occurred_at:   Utc::now(),
        professionals: Vec::new(),
        documents:     Vec::new(),
      },
      true,
      a,
    )
    .await
    .unwrap()
    .value;

  // Canonical record lands; the closed target is reported, not fatal.
  assert!(outcome.replicated.is_empty());
  assert_eq!(outcome.failed_targets.len(), 1);
  assert_eq!(
    outcome.failed_targets[0].intake_id,
    sibling.intake.intake_id
  );
  let own =
    store.list_interventions(author.intake.intake_id).await.unwrap();
  assert_eq!(own.len(), 1);
}

#[tokio::test]
async fn non_group_interventions_never_replicate() {
  let (store, engine) = setup().await;
  let cascade = CascadeCoordinator::new(Arc::clone(&store));
  let a = actor(Role::Professional);
  let unit = Uuid::new_v4();

  let author = engine
    .register_reception(reception("30111237", unit), a)
    .await
    .unwrap()
    .value;
  let sibling = engine
    .register_reception(reception("30111238", unit), a)
    .await
    .unwrap()
    .value;
  cascade
    .save_collections(
      author.intake.intake_id,
      author.intake.version,
      CollectionBundle {
        household_members: vec![NewHouseholdMember {
          full_name:        "Bruno Paredes".into(),
          national_id:      None,
          relationship:     "sibling".into(),
          birth_date:       None,
          cohabits:         true,
          linked_case_id:   Some(sibling.case.case_id),
          linked_intake_id: Some(sibling.intake.intake_id),
        }],
        ..CollectionBundle::default()
      },
      a,
    )
    .await
    .unwrap();

  let outcome = cascade
    .record_intervention(
      author.intake.intake_id,
      InterventionDraft {
        kind:          InterventionKind::PhoneCall,
        narrative:     "call with the school".into(),
        occurred_at:   Utc::now(),
        professionals: Vec::new(),
        documents:     Vec::new(),
      },
      false,
      a,
    )
    .await
    .unwrap()
    .value;

  assert!(outcome.replicated.is_empty());
  assert!(outcome.failed_targets.is_empty());
  assert!(store
    .list_interventions(sibling.intake.intake_id)
    .await
    .unwrap()
    .is_empty());
}

// ─── Transfers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_commits_through_a_single_use_ticket_and_notifies_the_destination()
{
  let (store, engine) = setup().await;
  let notifier = Arc::new(RecordingNotifier::new());
  let transfers =
    TransferCoordinator::new(Arc::clone(&store), Arc::clone(&notifier));

  let from_unit = Uuid::new_v4();
  let to_unit = Uuid::new_v4();
  let lead = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::UnitLead,
    unit_id: from_unit,
  };

  let receiver = UserRef {
    user_id:      Uuid::new_v4(),
    display_name: "Marta Quispe".into(),
    unit_id:      to_unit,
    role:         Role::Professional,
  };
  store.add_user(receiver.clone()).await.unwrap();
  store
    .add_user(UserRef {
      user_id:      Uuid::new_v4(),
      display_name: "Unrelated".into(),
      unit_id:      Uuid::new_v4(),
      role:         Role::Professional,
    })
    .await
    .unwrap();

  let out = engine
    .register_reception(reception("30111239", from_unit), lead)
    .await
    .unwrap()
    .value;

  let preview = transfers
    .preview(out.case.case_id, to_unit, "family relocated".into(), None, lead)
    .await
    .unwrap();
  assert_eq!(preview.from_unit, from_unit);
  assert_eq!(preview.case_number, out.case.case_number);

  let committed = transfers.commit(preview.ticket_id, lead).await.unwrap();
  assert!(committed.audit.is_recorded());
  assert_eq!(committed.value.record.from_unit, from_unit);
  assert_eq!(committed.value.record.to_unit, to_unit);
  assert_eq!(committed.value.notified, 1);
  assert_eq!(committed.value.notification_failures, 0);
  assert_eq!(notifier.sent_to(), vec![receiver.user_id]);

  let case = store.get_case(out.case.case_id).await.unwrap().unwrap();
  assert_eq!(case.unit_id, to_unit);
  assert_eq!(store.list_transfers(out.case.case_id).await.unwrap().len(), 1);

  // The ticket is spent.
  let err = transfers.commit(preview.ticket_id, lead).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn transfer_preview_is_gated_by_role_and_destination() {
  let (store, engine) = setup().await;
  let notifier = Arc::new(RecordingNotifier::new());
  let transfers =
    TransferCoordinator::new(Arc::clone(&store), Arc::clone(&notifier));

  let unit = Uuid::new_v4();
  let professional = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::Professional,
    unit_id: unit,
  };
  let lead = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::UnitLead,
    unit_id: unit,
  };
  let out = engine
    .register_reception(reception("30111240", unit), professional)
    .await
    .unwrap()
    .value;

  let err = transfers
    .preview(
      out.case.case_id,
      Uuid::new_v4(),
      "reorg".into(),
      None,
      professional,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  // Destination must differ from the owning unit.
  let err = transfers
    .preview(out.case.case_id, unit, "reorg".into(), None, lead)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn transfer_commit_must_come_from_the_initiator() {
  let (store, engine) = setup().await;
  let notifier = Arc::new(RecordingNotifier::new());
  let transfers =
    TransferCoordinator::new(Arc::clone(&store), Arc::clone(&notifier));

  let from_unit = Uuid::new_v4();
  let lead = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::UnitLead,
    unit_id: from_unit,
  };
  let other_lead = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::UnitLead,
    unit_id: from_unit,
  };
  let out = engine
    .register_reception(reception("30111241", from_unit), lead)
    .await
    .unwrap()
    .value;

  let preview = transfers
    .preview(out.case.case_id, Uuid::new_v4(), "handover".into(), None, lead)
    .await
    .unwrap();
  let err = transfers.commit(preview.ticket_id, other_lead).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  // The rejected commit left nothing behind.
  let case = store.get_case(out.case.case_id).await.unwrap().unwrap();
  assert_eq!(case.unit_id, from_unit);
  assert!(store.list_transfers(out.case.case_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn notification_failures_are_counted_not_fatal() {
  let (store, engine) = setup().await;
  let notifier = Arc::new(RecordingNotifier::new());
  let transfers =
    TransferCoordinator::new(Arc::clone(&store), Arc::clone(&notifier));

  let from_unit = Uuid::new_v4();
  let to_unit = Uuid::new_v4();
  let lead = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::UnitLead,
    unit_id: from_unit,
  };
  let unreachable = Uuid::new_v4();
  let reachable = Uuid::new_v4();
  for (user_id, name) in [(unreachable, "Off Duty"), (reachable, "On Duty")] {
    store
      .add_user(UserRef {
        user_id,
        display_name: name.into(),
        unit_id: to_unit,
        role: Role::Professional,
      })
      .await
      .unwrap();
  }
  notifier.fail_for.lock().unwrap().push(unreachable);

  let out = engine
    .register_reception(reception("30111242", from_unit), lead)
    .await
    .unwrap()
    .value;
  let preview = transfers
    .preview(out.case.case_id, to_unit, "coverage change".into(), None, lead)
    .await
    .unwrap();
  let committed =
    transfers.commit(preview.ticket_id, lead).await.unwrap().value;

  assert_eq!(committed.notified, 1);
  assert_eq!(committed.notification_failures, 1);
  assert_eq!(notifier.sent_to(), vec![reachable]);
  // The swap itself is untouched by delivery failures.
  let case = store.get_case(out.case.case_id).await.unwrap().unwrap();
  assert_eq!(case.unit_id, to_unit);
}

#[tokio::test]
async fn a_previewed_transfer_date_is_stamped_on_the_record() {
  let (store, engine) = setup().await;
  let notifier = Arc::new(RecordingNotifier::new());
  let transfers =
    TransferCoordinator::new(Arc::clone(&store), Arc::clone(&notifier));

  let from_unit = Uuid::new_v4();
  let lead = ActorContext {
    user_id: Uuid::new_v4(),
    role:    Role::UnitLead,
    unit_id: from_unit,
  };
  let out = engine
    .register_reception(reception("30111244", from_unit), lead)
    .await
    .unwrap()
    .value;

  // A back-dated administrative move.
  let effective = Utc::now() - chrono::Duration::days(3);
  let preview = transfers
    .preview(
      out.case.case_id,
      Uuid::new_v4(),
      "regularised after the fact".into(),
      Some(effective),
      lead,
    )
    .await
    .unwrap();
  let committed =
    transfers.commit(preview.ticket_id, lead).await.unwrap().value;
  assert_eq!(committed.record.transferred_at, effective);

  let logged = store.list_transfers(out.case.case_id).await.unwrap();
  assert_eq!(logged[0].transferred_at, effective);
}
