use chrono::Utc;
use uuid::Uuid;

use amparo_core::{
  actor::{Role, UserRef},
  audit::{AuditAction, NewAuditEntry},
  case::NewCase,
  child::{Gender, NewChild},
  intake::{
    ClosureReason, IntakeStage, IntakeStatus, IntakeTransition, NewIntake,
    ReceptionDecision,
  },
  intervention::{InterventionKind, NewIntervention},
  measure::{ActionStatus, NewMeasureAction, NewMeasurePlan},
  records::{
    CollectionBundle, NewCommunityContact, NewDocument, NewHouseholdMember,
    NewRightViolation, ViolationCategory,
  },
  store::CaseStore,
  transfer::NewTransfer,
};

use crate::{Error, SqliteStore};

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.unwrap()
}

fn new_child(national_id: &str) -> NewChild {
  NewChild {
    national_id:     national_id.into(),
    given_name:      "Lucía".into(),
    family_name:     "Mendoza".into(),
    birth_date:      None,
    gender:          Gender::Female,
    address:         None,
    health_notes:    None,
    school:          None,
    education_notes: None,
  }
}

async fn seed_intake(
  store: &SqliteStore,
  national_id: &str,
) -> (amparo_core::case::Case, amparo_core::intake::Intake) {
  let child = store.add_child(new_child(national_id)).await.unwrap();
  let case = store
    .add_case(NewCase {
      child_id: child.child_id,
      unit_id:  Uuid::new_v4(),
      zone_id:  Uuid::new_v4(),
    })
    .await
    .unwrap();
  let intake = store
    .open_intake(NewIntake {
      case_id:               case.case_id,
      assigned_professional: Uuid::new_v4(),
      opened_by:             Uuid::new_v4(),
      emergency:             false,
    })
    .await
    .unwrap();
  (case, intake)
}

async fn close_intake(
  store: &SqliteStore,
  intake: &amparo_core::intake::Intake,
) -> amparo_core::intake::Intake {
  store
    .apply_intake_transition(
      intake.intake_id,
      intake.version,
      IntakeTransition {
        stage: Some(IntakeStage::Closed),
        status: Some(IntakeStatus::Closed),
        closed_at: Some(Utc::now()),
        closing_reason: Some(ClosureReason::Other),
        ..IntakeTransition::default()
      },
      Uuid::new_v4(),
    )
    .await
    .unwrap()
}

// ─── Children ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn children_are_found_by_national_id_and_updated_in_place() {
  let store = store().await;
  let created = store.add_child(new_child("27555001")).await.unwrap();

  let found = store
    .find_child_by_national_id("27555001")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.child_id, created.child_id);
  assert!(store.find_child_by_national_id("nope").await.unwrap().is_none());

  let mut edited = found.clone();
  edited.address = Some("Barrio Norte 221".into());
  let updated = store.update_child(edited).await.unwrap();
  assert_eq!(updated.address.as_deref(), Some("Barrio Norte 221"));
  assert!(updated.updated_at >= created.updated_at);
}

// ─── Cases ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_child_gets_at_most_one_active_case() {
  let store = store().await;
  let child = store.add_child(new_child("27555002")).await.unwrap();
  let input = NewCase {
    child_id: child.child_id,
    unit_id:  Uuid::new_v4(),
    zone_id:  Uuid::new_v4(),
  };

  let case = store.add_case(input.clone()).await.unwrap();
  assert!(case.active);
  assert!(case.case_number.starts_with("EXP-"));

  let err = store.add_case(input.clone()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(amparo_core::Error::ActiveCaseExists(id))
      if id == child.child_id
  ));

  // Deactivating frees the slot for a new case, with a distinct number.
  store.set_case_active(case.case_id, false).await.unwrap();
  let second = store.add_case(input).await.unwrap();
  assert_ne!(second.case_number, case.case_number);

  let active = store
    .find_active_case(child.child_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(active.case_id, second.case_id);
}

#[tokio::test]
async fn a_case_requires_an_existing_child() {
  let store = store().await;
  let err = store
    .add_case(NewCase {
      child_id: Uuid::new_v4(),
      unit_id:  Uuid::new_v4(),
      zone_id:  Uuid::new_v4(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(amparo_core::Error::ChildNotFound(_))));
}

// ─── Intakes ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_open_intake_per_case_and_monotonic_seq_numbers() {
  let store = store().await;
  let (case, first) = seed_intake(&store, "27555003").await;
  assert_eq!(first.seq_no, 1);
  assert_eq!(first.stage, IntakeStage::Reception);

  let input = NewIntake {
    case_id:               case.case_id,
    assigned_professional: Uuid::new_v4(),
    opened_by:             Uuid::new_v4(),
    emergency:             true,
  };
  let err = store.open_intake(input.clone()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(amparo_core::Error::ActiveIntakeExists(id))
      if id == case.case_id
  ));

  close_intake(&store, &first).await;
  let second = store.open_intake(input).await.unwrap();
  assert_eq!(second.seq_no, 2);
  assert!(second.emergency);

  let all = store.list_intakes(case.case_id).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].seq_no, 1);
  assert_eq!(all[1].seq_no, 2);
}

#[tokio::test]
async fn transitions_bump_the_version_and_reject_stale_writers() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555004").await;
  let actor = Uuid::new_v4();

  let updated = store
    .apply_intake_transition(
      intake.intake_id,
      intake.version,
      IntakeTransition {
        decision: Some(ReceptionDecision::FullIntervention),
        decision_narrative: Some("intervention opens".into()),
        stage: Some(IntakeStage::Expansion),
        ..IntakeTransition::default()
      },
      actor,
    )
    .await
    .unwrap();
  assert_eq!(updated.version, intake.version + 1);
  assert_eq!(updated.stage, IntakeStage::Expansion);
  assert_eq!(updated.last_modified_by, actor);

  let err = store
    .apply_intake_transition(
      intake.intake_id,
      intake.version,
      IntakeTransition {
        stage: Some(IntakeStage::Synthesis),
        ..IntakeTransition::default()
      },
      actor,
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(amparo_core::Error::Conflict { expected, actual, .. })
      if expected == intake.version && actual == updated.version
  ));

  // The stale write left nothing behind.
  let reread = store.get_intake(intake.intake_id).await.unwrap().unwrap();
  assert_eq!(reread.stage, IntakeStage::Expansion);
  assert_eq!(reread.version, updated.version);
}

// ─── Replace-on-save ─────────────────────────────────────────────────────────

fn sample_bundle() -> CollectionBundle {
  CollectionBundle {
    right_violations:   vec![
      NewRightViolation {
        category:    ViolationCategory::Education,
        description: "not enrolled".into(),
      },
      NewRightViolation {
        category:    ViolationCategory::Health,
        description: "missed checkups".into(),
      },
    ],
    household_members:  vec![NewHouseholdMember {
      full_name:        "Rosa Mendoza".into(),
      national_id:      None,
      relationship:     "mother".into(),
      birth_date:       None,
      cohabits:         true,
      linked_case_id:   None,
      linked_intake_id: None,
    }],
    community_contacts: vec![NewCommunityContact {
      institution:  "Escuela 14".into(),
      contact_name: Some("Dir. Suárez".into()),
      phone:        None,
      notes:        None,
    }],
    documents:          vec![NewDocument {
      title:      "reception report".into(),
      blob_ref:   "blobs/aa/bb".into(),
      media_type: "application/pdf".into(),
    }],
  }
}

#[tokio::test]
async fn saving_collections_replaces_the_previous_set_wholesale() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555005").await;
  let actor = Uuid::new_v4();

  let after_first = store
    .replace_collections(intake.intake_id, intake.version, sample_bundle(), actor)
    .await
    .unwrap();
  assert_eq!(after_first.version, intake.version + 1);

  let loaded = store.get_collections(intake.intake_id).await.unwrap();
  assert_eq!(loaded.right_violations.len(), 2);
  assert_eq!(loaded.household_members.len(), 1);
  assert_eq!(loaded.community_contacts.len(), 1);
  assert_eq!(loaded.documents.len(), 1);

  // A smaller save wins completely; nothing from the first save survives.
  let smaller = CollectionBundle {
    right_violations: vec![NewRightViolation {
      category:    ViolationCategory::Protection,
      description: "single remaining finding".into(),
    }],
    ..CollectionBundle::default()
  };
  store
    .replace_collections(intake.intake_id, after_first.version, smaller, actor)
    .await
    .unwrap();

  let reloaded = store.get_collections(intake.intake_id).await.unwrap();
  assert_eq!(reloaded.right_violations.len(), 1);
  assert_eq!(
    reloaded.right_violations[0].description,
    "single remaining finding"
  );
  assert!(reloaded.household_members.is_empty());
  assert!(reloaded.community_contacts.is_empty());
  assert!(reloaded.documents.is_empty());
}

#[tokio::test]
async fn resaving_the_same_payload_yields_the_same_row_set() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555013").await;
  let actor = Uuid::new_v4();

  let after_first = store
    .replace_collections(intake.intake_id, intake.version, sample_bundle(), actor)
    .await
    .unwrap();
  let first = store.get_collections(intake.intake_id).await.unwrap();

  let after_second = store
    .replace_collections(
      intake.intake_id,
      after_first.version,
      sample_bundle(),
      actor,
    )
    .await
    .unwrap();
  assert_eq!(after_second.version, after_first.version + 1);

  // Row-for-row the same set; only the ids are reassigned per save.
  let second = store.get_collections(intake.intake_id).await.unwrap();
  assert_eq!(
    second
      .right_violations
      .iter()
      .map(|v| (v.category, v.description.clone()))
      .collect::<Vec<_>>(),
    first
      .right_violations
      .iter()
      .map(|v| (v.category, v.description.clone()))
      .collect::<Vec<_>>(),
  );
  assert_eq!(second.household_members.len(), first.household_members.len());
  assert_eq!(
    second.household_members[0].full_name,
    first.household_members[0].full_name
  );
  assert_eq!(
    second.community_contacts[0].institution,
    first.community_contacts[0].institution
  );
  assert_eq!(second.documents[0].blob_ref, first.documents[0].blob_ref);
  assert_ne!(
    second.right_violations[0].violation_id,
    first.right_violations[0].violation_id
  );
}

#[tokio::test]
async fn replace_on_save_never_touches_intervention_attachments() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555006").await;
  let actor = Uuid::new_v4();

  let record = store
    .add_intervention(NewIntervention {
      intake_id:       intake.intake_id,
      kind:            InterventionKind::Interview,
      narrative:       "first interview".into(),
      occurred_at:     Utc::now(),
      recorded_by:     actor,
      group:           false,
      replicated_from: None,
      professionals:   Vec::new(),
      documents:       vec![NewDocument {
        title:      "interview notes".into(),
        blob_ref:   "blobs/cc/dd".into(),
        media_type: "text/plain".into(),
      }],
    })
    .await
    .unwrap();

  // An empty form save wipes the free-standing documents only.
  store
    .replace_collections(
      intake.intake_id,
      intake.version,
      CollectionBundle::default(),
      actor,
    )
    .await
    .unwrap();

  let collections = store.get_collections(intake.intake_id).await.unwrap();
  assert!(collections.documents.is_empty());

  // The attachment is still reachable through its intervention.
  let interventions =
    store.list_interventions(intake.intake_id).await.unwrap();
  assert_eq!(interventions.len(), 1);
  assert_eq!(interventions[0].intervention_id, record.intervention_id);
}

#[tokio::test]
async fn replace_on_save_is_conditioned_on_the_version() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555007").await;
  let actor = Uuid::new_v4();

  store
    .replace_collections(intake.intake_id, intake.version, sample_bundle(), actor)
    .await
    .unwrap();

  let err = store
    .replace_collections(
      intake.intake_id,
      intake.version,
      CollectionBundle::default(),
      actor,
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(amparo_core::Error::Conflict { .. })
  ));

  // The rejected save deleted nothing.
  let loaded = store.get_collections(intake.intake_id).await.unwrap();
  assert_eq!(loaded.right_violations.len(), 2);
}

// ─── Interventions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn interventions_require_an_open_intake() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555008").await;
  close_intake(&store, &intake).await;

  let err = store
    .add_intervention(NewIntervention {
      intake_id:       intake.intake_id,
      kind:            InterventionKind::PhoneCall,
      narrative:       "too late".into(),
      occurred_at:     Utc::now(),
      recorded_by:     Uuid::new_v4(),
      group:           false,
      replicated_from: None,
      professionals:   Vec::new(),
      documents:       Vec::new(),
    })
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(amparo_core::Error::IntakeNotOpen(id))
      if id == intake.intake_id
  ));
  assert!(store
    .list_interventions(intake.intake_id)
    .await
    .unwrap()
    .is_empty());
}

#[tokio::test]
async fn intervention_professionals_are_stored_deduplicated() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555009").await;
  let colleague = Uuid::new_v4();

  let record = store
    .add_intervention(NewIntervention {
      intake_id:       intake.intake_id,
      kind:            InterventionKind::Meeting,
      narrative:       "network meeting".into(),
      occurred_at:     Utc::now(),
      recorded_by:     Uuid::new_v4(),
      group:           true,
      replicated_from: None,
      professionals:   vec![colleague, colleague],
      documents:       Vec::new(),
    })
    .await
    .unwrap();

  let listed = store.list_interventions(intake.intake_id).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].intervention_id, record.intervention_id);
  assert_eq!(listed[0].professionals, vec![colleague]);
  assert!(listed[0].group);
}

// ─── Measure plan ────────────────────────────────────────────────────────────

#[tokio::test]
async fn saving_a_measure_plan_replaces_the_previous_one() {
  let store = store().await;
  let (_case, intake) = seed_intake(&store, "27555010").await;
  let actor = Uuid::new_v4();

  let first = store
    .save_measure_plan(
      intake.intake_id,
      intake.version,
      NewMeasurePlan {
        description: "initial plan".into(),
        adopted_at:  Utc::now(),
        actions:     vec![
          NewMeasureAction {
            description: "school re-enrolment".into(),
            status:      ActionStatus::Pending,
            resource:    None,
          },
          NewMeasureAction {
            description: "family counselling".into(),
            status:      ActionStatus::InProgress,
            resource:    Some("municipal programme".into()),
          },
        ],
      },
      actor,
    )
    .await
    .unwrap();
  assert_eq!(first.actions.len(), 2);

  let second = store
    .save_measure_plan(
      intake.intake_id,
      intake.version + 1,
      NewMeasurePlan {
        description: "revised plan".into(),
        adopted_at:  Utc::now(),
        actions:     vec![NewMeasureAction {
          description: "school re-enrolment".into(),
          status:      ActionStatus::Done,
          resource:    None,
        }],
      },
      actor,
    )
    .await
    .unwrap();
  assert_ne!(second.measure_id, first.measure_id);

  let loaded = store
    .get_measure_plan(intake.intake_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(loaded.measure_id, second.measure_id);
  assert_eq!(loaded.description, "revised plan");
  assert_eq!(loaded.actions.len(), 1);
  assert_eq!(loaded.completion(), 1.0);
}

// ─── Transfers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_transfer_swaps_ownership_and_logs_the_move_atomically() {
  let store = store().await;
  let (case, _intake) = seed_intake(&store, "27555011").await;
  let to_unit = Uuid::new_v4();

  let record = store
    .transfer_case(NewTransfer {
      case_id:        case.case_id,
      to_unit,
      reason:         "family moved districts".into(),
      transferred_at: Utc::now(),
      initiated_by:   Uuid::new_v4(),
    })
    .await
    .unwrap();
  assert_eq!(record.from_unit, case.unit_id);
  assert_eq!(record.to_unit, to_unit);

  let reread = store.get_case(case.case_id).await.unwrap().unwrap();
  assert_eq!(reread.unit_id, to_unit);

  let log = store.list_transfers(case.case_id).await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].transfer_id, record.transfer_id);
}

#[tokio::test]
async fn a_transfer_of_a_missing_case_writes_nothing() {
  let store = store().await;
  let ghost = Uuid::new_v4();

  let err = store
    .transfer_case(NewTransfer {
      case_id:        ghost,
      to_unit:        Uuid::new_v4(),
      reason:         "n/a".into(),
      transferred_at: Utc::now(),
      initiated_by:   Uuid::new_v4(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(amparo_core::Error::CaseNotFound(_))));
  assert!(store.list_transfers(ghost).await.unwrap().is_empty());
}

// ─── Users and audit ─────────────────────────────────────────────────────────

#[tokio::test]
async fn users_are_listed_by_unit() {
  let store = store().await;
  let unit = Uuid::new_v4();
  for name in ["Eva", "Tomás"] {
    store
      .add_user(UserRef {
        user_id:      Uuid::new_v4(),
        display_name: name.into(),
        unit_id:      unit,
        role:         Role::Professional,
      })
      .await
      .unwrap();
  }
  store
    .add_user(UserRef {
      user_id:      Uuid::new_v4(),
      display_name: "Elsewhere".into(),
      unit_id:      Uuid::new_v4(),
      role:         Role::UnitLead,
    })
    .await
    .unwrap();

  let members = store.list_users_in_unit(unit).await.unwrap();
  assert_eq!(members.len(), 2);
  assert!(members.iter().all(|u| u.unit_id == unit));
}

#[tokio::test]
async fn audit_entries_round_trip_their_payload() {
  let store = store().await;
  let record_id = Uuid::new_v4();

  store
    .append_audit(NewAuditEntry {
      table_name: "intakes".into(),
      record_id,
      action:     AuditAction::Transition,
      actor_id:   Uuid::new_v4(),
      payload:    Some(serde_json::json!({ "from": "reception" })),
    })
    .await
    .unwrap();
  store
    .append_audit(NewAuditEntry {
      table_name: "intakes".into(),
      record_id,
      action:     AuditAction::Update,
      actor_id:   Uuid::new_v4(),
      payload:    None,
    })
    .await
    .unwrap();

  let trail = store.list_audit_for(record_id).await.unwrap();
  assert_eq!(trail.len(), 2);
  assert_eq!(trail[0].action, AuditAction::Transition);
  assert_eq!(
    trail[0].payload,
    Some(serde_json::json!({ "from": "reception" }))
  );
  assert_eq!(trail[1].payload, None);
}

// ─── Durability ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn an_on_disk_store_survives_reopening() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("amparo.db");

  let child_id = {
    let store = SqliteStore::open(&path).await.unwrap();
    store.add_child(new_child("27555012")).await.unwrap().child_id
  };

  let store = SqliteStore::open(&path).await.unwrap();
  let found = store
    .find_child_by_national_id("27555012")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.child_id, child_id);
}
