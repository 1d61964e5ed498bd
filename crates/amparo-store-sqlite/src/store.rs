//! [`SqliteStore`] — the SQLite implementation of [`CaseStore`].
//!
//! Every compound write (intake opening, transitions, replace-on-save,
//! intervention inserts, measure-plan saves, the transfer ownership swap)
//! runs inside one SQLite transaction, so each operation commits entirely or
//! not at all. Optimistic concurrency: state-changing intake writes check
//! the caller's expected version inside the same transaction.

use std::{future::Future, path::Path};

use chrono::{Datelike, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use amparo_core::{
  actor::UserRef,
  audit::{AuditEntry, NewAuditEntry},
  case::{Case, NewCase},
  child::{Child, NewChild},
  intake::{
    Intake, IntakeStage, IntakeStatus, IntakeTransition, NewIntake,
  },
  intervention::{InterventionRecord, NewIntervention},
  measure::{Measure, NewMeasurePlan},
  records::{CollectionBundle, HouseholdMember, IntakeCollections},
  store::CaseStore,
  transfer::{NewTransfer, TransferRecord},
};

use crate::{
  encode::{
    RawAction, RawAudit, RawCase, RawChild, RawContact, RawDocument,
    RawIntake, RawIntervention, RawMember, RawTransfer, RawUser,
    RawViolation, encode_action_status, encode_audit_action,
    encode_closure_reason, encode_date, encode_decision, encode_dt,
    encode_gender, encode_intervention_kind, encode_role, encode_stage,
    encode_status, encode_uuid, encode_violation_category,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Amparo case store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn child_row(row: &rusqlite::Row) -> rusqlite::Result<RawChild> {
  Ok(RawChild {
    child_id:        row.get(0)?,
    national_id:     row.get(1)?,
    given_name:      row.get(2)?,
    family_name:     row.get(3)?,
    birth_date:      row.get(4)?,
    gender:          row.get(5)?,
    address:         row.get(6)?,
    health_notes:    row.get(7)?,
    school:          row.get(8)?,
    education_notes: row.get(9)?,
    created_at:      row.get(10)?,
    updated_at:      row.get(11)?,
  })
}

const CHILD_COLS: &str = "child_id, national_id, given_name, family_name, \
                          birth_date, gender, address, health_notes, school, \
                          education_notes, created_at, updated_at";

fn case_row(row: &rusqlite::Row) -> rusqlite::Result<RawCase> {
  Ok(RawCase {
    case_id:     row.get(0)?,
    case_number: row.get(1)?,
    child_id:    row.get(2)?,
    active:      row.get(3)?,
    unit_id:     row.get(4)?,
    zone_id:     row.get(5)?,
    opened_at:   row.get(6)?,
  })
}

const CASE_COLS: &str =
  "case_id, case_number, child_id, active, unit_id, zone_id, opened_at";

fn intake_row(row: &rusqlite::Row) -> rusqlite::Result<RawIntake> {
  Ok(RawIntake {
    intake_id:             row.get(0)?,
    case_id:               row.get(1)?,
    seq_no:                row.get(2)?,
    stage:                 row.get(3)?,
    status:                row.get(4)?,
    opened_at:             row.get(5)?,
    closed_at:             row.get(6)?,
    closing_reason:        row.get(7)?,
    assigned_professional: row.get(8)?,
    last_modified_by:      row.get(9)?,
    emergency:             row.get(10)?,
    decision:              row.get(11)?,
    decision_narrative:    row.get(12)?,
    escalation_pending:    row.get(13)?,
    version:               row.get(14)?,
  })
}

const INTAKE_COLS: &str = "intake_id, case_id, seq_no, stage, status, \
                           opened_at, closed_at, closing_reason, \
                           assigned_professional, last_modified_by, \
                           emergency, decision, decision_narrative, \
                           escalation_pending, version";

fn member_row(row: &rusqlite::Row) -> rusqlite::Result<RawMember> {
  Ok(RawMember {
    member_id:        row.get(0)?,
    intake_id:        row.get(1)?,
    full_name:        row.get(2)?,
    national_id:      row.get(3)?,
    relationship:     row.get(4)?,
    birth_date:       row.get(5)?,
    cohabits:         row.get(6)?,
    linked_case_id:   row.get(7)?,
    linked_intake_id: row.get(8)?,
  })
}

const MEMBER_COLS: &str = "member_id, intake_id, full_name, national_id, \
                           relationship, birth_date, cohabits, \
                           linked_case_id, linked_intake_id";

fn intervention_row(row: &rusqlite::Row) -> rusqlite::Result<RawIntervention> {
  Ok(RawIntervention {
    intervention_id: row.get(0)?,
    intake_id:       row.get(1)?,
    kind:            row.get(2)?,
    narrative:       row.get(3)?,
    occurred_at:     row.get(4)?,
    recorded_at:     row.get(5)?,
    recorded_by:     row.get(6)?,
    is_group:        row.get(7)?,
    replicated_from: row.get(8)?,
  })
}

const INTERVENTION_COLS: &str = "intervention_id, intake_id, kind, \
                                 narrative, occurred_at, recorded_at, \
                                 recorded_by, is_group, replicated_from";

// ─── Transactional helpers ───────────────────────────────────────────────────
//
// These run synchronously on the connection thread, inside `conn.call`.
// They return the crate error type so invariant violations and version
// conflicts surface as typed domain errors.

fn query_intake(
  conn: &rusqlite::Connection,
  intake_id: &str,
) -> Result<Option<Intake>> {
  let raw = conn
    .query_row(
      &format!("SELECT {INTAKE_COLS} FROM intakes WHERE intake_id = ?1"),
      rusqlite::params![intake_id],
      intake_row,
    )
    .optional()?;
  raw.map(RawIntake::into_intake).transpose()
}

fn query_case(
  conn: &rusqlite::Connection,
  case_id: &str,
) -> Result<Option<Case>> {
  let raw = conn
    .query_row(
      &format!("SELECT {CASE_COLS} FROM cases WHERE case_id = ?1"),
      rusqlite::params![case_id],
      case_row,
    )
    .optional()?;
  raw.map(RawCase::into_case).transpose()
}

/// Read an intake and check the caller's expected version. The caller is
/// responsible for running this inside the transaction that performs the
/// dependent write.
fn load_versioned_intake(
  conn: &rusqlite::Connection,
  intake_id: Uuid,
  expected_version: i64,
) -> Result<Intake> {
  let intake = query_intake(conn, &encode_uuid(intake_id))?
    .ok_or(amparo_core::Error::IntakeNotFound(intake_id))?;
  if intake.version != expected_version {
    return Err(
      amparo_core::Error::Conflict {
        intake_id,
        expected: expected_version,
        actual: intake.version,
      }
      .into(),
    );
  }
  Ok(intake)
}

fn tx_add_case(conn: &mut rusqlite::Connection, input: NewCase) -> Result<Case> {
  let tx = conn.transaction()?;

  let child_id_str = encode_uuid(input.child_id);
  let child_exists: bool = tx
    .query_row(
      "SELECT 1 FROM children WHERE child_id = ?1",
      rusqlite::params![child_id_str],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if !child_exists {
    return Err(amparo_core::Error::ChildNotFound(input.child_id).into());
  }

  let has_active: bool = tx
    .query_row(
      "SELECT 1 FROM cases WHERE child_id = ?1 AND active = 1",
      rusqlite::params![child_id_str],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if has_active {
    return Err(amparo_core::Error::ActiveCaseExists(input.child_id).into());
  }

  let year = Utc::now().year();
  let seq: i64 = tx.query_row(
    "SELECT COUNT(*) + 1 FROM cases WHERE case_number LIKE ?1",
    rusqlite::params![format!("EXP-{year}-%")],
    |r| r.get(0),
  )?;

  let case = Case {
    case_id:     Uuid::new_v4(),
    case_number: format!("EXP-{year}-{seq:05}"),
    child_id:    input.child_id,
    active:      true,
    unit_id:     input.unit_id,
    zone_id:     input.zone_id,
    opened_at:   Utc::now(),
  };

  tx.execute(
    "INSERT INTO cases (case_id, case_number, child_id, active, unit_id, \
     zone_id, opened_at) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
    rusqlite::params![
      encode_uuid(case.case_id),
      case.case_number,
      child_id_str,
      encode_uuid(case.unit_id),
      encode_uuid(case.zone_id),
      encode_dt(case.opened_at),
    ],
  )?;

  tx.commit()?;
  Ok(case)
}

fn tx_open_intake(
  conn: &mut rusqlite::Connection,
  input: NewIntake,
) -> Result<Intake> {
  let tx = conn.transaction()?;

  let case_id_str = encode_uuid(input.case_id);
  if query_case(&tx, &case_id_str)?.is_none() {
    return Err(amparo_core::Error::CaseNotFound(input.case_id).into());
  }

  let open_exists: bool = tx
    .query_row(
      "SELECT 1 FROM intakes WHERE case_id = ?1 AND status = 'open'",
      rusqlite::params![case_id_str],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if open_exists {
    return Err(amparo_core::Error::ActiveIntakeExists(input.case_id).into());
  }

  let seq_no: i64 = tx.query_row(
    "SELECT COALESCE(MAX(seq_no), 0) + 1 FROM intakes WHERE case_id = ?1",
    rusqlite::params![case_id_str],
    |r| r.get(0),
  )?;

  let intake = Intake {
    intake_id: Uuid::new_v4(),
    case_id: input.case_id,
    seq_no,
    stage: IntakeStage::Reception,
    status: IntakeStatus::Open,
    opened_at: Utc::now(),
    closed_at: None,
    closing_reason: None,
    assigned_professional: input.assigned_professional,
    last_modified_by: input.opened_by,
    emergency: input.emergency,
    decision: None,
    decision_narrative: None,
    escalation_pending: false,
    version: 0,
  };

  tx.execute(
    "INSERT INTO intakes (intake_id, case_id, seq_no, stage, status, \
     opened_at, assigned_professional, last_modified_by, emergency, \
     escalation_pending, version) \
     VALUES (?1, ?2, ?3, 'reception', 'open', ?4, ?5, ?6, ?7, 0, 0)",
    rusqlite::params![
      encode_uuid(intake.intake_id),
      case_id_str,
      seq_no,
      encode_dt(intake.opened_at),
      encode_uuid(intake.assigned_professional),
      encode_uuid(intake.last_modified_by),
      intake.emergency,
    ],
  )?;

  tx.commit()?;
  Ok(intake)
}

fn tx_apply_transition(
  conn: &mut rusqlite::Connection,
  intake_id: Uuid,
  expected_version: i64,
  change: IntakeTransition,
  actor_id: Uuid,
) -> Result<Intake> {
  let tx = conn.transaction()?;
  let mut intake = load_versioned_intake(&tx, intake_id, expected_version)?;

  if let Some(stage) = change.stage {
    intake.stage = stage;
  }
  if let Some(status) = change.status {
    intake.status = status;
  }
  if let Some(closed_at) = change.closed_at {
    intake.closed_at = Some(closed_at);
  }
  if let Some(reason) = change.closing_reason {
    intake.closing_reason = Some(reason);
  }
  if let Some(decision) = change.decision {
    intake.decision = Some(decision);
  }
  if let Some(narrative) = change.decision_narrative {
    intake.decision_narrative = Some(narrative);
  }
  if let Some(pending) = change.escalation_pending {
    intake.escalation_pending = pending;
  }
  intake.last_modified_by = actor_id;
  intake.version = expected_version + 1;

  tx.execute(
    "UPDATE intakes SET stage = ?1, status = ?2, closed_at = ?3, \
     closing_reason = ?4, decision = ?5, decision_narrative = ?6, \
     escalation_pending = ?7, last_modified_by = ?8, version = ?9 \
     WHERE intake_id = ?10 AND version = ?11",
    rusqlite::params![
      encode_stage(intake.stage),
      encode_status(intake.status),
      intake.closed_at.map(encode_dt),
      intake.closing_reason.map(encode_closure_reason),
      intake.decision.map(encode_decision),
      intake.decision_narrative,
      intake.escalation_pending,
      encode_uuid(actor_id),
      intake.version,
      encode_uuid(intake_id),
      expected_version,
    ],
  )?;

  tx.commit()?;
  Ok(intake)
}

fn tx_replace_collections(
  conn: &mut rusqlite::Connection,
  intake_id: Uuid,
  expected_version: i64,
  bundle: CollectionBundle,
  actor_id: Uuid,
) -> Result<Intake> {
  let tx = conn.transaction()?;
  let mut intake = load_versioned_intake(&tx, intake_id, expected_version)?;
  let intake_id_str = encode_uuid(intake_id);
  let now = Utc::now();

  // Delete-all-then-reinsert, all four collections as one unit.
  tx.execute(
    "DELETE FROM right_violations WHERE intake_id = ?1",
    rusqlite::params![intake_id_str],
  )?;
  tx.execute(
    "DELETE FROM household_members WHERE intake_id = ?1",
    rusqlite::params![intake_id_str],
  )?;
  tx.execute(
    "DELETE FROM community_contacts WHERE intake_id = ?1",
    rusqlite::params![intake_id_str],
  )?;
  // Intervention attachments are not part of the form's set.
  tx.execute(
    "DELETE FROM documents WHERE intake_id = ?1 AND intervention_id IS NULL",
    rusqlite::params![intake_id_str],
  )?;

  for v in &bundle.right_violations {
    tx.execute(
      "INSERT INTO right_violations (violation_id, intake_id, category, \
       description) VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        intake_id_str,
        encode_violation_category(v.category),
        v.description,
      ],
    )?;
  }
  for m in &bundle.household_members {
    tx.execute(
      "INSERT INTO household_members (member_id, intake_id, full_name, \
       national_id, relationship, birth_date, cohabits, linked_case_id, \
       linked_intake_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        intake_id_str,
        m.full_name,
        m.national_id,
        m.relationship,
        m.birth_date.map(encode_date),
        m.cohabits,
        m.linked_case_id.map(encode_uuid),
        m.linked_intake_id.map(encode_uuid),
      ],
    )?;
  }
  for c in &bundle.community_contacts {
    tx.execute(
      "INSERT INTO community_contacts (contact_id, intake_id, institution, \
       contact_name, phone, notes) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        intake_id_str,
        c.institution,
        c.contact_name,
        c.phone,
        c.notes,
      ],
    )?;
  }
  for d in &bundle.documents {
    tx.execute(
      "INSERT INTO documents (document_id, intake_id, intervention_id, \
       title, blob_ref, media_type, uploaded_by, recorded_at) \
       VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        intake_id_str,
        d.title,
        d.blob_ref,
        d.media_type,
        encode_uuid(actor_id),
        encode_dt(now),
      ],
    )?;
  }

  intake.version = expected_version + 1;
  intake.last_modified_by = actor_id;
  tx.execute(
    "UPDATE intakes SET version = ?1, last_modified_by = ?2 \
     WHERE intake_id = ?3 AND version = ?4",
    rusqlite::params![
      intake.version,
      encode_uuid(actor_id),
      intake_id_str,
      expected_version,
    ],
  )?;

  tx.commit()?;
  Ok(intake)
}

fn tx_add_intervention(
  conn: &mut rusqlite::Connection,
  input: NewIntervention,
) -> Result<InterventionRecord> {
  let tx = conn.transaction()?;

  let intake = query_intake(&tx, &encode_uuid(input.intake_id))?
    .ok_or(amparo_core::Error::IntakeNotFound(input.intake_id))?;
  if !intake.is_open() {
    return Err(amparo_core::Error::IntakeNotOpen(input.intake_id).into());
  }

  let record = InterventionRecord {
    intervention_id: Uuid::new_v4(),
    intake_id:       input.intake_id,
    kind:            input.kind,
    narrative:       input.narrative,
    occurred_at:     input.occurred_at,
    recorded_at:     Utc::now(),
    recorded_by:     input.recorded_by,
    group:           input.group,
    replicated_from: input.replicated_from,
    professionals:   input.professionals,
  };

  let record_id_str = encode_uuid(record.intervention_id);
  let intake_id_str = encode_uuid(record.intake_id);

  tx.execute(
    "INSERT INTO interventions (intervention_id, intake_id, kind, \
     narrative, occurred_at, recorded_at, recorded_by, is_group, \
     replicated_from) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      record_id_str,
      intake_id_str,
      encode_intervention_kind(record.kind),
      record.narrative,
      encode_dt(record.occurred_at),
      encode_dt(record.recorded_at),
      encode_uuid(record.recorded_by),
      record.group,
      record.replicated_from.map(encode_uuid),
    ],
  )?;

  for professional in &record.professionals {
    tx.execute(
      "INSERT OR IGNORE INTO intervention_professionals \
       (intervention_id, professional_id) VALUES (?1, ?2)",
      rusqlite::params![record_id_str, encode_uuid(*professional)],
    )?;
  }

  for doc in &input.documents {
    tx.execute(
      "INSERT INTO documents (document_id, intake_id, intervention_id, \
       title, blob_ref, media_type, uploaded_by, recorded_at) \
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        intake_id_str,
        record_id_str,
        doc.title,
        doc.blob_ref,
        doc.media_type,
        encode_uuid(record.recorded_by),
        encode_dt(record.recorded_at),
      ],
    )?;
  }

  tx.commit()?;
  Ok(record)
}

fn tx_save_measure_plan(
  conn: &mut rusqlite::Connection,
  intake_id: Uuid,
  expected_version: i64,
  plan: NewMeasurePlan,
  actor_id: Uuid,
) -> Result<Measure> {
  let tx = conn.transaction()?;
  load_versioned_intake(&tx, intake_id, expected_version)?;
  let intake_id_str = encode_uuid(intake_id);

  tx.execute(
    "DELETE FROM measure_actions WHERE measure_id IN \
     (SELECT measure_id FROM measures WHERE intake_id = ?1)",
    rusqlite::params![intake_id_str],
  )?;
  tx.execute(
    "DELETE FROM measures WHERE intake_id = ?1",
    rusqlite::params![intake_id_str],
  )?;

  let measure_id = Uuid::new_v4();
  tx.execute(
    "INSERT INTO measures (measure_id, intake_id, description, adopted_at) \
     VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      encode_uuid(measure_id),
      intake_id_str,
      plan.description,
      encode_dt(plan.adopted_at),
    ],
  )?;

  let mut actions = Vec::with_capacity(plan.actions.len());
  for a in &plan.actions {
    let action_id = Uuid::new_v4();
    tx.execute(
      "INSERT INTO measure_actions (action_id, measure_id, description, \
       status, resource) VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        encode_uuid(action_id),
        encode_uuid(measure_id),
        a.description,
        encode_action_status(a.status),
        a.resource,
      ],
    )?;
    actions.push(amparo_core::measure::MeasureAction {
      action_id,
      measure_id,
      description: a.description.clone(),
      status: a.status,
      resource: a.resource.clone(),
    });
  }

  tx.execute(
    "UPDATE intakes SET version = ?1, last_modified_by = ?2 \
     WHERE intake_id = ?3 AND version = ?4",
    rusqlite::params![
      expected_version + 1,
      encode_uuid(actor_id),
      intake_id_str,
      expected_version,
    ],
  )?;

  tx.commit()?;
  Ok(Measure {
    measure_id,
    intake_id,
    description: plan.description,
    adopted_at: plan.adopted_at,
    actions,
  })
}

fn tx_transfer_case(
  conn: &mut rusqlite::Connection,
  input: NewTransfer,
) -> Result<TransferRecord> {
  let tx = conn.transaction()?;

  let case_id_str = encode_uuid(input.case_id);
  let case = query_case(&tx, &case_id_str)?
    .ok_or(amparo_core::Error::CaseNotFound(input.case_id))?;

  let record = TransferRecord {
    transfer_id:    Uuid::new_v4(),
    case_id:        input.case_id,
    from_unit:      case.unit_id,
    to_unit:        input.to_unit,
    reason:         input.reason,
    transferred_at: input.transferred_at,
    initiated_by:   input.initiated_by,
  };

  tx.execute(
    "INSERT INTO transfers (transfer_id, case_id, from_unit, to_unit, \
     reason, transferred_at, initiated_by) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      encode_uuid(record.transfer_id),
      case_id_str,
      encode_uuid(record.from_unit),
      encode_uuid(record.to_unit),
      record.reason,
      encode_dt(record.transferred_at),
      encode_uuid(record.initiated_by),
    ],
  )?;

  tx.execute(
    "UPDATE cases SET unit_id = ?1 WHERE case_id = ?2",
    rusqlite::params![encode_uuid(record.to_unit), case_id_str],
  )?;

  tx.commit()?;
  Ok(record)
}

fn query_collections(
  conn: &rusqlite::Connection,
  intake_id: &str,
) -> Result<IntakeCollections> {
  let mut stmt = conn.prepare(
    "SELECT violation_id, intake_id, category, description \
     FROM right_violations WHERE intake_id = ?1",
  )?;
  let right_violations = stmt
    .query_map(rusqlite::params![intake_id], |row| {
      Ok(RawViolation {
        violation_id: row.get(0)?,
        intake_id:    row.get(1)?,
        category:     row.get(2)?,
        description:  row.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawViolation::into_violation)
    .collect::<Result<_>>()?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {MEMBER_COLS} FROM household_members WHERE intake_id = ?1"
  ))?;
  let household_members = stmt
    .query_map(rusqlite::params![intake_id], member_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawMember::into_member)
    .collect::<Result<_>>()?;

  let mut stmt = conn.prepare(
    "SELECT contact_id, intake_id, institution, contact_name, phone, notes \
     FROM community_contacts WHERE intake_id = ?1",
  )?;
  let community_contacts = stmt
    .query_map(rusqlite::params![intake_id], |row| {
      Ok(RawContact {
        contact_id:   row.get(0)?,
        intake_id:    row.get(1)?,
        institution:  row.get(2)?,
        contact_name: row.get(3)?,
        phone:        row.get(4)?,
        notes:        row.get(5)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawContact::into_contact)
    .collect::<Result<_>>()?;

  let mut stmt = conn.prepare(
    "SELECT document_id, intake_id, intervention_id, title, blob_ref, \
     media_type, uploaded_by, recorded_at \
     FROM documents WHERE intake_id = ?1 AND intervention_id IS NULL",
  )?;
  let documents = stmt
    .query_map(rusqlite::params![intake_id], |row| {
      Ok(RawDocument {
        document_id:     row.get(0)?,
        intake_id:       row.get(1)?,
        intervention_id: row.get(2)?,
        title:           row.get(3)?,
        blob_ref:        row.get(4)?,
        media_type:      row.get(5)?,
        uploaded_by:     row.get(6)?,
        recorded_at:     row.get(7)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawDocument::into_document)
    .collect::<Result<_>>()?;

  Ok(IntakeCollections {
    right_violations,
    household_members,
    community_contacts,
    documents,
  })
}

fn query_interventions(
  conn: &rusqlite::Connection,
  intake_id: &str,
) -> Result<Vec<InterventionRecord>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {INTERVENTION_COLS} FROM interventions \
     WHERE intake_id = ?1 ORDER BY recorded_at"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params![intake_id], intervention_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut prof_stmt = conn.prepare(
    "SELECT professional_id FROM intervention_professionals \
     WHERE intervention_id = ?1",
  )?;

  let mut records = Vec::with_capacity(raws.len());
  for raw in raws {
    let professionals = prof_stmt
      .query_map(rusqlite::params![raw.intervention_id], |r| r.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    records.push(raw.into_record(professionals)?);
  }
  Ok(records)
}

fn query_measure_plan(
  conn: &rusqlite::Connection,
  intake_id: &str,
) -> Result<Option<Measure>> {
  let header: Option<(String, String, String)> = conn
    .query_row(
      "SELECT measure_id, description, adopted_at FROM measures \
       WHERE intake_id = ?1",
      rusqlite::params![intake_id],
      |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .optional()?;

  let Some((measure_id_str, description, adopted_at_str)) = header else {
    return Ok(None);
  };

  let mut stmt = conn.prepare(
    "SELECT action_id, measure_id, description, status, resource \
     FROM measure_actions WHERE measure_id = ?1",
  )?;
  let actions = stmt
    .query_map(rusqlite::params![measure_id_str], |row| {
      Ok(RawAction {
        action_id:   row.get(0)?,
        measure_id:  row.get(1)?,
        description: row.get(2)?,
        status:      row.get(3)?,
        resource:    row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawAction::into_action)
    .collect::<Result<_>>()?;

  Ok(Some(Measure {
    measure_id: crate::encode::decode_uuid(&measure_id_str)?,
    intake_id: crate::encode::decode_uuid(intake_id)?,
    description,
    adopted_at: crate::encode::decode_dt(&adopted_at_str)?,
    actions,
  }))
}

// ─── CaseStore impl ──────────────────────────────────────────────────────────

impl CaseStore for SqliteStore {
  type Error = Error;

  // ── Children ──────────────────────────────────────────────────────────────

  // Not an `async fn`: the future must only borrow `self`, so the `&str`
  // is cloned before the async block.
  fn find_child_by_national_id(
    &self,
    national_id: &str,
  ) -> impl Future<Output = Result<Option<Child>>> + Send + '_ {
    let national_id = national_id.to_owned();
    async move {
      let raw: Option<RawChild> = self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                &format!(
                  "SELECT {CHILD_COLS} FROM children WHERE national_id = ?1"
                ),
                rusqlite::params![national_id],
                child_row,
              )
              .optional()?,
          )
        })
        .await?;
      raw.map(RawChild::into_child).transpose()
    }
  }

  async fn get_child(&self, id: Uuid) -> Result<Option<Child>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawChild> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CHILD_COLS} FROM children WHERE child_id = ?1"),
              rusqlite::params![id_str],
              child_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawChild::into_child).transpose()
  }

  async fn add_child(&self, input: NewChild) -> Result<Child> {
    let now = Utc::now();
    let child = Child {
      child_id:        Uuid::new_v4(),
      national_id:     input.national_id,
      given_name:      input.given_name,
      family_name:     input.family_name,
      birth_date:      input.birth_date,
      gender:          input.gender,
      address:         input.address,
      health_notes:    input.health_notes,
      school:          input.school,
      education_notes: input.education_notes,
      created_at:      now,
      updated_at:      now,
    };

    let row = child.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO children (child_id, national_id, given_name, \
           family_name, birth_date, gender, address, health_notes, school, \
           education_notes, created_at, updated_at) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            encode_uuid(row.child_id),
            row.national_id,
            row.given_name,
            row.family_name,
            row.birth_date.map(encode_date),
            encode_gender(row.gender),
            row.address,
            row.health_notes,
            row.school,
            row.education_notes,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(child)
  }

  async fn update_child(&self, child: Child) -> Result<Child> {
    let mut child = child;
    child.updated_at = Utc::now();

    let row = child.clone();
    let updated: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE children SET given_name = ?1, family_name = ?2, \
           birth_date = ?3, gender = ?4, address = ?5, health_notes = ?6, \
           school = ?7, education_notes = ?8, updated_at = ?9 \
           WHERE child_id = ?10",
          rusqlite::params![
            row.given_name,
            row.family_name,
            row.birth_date.map(encode_date),
            encode_gender(row.gender),
            row.address,
            row.health_notes,
            row.school,
            row.education_notes,
            encode_dt(row.updated_at),
            encode_uuid(row.child_id),
          ],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(amparo_core::Error::ChildNotFound(child.child_id).into());
    }
    Ok(child)
  }

  // ── Cases ─────────────────────────────────────────────────────────────────

  async fn add_case(&self, input: NewCase) -> Result<Case> {
    self
      .conn
      .call(move |conn| Ok(tx_add_case(conn, input)))
      .await?
  }

  async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| Ok(query_case(conn, &id_str)))
      .await?
  }

  async fn find_active_case(&self, child_id: Uuid) -> Result<Option<Case>> {
    let child_id_str = encode_uuid(child_id);
    let raw: Option<RawCase> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CASE_COLS} FROM cases \
                 WHERE child_id = ?1 AND active = 1"
              ),
              rusqlite::params![child_id_str],
              case_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawCase::into_case).transpose()
  }

  async fn set_case_active(&self, case_id: Uuid, active: bool) -> Result<()> {
    let case_id_str = encode_uuid(case_id);
    let updated: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE cases SET active = ?1 WHERE case_id = ?2",
          rusqlite::params![active, case_id_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(amparo_core::Error::CaseNotFound(case_id).into());
    }
    Ok(())
  }

  // ── Intakes ───────────────────────────────────────────────────────────────

  async fn open_intake(&self, input: NewIntake) -> Result<Intake> {
    self
      .conn
      .call(move |conn| Ok(tx_open_intake(conn, input)))
      .await?
  }

  async fn get_intake(&self, id: Uuid) -> Result<Option<Intake>> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| Ok(query_intake(conn, &id_str)))
      .await?
  }

  async fn list_intakes(&self, case_id: Uuid) -> Result<Vec<Intake>> {
    let case_id_str = encode_uuid(case_id);
    let raws: Vec<RawIntake> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INTAKE_COLS} FROM intakes \
           WHERE case_id = ?1 ORDER BY seq_no"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![case_id_str], intake_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawIntake::into_intake).collect()
  }

  async fn apply_intake_transition(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    change: IntakeTransition,
    actor_id: Uuid,
  ) -> Result<Intake> {
    self
      .conn
      .call(move |conn| {
        Ok(tx_apply_transition(
          conn,
          intake_id,
          expected_version,
          change,
          actor_id,
        ))
      })
      .await?
  }

  // ── Collection sub-records ────────────────────────────────────────────────

  async fn replace_collections(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    bundle: CollectionBundle,
    actor_id: Uuid,
  ) -> Result<Intake> {
    self
      .conn
      .call(move |conn| {
        Ok(tx_replace_collections(
          conn,
          intake_id,
          expected_version,
          bundle,
          actor_id,
        ))
      })
      .await?
  }

  async fn get_collections(&self, intake_id: Uuid) -> Result<IntakeCollections> {
    let intake_id_str = encode_uuid(intake_id);
    self
      .conn
      .call(move |conn| Ok(query_collections(conn, &intake_id_str)))
      .await?
  }

  async fn list_household_members(
    &self,
    intake_id: Uuid,
  ) -> Result<Vec<HouseholdMember>> {
    let intake_id_str = encode_uuid(intake_id);
    let raws: Vec<RawMember> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MEMBER_COLS} FROM household_members WHERE intake_id = ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![intake_id_str], member_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawMember::into_member).collect()
  }

  // ── Interventions ─────────────────────────────────────────────────────────

  async fn add_intervention(
    &self,
    input: NewIntervention,
  ) -> Result<InterventionRecord> {
    self
      .conn
      .call(move |conn| Ok(tx_add_intervention(conn, input)))
      .await?
  }

  async fn list_interventions(
    &self,
    intake_id: Uuid,
  ) -> Result<Vec<InterventionRecord>> {
    let intake_id_str = encode_uuid(intake_id);
    self
      .conn
      .call(move |conn| Ok(query_interventions(conn, &intake_id_str)))
      .await?
  }

  // ── Measure plan ──────────────────────────────────────────────────────────

  async fn save_measure_plan(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    plan: NewMeasurePlan,
    actor_id: Uuid,
  ) -> Result<Measure> {
    self
      .conn
      .call(move |conn| {
        Ok(tx_save_measure_plan(
          conn,
          intake_id,
          expected_version,
          plan,
          actor_id,
        ))
      })
      .await?
  }

  async fn get_measure_plan(&self, intake_id: Uuid) -> Result<Option<Measure>> {
    let intake_id_str = encode_uuid(intake_id);
    self
      .conn
      .call(move |conn| Ok(query_measure_plan(conn, &intake_id_str)))
      .await?
  }

  // ── Transfers ─────────────────────────────────────────────────────────────

  async fn transfer_case(&self, input: NewTransfer) -> Result<TransferRecord> {
    self
      .conn
      .call(move |conn| Ok(tx_transfer_case(conn, input)))
      .await?
  }

  async fn list_transfers(&self, case_id: Uuid) -> Result<Vec<TransferRecord>> {
    let case_id_str = encode_uuid(case_id);
    let raws: Vec<RawTransfer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT transfer_id, case_id, from_unit, to_unit, reason, \
           transferred_at, initiated_by FROM transfers \
           WHERE case_id = ?1 ORDER BY transferred_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![case_id_str], |row| {
            Ok(RawTransfer {
              transfer_id:    row.get(0)?,
              case_id:        row.get(1)?,
              from_unit:      row.get(2)?,
              to_unit:        row.get(3)?,
              reason:         row.get(4)?,
              transferred_at: row.get(5)?,
              initiated_by:   row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawTransfer::into_transfer).collect()
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn add_user(&self, user: UserRef) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO users (user_id, display_name, unit_id, \
           role) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![
            encode_uuid(user.user_id),
            user.display_name,
            encode_uuid(user.unit_id),
            encode_role(user.role),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_users_in_unit(&self, unit_id: Uuid) -> Result<Vec<UserRef>> {
    let unit_id_str = encode_uuid(unit_id);
    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, display_name, unit_id, role FROM users \
           WHERE unit_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![unit_id_str], |row| {
            Ok(RawUser {
              user_id:      row.get(0)?,
              display_name: row.get(1)?,
              unit_id:      row.get(2)?,
              role:         row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawUser::into_user).collect()
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
    let full = AuditEntry {
      audit_id:    Uuid::new_v4(),
      table_name:  entry.table_name,
      record_id:   entry.record_id,
      action:      entry.action,
      actor_id:    entry.actor_id,
      recorded_at: Utc::now(),
      payload:     entry.payload,
    };

    let payload_json = full
      .payload
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;
    let row = full.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_entries (audit_id, table_name, record_id, \
           action, actor_id, recorded_at, payload_json) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            encode_uuid(row.audit_id),
            row.table_name,
            encode_uuid(row.record_id),
            encode_audit_action(row.action),
            encode_uuid(row.actor_id),
            encode_dt(row.recorded_at),
            payload_json,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(full)
  }

  async fn list_audit_for(&self, record_id: Uuid) -> Result<Vec<AuditEntry>> {
    let record_id_str = encode_uuid(record_id);
    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, table_name, record_id, action, actor_id, \
           recorded_at, payload_json FROM audit_entries \
           WHERE record_id = ?1 ORDER BY recorded_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![record_id_str], |row| {
            Ok(RawAudit {
              audit_id:     row.get(0)?,
              table_name:   row.get(1)?,
              record_id:    row.get(2)?,
              action:       row.get(3)?,
              actor_id:     row.get(4)?,
              recorded_at:  row.get(5)?,
              payload_json: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawAudit::into_entry).collect()
  }
}
