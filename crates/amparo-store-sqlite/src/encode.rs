//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, calendar dates as ISO 8601
//! dates, enums as their lowercase/snake_case discriminants, UUIDs as
//! hyphenated lowercase strings, booleans as integers.

use amparo_core::{
  actor::{Role, UserRef},
  audit::{AuditAction, AuditEntry},
  case::Case,
  child::{Child, Gender},
  intake::{
    ClosureReason, Intake, IntakeStage, IntakeStatus, ReceptionDecision,
  },
  intervention::{InterventionKind, InterventionRecord},
  measure::{ActionStatus, MeasureAction},
  records::{CommunityContact, Document, HouseholdMember, RightViolation},
  transfer::TransferRecord,
};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_uuid_opt(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enum codecs ─────────────────────────────────────────────────────────────

pub fn encode_gender(g: Gender) -> &'static str {
  match g {
    Gender::Female => "female",
    Gender::Male => "male",
    Gender::Other => "other",
    Gender::Unknown => "unknown",
  }
}

pub fn decode_gender(s: &str) -> Result<Gender> {
  match s {
    "female" => Ok(Gender::Female),
    "male" => Ok(Gender::Male),
    "other" => Ok(Gender::Other),
    "unknown" => Ok(Gender::Unknown),
    other => Err(Error::UnknownDiscriminant {
      column: "gender",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_stage(s: IntakeStage) -> &'static str {
  match s {
    IntakeStage::Reception => "reception",
    IntakeStage::Expansion => "expansion",
    IntakeStage::Synthesis => "synthesis",
    IntakeStage::MeasureDefinition => "measure_definition",
    IntakeStage::Agreement => "agreement",
    IntakeStage::FollowUp => "follow_up",
    IntakeStage::Closed => "closed",
  }
}

pub fn decode_stage(s: &str) -> Result<IntakeStage> {
  match s {
    "reception" => Ok(IntakeStage::Reception),
    "expansion" => Ok(IntakeStage::Expansion),
    "synthesis" => Ok(IntakeStage::Synthesis),
    "measure_definition" => Ok(IntakeStage::MeasureDefinition),
    "agreement" => Ok(IntakeStage::Agreement),
    "follow_up" => Ok(IntakeStage::FollowUp),
    "closed" => Ok(IntakeStage::Closed),
    other => Err(Error::UnknownDiscriminant {
      column: "stage",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_status(s: IntakeStatus) -> &'static str {
  match s {
    IntakeStatus::Open => "open",
    IntakeStatus::Closed => "closed",
  }
}

pub fn decode_status(s: &str) -> Result<IntakeStatus> {
  match s {
    "open" => Ok(IntakeStatus::Open),
    "closed" => Ok(IntakeStatus::Closed),
    other => Err(Error::UnknownDiscriminant {
      column: "status",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_decision(d: ReceptionDecision) -> &'static str {
  match d {
    ReceptionDecision::AdviceOnly => "advice_only",
    ReceptionDecision::FullIntervention => "full_intervention",
    ReceptionDecision::EscalateToAuthority => "escalate_to_authority",
  }
}

pub fn decode_decision(s: &str) -> Result<ReceptionDecision> {
  match s {
    "advice_only" => Ok(ReceptionDecision::AdviceOnly),
    "full_intervention" => Ok(ReceptionDecision::FullIntervention),
    "escalate_to_authority" => Ok(ReceptionDecision::EscalateToAuthority),
    other => Err(Error::UnknownDiscriminant {
      column: "decision",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_closure_reason(r: ClosureReason) -> &'static str {
  match r {
    ClosureReason::RestitutionAchieved => "restitution_achieved",
    ClosureReason::RepeatedNonCompliance => "repeated_non_compliance",
    ClosureReason::Death => "death",
    ClosureReason::Relocation => "relocation",
    ClosureReason::Other => "other",
    ClosureReason::EscalateToAuthority => "escalate_to_authority",
    ClosureReason::AdviceConcluded => "advice_concluded",
    ClosureReason::AuthorityResolution => "authority_resolution",
  }
}

pub fn decode_closure_reason(s: &str) -> Result<ClosureReason> {
  match s {
    "restitution_achieved" => Ok(ClosureReason::RestitutionAchieved),
    "repeated_non_compliance" => Ok(ClosureReason::RepeatedNonCompliance),
    "death" => Ok(ClosureReason::Death),
    "relocation" => Ok(ClosureReason::Relocation),
    "other" => Ok(ClosureReason::Other),
    "escalate_to_authority" => Ok(ClosureReason::EscalateToAuthority),
    "advice_concluded" => Ok(ClosureReason::AdviceConcluded),
    "authority_resolution" => Ok(ClosureReason::AuthorityResolution),
    other => Err(Error::UnknownDiscriminant {
      column: "closing_reason",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_violation_category(c: amparo_core::records::ViolationCategory)
-> &'static str {
  use amparo_core::records::ViolationCategory as V;
  match c {
    V::Identity => "identity",
    V::FamilyLife => "family_life",
    V::Health => "health",
    V::Education => "education",
    V::Protection => "protection",
    V::Housing => "housing",
    V::Other => "other",
  }
}

pub fn decode_violation_category(s: &str)
-> Result<amparo_core::records::ViolationCategory> {
  use amparo_core::records::ViolationCategory as V;
  match s {
    "identity" => Ok(V::Identity),
    "family_life" => Ok(V::FamilyLife),
    "health" => Ok(V::Health),
    "education" => Ok(V::Education),
    "protection" => Ok(V::Protection),
    "housing" => Ok(V::Housing),
    "other" => Ok(V::Other),
    other => Err(Error::UnknownDiscriminant {
      column: "category",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_intervention_kind(k: InterventionKind) -> &'static str {
  match k {
    InterventionKind::Interview => "interview",
    InterventionKind::HomeVisit => "home_visit",
    InterventionKind::PhoneCall => "phone_call",
    InterventionKind::Meeting => "meeting",
    InterventionKind::Report => "report",
    InterventionKind::Other => "other",
  }
}

pub fn decode_intervention_kind(s: &str) -> Result<InterventionKind> {
  match s {
    "interview" => Ok(InterventionKind::Interview),
    "home_visit" => Ok(InterventionKind::HomeVisit),
    "phone_call" => Ok(InterventionKind::PhoneCall),
    "meeting" => Ok(InterventionKind::Meeting),
    "report" => Ok(InterventionKind::Report),
    "other" => Ok(InterventionKind::Other),
    other => Err(Error::UnknownDiscriminant {
      column: "kind",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_action_status(s: ActionStatus) -> &'static str {
  match s {
    ActionStatus::Pending => "pending",
    ActionStatus::InProgress => "in_progress",
    ActionStatus::Done => "done",
  }
}

pub fn decode_action_status(s: &str) -> Result<ActionStatus> {
  match s {
    "pending" => Ok(ActionStatus::Pending),
    "in_progress" => Ok(ActionStatus::InProgress),
    "done" => Ok(ActionStatus::Done),
    other => Err(Error::UnknownDiscriminant {
      column: "status",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_audit_action(a: AuditAction) -> &'static str {
  match a {
    AuditAction::Insert => "insert",
    AuditAction::Update => "update",
    AuditAction::Delete => "delete",
    AuditAction::Transition => "transition",
    AuditAction::Transfer => "transfer",
    AuditAction::Reconciliation => "reconciliation",
  }
}

pub fn decode_audit_action(s: &str) -> Result<AuditAction> {
  match s {
    "insert" => Ok(AuditAction::Insert),
    "update" => Ok(AuditAction::Update),
    "delete" => Ok(AuditAction::Delete),
    "transition" => Ok(AuditAction::Transition),
    "transfer" => Ok(AuditAction::Transfer),
    "reconciliation" => Ok(AuditAction::Reconciliation),
    other => Err(Error::UnknownDiscriminant {
      column: "action",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_role(r: Role) -> &'static str {
  match r {
    Role::Professional => "professional",
    Role::UnitLead => "unit_lead",
    Role::Admin => "admin",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "professional" => Ok(Role::Professional),
    "unit_lead" => Ok(Role::UnitLead),
    "admin" => Ok(Role::Admin),
    other => Err(Error::UnknownDiscriminant {
      column: "role",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `children` row.
pub struct RawChild {
  pub child_id:        String,
  pub national_id:     String,
  pub given_name:      String,
  pub family_name:     String,
  pub birth_date:      Option<String>,
  pub gender:          String,
  pub address:         Option<String>,
  pub health_notes:    Option<String>,
  pub school:          Option<String>,
  pub education_notes: Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawChild {
  pub fn into_child(self) -> Result<Child> {
    Ok(Child {
      child_id:        decode_uuid(&self.child_id)?,
      national_id:     self.national_id,
      given_name:      self.given_name,
      family_name:     self.family_name,
      birth_date:      self.birth_date.as_deref().map(decode_date).transpose()?,
      gender:          decode_gender(&self.gender)?,
      address:         self.address,
      health_notes:    self.health_notes,
      school:          self.school,
      education_notes: self.education_notes,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `cases` row.
pub struct RawCase {
  pub case_id:     String,
  pub case_number: String,
  pub child_id:    String,
  pub active:      bool,
  pub unit_id:     String,
  pub zone_id:     String,
  pub opened_at:   String,
}

impl RawCase {
  pub fn into_case(self) -> Result<Case> {
    Ok(Case {
      case_id:     decode_uuid(&self.case_id)?,
      case_number: self.case_number,
      child_id:    decode_uuid(&self.child_id)?,
      active:      self.active,
      unit_id:     decode_uuid(&self.unit_id)?,
      zone_id:     decode_uuid(&self.zone_id)?,
      opened_at:   decode_dt(&self.opened_at)?,
    })
  }
}

/// Raw strings read directly from an `intakes` row.
pub struct RawIntake {
  pub intake_id:             String,
  pub case_id:               String,
  pub seq_no:                i64,
  pub stage:                 String,
  pub status:                String,
  pub opened_at:             String,
  pub closed_at:             Option<String>,
  pub closing_reason:        Option<String>,
  pub assigned_professional: String,
  pub last_modified_by:      String,
  pub emergency:             bool,
  pub decision:              Option<String>,
  pub decision_narrative:    Option<String>,
  pub escalation_pending:    bool,
  pub version:               i64,
}

impl RawIntake {
  pub fn into_intake(self) -> Result<Intake> {
    Ok(Intake {
      intake_id:             decode_uuid(&self.intake_id)?,
      case_id:               decode_uuid(&self.case_id)?,
      seq_no:                self.seq_no,
      stage:                 decode_stage(&self.stage)?,
      status:                decode_status(&self.status)?,
      opened_at:             decode_dt(&self.opened_at)?,
      closed_at:             self.closed_at.as_deref().map(decode_dt).transpose()?,
      closing_reason:        self
        .closing_reason
        .as_deref()
        .map(decode_closure_reason)
        .transpose()?,
      assigned_professional: decode_uuid(&self.assigned_professional)?,
      last_modified_by:      decode_uuid(&self.last_modified_by)?,
      emergency:             self.emergency,
      decision:              self
        .decision
        .as_deref()
        .map(decode_decision)
        .transpose()?,
      decision_narrative:    self.decision_narrative,
      escalation_pending:    self.escalation_pending,
      version:               self.version,
    })
  }
}

/// Raw strings read directly from a `right_violations` row.
pub struct RawViolation {
  pub violation_id: String,
  pub intake_id:    String,
  pub category:     String,
  pub description:  String,
}

impl RawViolation {
  pub fn into_violation(self) -> Result<RightViolation> {
    Ok(RightViolation {
      violation_id: decode_uuid(&self.violation_id)?,
      intake_id:    decode_uuid(&self.intake_id)?,
      category:     decode_violation_category(&self.category)?,
      description:  self.description,
    })
  }
}

/// Raw strings read directly from a `household_members` row.
pub struct RawMember {
  pub member_id:        String,
  pub intake_id:        String,
  pub full_name:        String,
  pub national_id:      Option<String>,
  pub relationship:     String,
  pub birth_date:       Option<String>,
  pub cohabits:         bool,
  pub linked_case_id:   Option<String>,
  pub linked_intake_id: Option<String>,
}

impl RawMember {
  pub fn into_member(self) -> Result<HouseholdMember> {
    Ok(HouseholdMember {
      member_id:        decode_uuid(&self.member_id)?,
      intake_id:        decode_uuid(&self.intake_id)?,
      full_name:        self.full_name,
      national_id:      self.national_id,
      relationship:     self.relationship,
      birth_date:       self.birth_date.as_deref().map(decode_date).transpose()?,
      cohabits:         self.cohabits,
      linked_case_id:   decode_uuid_opt(self.linked_case_id.as_deref())?,
      linked_intake_id: decode_uuid_opt(self.linked_intake_id.as_deref())?,
    })
  }
}

/// Raw strings read directly from a `community_contacts` row.
pub struct RawContact {
  pub contact_id:   String,
  pub intake_id:    String,
  pub institution:  String,
  pub contact_name: Option<String>,
  pub phone:        Option<String>,
  pub notes:        Option<String>,
}

impl RawContact {
  pub fn into_contact(self) -> Result<CommunityContact> {
    Ok(CommunityContact {
      contact_id:   decode_uuid(&self.contact_id)?,
      intake_id:    decode_uuid(&self.intake_id)?,
      institution:  self.institution,
      contact_name: self.contact_name,
      phone:        self.phone,
      notes:        self.notes,
    })
  }
}

/// Raw strings read directly from a `documents` row.
pub struct RawDocument {
  pub document_id:     String,
  pub intake_id:       String,
  pub intervention_id: Option<String>,
  pub title:           String,
  pub blob_ref:        String,
  pub media_type:      String,
  pub uploaded_by:     String,
  pub recorded_at:     String,
}

impl RawDocument {
  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id:     decode_uuid(&self.document_id)?,
      intake_id:       decode_uuid(&self.intake_id)?,
      intervention_id: decode_uuid_opt(self.intervention_id.as_deref())?,
      title:           self.title,
      blob_ref:        self.blob_ref,
      media_type:      self.media_type,
      uploaded_by:     decode_uuid(&self.uploaded_by)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from an `interventions` row. Professional
/// associations are read separately and passed into the converter.
pub struct RawIntervention {
  pub intervention_id: String,
  pub intake_id:       String,
  pub kind:            String,
  pub narrative:       String,
  pub occurred_at:     String,
  pub recorded_at:     String,
  pub recorded_by:     String,
  pub is_group:        bool,
  pub replicated_from: Option<String>,
}

impl RawIntervention {
  pub fn into_record(
    self,
    professionals: Vec<String>,
  ) -> Result<InterventionRecord> {
    Ok(InterventionRecord {
      intervention_id: decode_uuid(&self.intervention_id)?,
      intake_id:       decode_uuid(&self.intake_id)?,
      kind:            decode_intervention_kind(&self.kind)?,
      narrative:       self.narrative,
      occurred_at:     decode_dt(&self.occurred_at)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
      recorded_by:     decode_uuid(&self.recorded_by)?,
      group:           self.is_group,
      replicated_from: decode_uuid_opt(self.replicated_from.as_deref())?,
      professionals:   professionals
        .iter()
        .map(|s| decode_uuid(s))
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw strings read directly from a `measure_actions` row.
pub struct RawAction {
  pub action_id:   String,
  pub measure_id:  String,
  pub description: String,
  pub status:      String,
  pub resource:    Option<String>,
}

impl RawAction {
  pub fn into_action(self) -> Result<MeasureAction> {
    Ok(MeasureAction {
      action_id:   decode_uuid(&self.action_id)?,
      measure_id:  decode_uuid(&self.measure_id)?,
      description: self.description,
      status:      decode_action_status(&self.status)?,
      resource:    self.resource,
    })
  }
}

/// Raw strings read directly from a `transfers` row.
pub struct RawTransfer {
  pub transfer_id:    String,
  pub case_id:        String,
  pub from_unit:      String,
  pub to_unit:        String,
  pub reason:         String,
  pub transferred_at: String,
  pub initiated_by:   String,
}

impl RawTransfer {
  pub fn into_transfer(self) -> Result<TransferRecord> {
    Ok(TransferRecord {
      transfer_id:    decode_uuid(&self.transfer_id)?,
      case_id:        decode_uuid(&self.case_id)?,
      from_unit:      decode_uuid(&self.from_unit)?,
      to_unit:        decode_uuid(&self.to_unit)?,
      reason:         self.reason,
      transferred_at: decode_dt(&self.transferred_at)?,
      initiated_by:   decode_uuid(&self.initiated_by)?,
    })
  }
}

/// Raw strings read directly from an `audit_entries` row.
pub struct RawAudit {
  pub audit_id:     String,
  pub table_name:   String,
  pub record_id:    String,
  pub action:       String,
  pub actor_id:     String,
  pub recorded_at:  String,
  pub payload_json: Option<String>,
}

impl RawAudit {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      audit_id:    decode_uuid(&self.audit_id)?,
      table_name:  self.table_name,
      record_id:   decode_uuid(&self.record_id)?,
      action:      decode_audit_action(&self.action)?,
      actor_id:    decode_uuid(&self.actor_id)?,
      recorded_at: decode_dt(&self.recorded_at)?,
      payload:     self
        .payload_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
    })
  }
}

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:      String,
  pub display_name: String,
  pub unit_id:      String,
  pub role:         String,
}

impl RawUser {
  pub fn into_user(self) -> Result<UserRef> {
    Ok(UserRef {
      user_id:      decode_uuid(&self.user_id)?,
      display_name: self.display_name,
      unit_id:      decode_uuid(&self.unit_id)?,
      role:         decode_role(&self.role)?,
    })
  }
}
