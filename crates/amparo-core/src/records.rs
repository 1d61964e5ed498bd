//! Collection-valued sub-records of an intake.
//!
//! These four collections are replaced wholesale on every save of their
//! owning form (delete-all-then-reinsert), never diffed. Ids are assigned by
//! the store on each save, so callers must treat them as ephemeral.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Right violations ────────────────────────────────────────────────────────

/// Broad category of an identified rights violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
  Identity,
  FamilyLife,
  Health,
  Education,
  Protection,
  Housing,
  Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RightViolation {
  pub violation_id: Uuid,
  pub intake_id:    Uuid,
  pub category:     ViolationCategory,
  pub description:  String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRightViolation {
  pub category:    ViolationCategory,
  pub description: String,
}

// ─── Household members ───────────────────────────────────────────────────────

/// A member of the child's household or family group.
///
/// When the member is simultaneously a subject of protection in their own
/// right, `linked_case_id`/`linked_intake_id` point at their own case and
/// open intake; group interventions replicate into those intakes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdMember {
  pub member_id:        Uuid,
  pub intake_id:        Uuid,
  pub full_name:        String,
  pub national_id:      Option<String>,
  /// Relation to the child, e.g. "mother", "sibling".
  pub relationship:     String,
  pub birth_date:       Option<NaiveDate>,
  pub cohabits:         bool,
  pub linked_case_id:   Option<Uuid>,
  pub linked_intake_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHouseholdMember {
  pub full_name:        String,
  pub national_id:      Option<String>,
  pub relationship:     String,
  pub birth_date:       Option<NaiveDate>,
  pub cohabits:         bool,
  pub linked_case_id:   Option<Uuid>,
  pub linked_intake_id: Option<Uuid>,
}

// ─── Community contacts ──────────────────────────────────────────────────────

/// An institution or community referent relevant to the intake (school,
/// health centre, neighbourhood organisation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityContact {
  pub contact_id:   Uuid,
  pub intake_id:    Uuid,
  pub institution:  String,
  pub contact_name: Option<String>,
  pub phone:        Option<String>,
  pub notes:        Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommunityContact {
  pub institution:  String,
  pub contact_name: Option<String>,
  pub phone:        Option<String>,
  pub notes:        Option<String>,
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// A document attached to an intake. The payload lives in blob storage; only
/// the stable reference is kept here.
///
/// Rows with a non-null `intervention_id` belong to an intervention record
/// and are outside the replace-on-save set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id:     Uuid,
  pub intake_id:       Uuid,
  pub intervention_id: Option<Uuid>,
  pub title:           String,
  /// Stable reference returned by the blob store.
  pub blob_ref:        String,
  pub media_type:      String,
  pub uploaded_by:     Uuid,
  pub recorded_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
  pub title:      String,
  pub blob_ref:   String,
  pub media_type: String,
}

// ─── Replace-on-save bundle ──────────────────────────────────────────────────

/// The full new set of sub-records supplied by one form save.
///
/// Saving a bundle deletes every existing row of all four collections for
/// the owning intake and inserts these, as one transaction. The operation is
/// idempotent and order-independent but not incremental.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionBundle {
  #[serde(default)]
  pub right_violations:   Vec<NewRightViolation>,
  #[serde(default)]
  pub household_members:  Vec<NewHouseholdMember>,
  #[serde(default)]
  pub community_contacts: Vec<NewCommunityContact>,
  #[serde(default)]
  pub documents:          Vec<NewDocument>,
}

/// The persisted collections of an intake, as read back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeCollections {
  pub right_violations:   Vec<RightViolation>,
  pub household_members:  Vec<HouseholdMember>,
  pub community_contacts: Vec<CommunityContact>,
  pub documents:          Vec<Document>,
}
