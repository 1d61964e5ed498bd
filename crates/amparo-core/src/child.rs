//! Child — the person under protection.
//!
//! Children are looked up by national id on reception so that repeated
//! receptions of the same person never create duplicate rows. A child is
//! mutated by subsequent reception edits and never deleted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
  Female,
  Male,
  Other,
  Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Child {
  pub child_id:        Uuid,
  /// National identity number; unique across all children.
  pub national_id:     String,
  pub given_name:      String,
  pub family_name:     String,
  pub birth_date:      Option<NaiveDate>,
  pub gender:          Gender,
  pub address:         Option<String>,
  /// Free-text health observations gathered at reception.
  pub health_notes:    Option<String>,
  pub school:          Option<String>,
  pub education_notes: Option<String>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// Input to [`crate::store::CaseStore::add_child`]. Timestamps and the id
/// are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChild {
  pub national_id:     String,
  pub given_name:      String,
  pub family_name:     String,
  pub birth_date:      Option<NaiveDate>,
  pub gender:          Gender,
  pub address:         Option<String>,
  pub health_notes:    Option<String>,
  pub school:          Option<String>,
  pub education_notes: Option<String>,
}
