//! Measure and action plan — the protective measure adopted for an intake
//! that reaches the measure-definition stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
  Pending,
  InProgress,
  Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureAction {
  pub action_id:   Uuid,
  pub measure_id:  Uuid,
  pub description: String,
  pub status:      ActionStatus,
  /// Resource required to carry the action out, if any.
  pub resource:    Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
  pub measure_id:  Uuid,
  pub intake_id:   Uuid,
  pub description: String,
  pub adopted_at:  DateTime<Utc>,
  pub actions:     Vec<MeasureAction>,
}

impl Measure {
  /// Fraction of actions marked done, in `0.0..=1.0`.
  ///
  /// Informational only: closing an intake as fulfilled is an operator
  /// judgment, never automatic.
  pub fn completion(&self) -> f64 {
    if self.actions.is_empty() {
      return 0.0;
    }
    let done = self
      .actions
      .iter()
      .filter(|a| a.status == ActionStatus::Done)
      .count();
    done as f64 / self.actions.len() as f64
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeasureAction {
  pub description: String,
  pub status:      ActionStatus,
  pub resource:    Option<String>,
}

/// Input to [`crate::store::CaseStore::save_measure_plan`]. Saving replaces
/// the intake's measure and its actions wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeasurePlan {
  pub description: String,
  pub adopted_at:  DateTime<Utc>,
  pub actions:     Vec<NewMeasureAction>,
}
