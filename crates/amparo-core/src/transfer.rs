//! Transfer records — the immutable log of a case's moves between units.
//!
//! Created only by the transfer coordinator; never mutated or deleted. After
//! a transfer commits, the source unit loses visibility of the case
//! entirely, which is why the coordinator demands a two-phase confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
  pub transfer_id:    Uuid,
  pub case_id:        Uuid,
  pub from_unit:      Uuid,
  pub to_unit:        Uuid,
  pub reason:         String,
  pub transferred_at: DateTime<Utc>,
  pub initiated_by:   Uuid,
}

/// Input to [`crate::store::CaseStore::transfer_case`]. The source unit is
/// read inside the same transaction that swaps ownership.
#[derive(Debug, Clone)]
pub struct NewTransfer {
  pub case_id:        Uuid,
  pub to_unit:        Uuid,
  pub reason:         String,
  pub transferred_at: DateTime<Utc>,
  pub initiated_by:   Uuid,
}
