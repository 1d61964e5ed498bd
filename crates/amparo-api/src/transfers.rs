//! Handlers for the two-phase inter-unit transfer.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/transfers/preview` | Validates and issues a single-use ticket |
//! | `POST` | `/transfers/commit` | Redeems the ticket within its TTL |

use axum::{Json, extract::State};
use amparo_core::{
  actor::ActorContext, audit::Audited, blob::BlobStore, notify::Notifier,
  store::CaseStore,
};
use amparo_engine::{TransferOutcome, TransferPreview};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PreviewBody {
  pub case_id:        Uuid,
  pub to_unit:        Uuid,
  pub reason:         String,
  /// Effective transfer date; defaults to the commit time.
  #[serde(default)]
  pub transferred_at: Option<DateTime<Utc>>,
  pub actor:          ActorContext,
}

/// `POST /transfers/preview`
pub async fn preview<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Json(body): Json<PreviewBody>,
) -> Result<Json<TransferPreview>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let preview = state
    .transfers
    .preview(
      body.case_id,
      body.to_unit,
      body.reason,
      body.transferred_at,
      body.actor,
    )
    .await?;
  Ok(Json(preview))
}

#[derive(Debug, Deserialize)]
pub struct CommitBody {
  pub ticket_id: Uuid,
  pub actor:     ActorContext,
}

/// `POST /transfers/commit`
pub async fn commit<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Json(body): Json<CommitBody>,
) -> Result<Json<Audited<TransferOutcome>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let outcome = state.transfers.commit(body.ticket_id, body.actor).await?;
  Ok(Json(outcome))
}
