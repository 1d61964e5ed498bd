//! Handlers for `/intakes/:id/interventions`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/intakes/:id/interventions` | Oldest first, replicas included |
//! | `POST` | `/intakes/:id/interventions` | `group: true` fans out to linked intakes |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use amparo_core::{
  actor::ActorContext,
  blob::BlobStore,
  intervention::InterventionRecord,
  notify::Notifier,
  store::CaseStore,
};
use amparo_engine::InterventionDraft;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `GET /intakes/:id/interventions`
pub async fn list<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<InterventionRecord>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let records = state
    .store
    .list_interventions(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?;
  Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct RecordBody {
  #[serde(flatten)]
  pub draft: InterventionDraft,
  #[serde(default)]
  pub group: bool,
  pub actor: ActorContext,
}

/// `POST /intakes/:id/interventions` — returns 201 + the canonical record
/// and the per-target replication outcome.
pub async fn record<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RecordBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let outcome = state
    .cascade
    .record_intervention(id, body.draft, body.group, body.actor)
    .await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}
