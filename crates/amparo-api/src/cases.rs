//! Handlers for reception, case reads and the audit trail.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/receptions` | Body: [`RegisterBody`]; returns 201 |
//! | `GET`  | `/cases/:id` | 404 if not found |
//! | `GET`  | `/cases/:id/intakes` | All episodes, oldest first |
//! | `GET`  | `/cases/:id/transfers` | The immutable transfer log |
//! | `GET`  | `/audit/:record_id` | Trail entries for any record |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use amparo_core::{
  actor::ActorContext,
  audit::AuditEntry,
  blob::BlobStore,
  case::Case,
  intake::Intake,
  notify::Notifier,
  store::CaseStore,
  transfer::TransferRecord,
};
use amparo_engine::lifecycle::ReceptionIntake;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Reception ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  #[serde(flatten)]
  pub reception: ReceptionIntake,
  pub actor:     ActorContext,
}

/// `POST /receptions` — returns 201 + the child, case and opened intake.
pub async fn register<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let outcome = state
    .lifecycle
    .register_reception(body.reception, body.actor)
    .await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}

// ─── Case reads ──────────────────────────────────────────────────────────────

/// `GET /cases/:id`
pub async fn get_one<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Case>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let case = state
    .store
    .get_case(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?
    .ok_or_else(|| ApiError::NotFound(format!("case {id} not found")))?;
  Ok(Json(case))
}

/// `GET /cases/:id/intakes`
pub async fn list_intakes<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Intake>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let intakes = state
    .store
    .list_intakes(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?;
  Ok(Json(intakes))
}

/// `GET /cases/:id/transfers`
pub async fn list_transfers<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransferRecord>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let transfers = state
    .store
    .list_transfers(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?;
  Ok(Json(transfers))
}

// ─── Audit trail ─────────────────────────────────────────────────────────────

/// `GET /audit/:record_id`
pub async fn audit_trail<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(record_id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let entries = state
    .store
    .list_audit_for(record_id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?;
  Ok(Json(entries))
}
