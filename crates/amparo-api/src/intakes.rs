//! Handlers for the intake lifecycle.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/cases/:id/intakes` | Open a subsequent episode |
//! | `GET`  | `/intakes/:id` | 404 if not found |
//! | `POST` | `/intakes/:id/decision` | The three-way reception decision |
//! | `POST` | `/intakes/:id/advance` | One step along the linear path |
//! | `POST` | `/intakes/:id/close` | Closure with a reason |
//! | `POST` | `/intakes/:id/escalation` | Apply the authority's resolution |
//! | `GET`/`PUT` | `/intakes/:id/collections` | Replace-on-save form payload |
//! | `GET`/`PUT` | `/intakes/:id/measure` | The measure and action plan |
//!
//! Every mutating body carries `expected_version`; a stale version yields
//! `409 Conflict` with nothing written.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use amparo_core::{
  actor::ActorContext,
  audit::Audited,
  blob::BlobStore,
  intake::{ClosureReason, EscalationOutcome, Intake},
  measure::{Measure, NewMeasurePlan},
  notify::Notifier,
  records::{CollectionBundle, IntakeCollections},
  store::CaseStore,
};
use amparo_engine::lifecycle::DecisionSubmission;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Open ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenBody {
  pub assigned_professional: Uuid,
  #[serde(default)]
  pub emergency:             bool,
  pub actor:                 ActorContext,
}

/// `POST /cases/:id/intakes` — returns 201 + the opened intake.
pub async fn open<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(case_id): Path<Uuid>,
  Json(body): Json<OpenBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let intake = state
    .lifecycle
    .open_intake(case_id, body.assigned_professional, body.emergency, body.actor)
    .await?;
  Ok((StatusCode::CREATED, Json(intake)))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /intakes/:id`
pub async fn get_one<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Intake>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let intake = state
    .store
    .get_intake(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?
    .ok_or_else(|| ApiError::NotFound(format!("intake {id} not found")))?;
  Ok(Json(intake))
}

/// `GET /intakes/:id/collections`
pub async fn get_collections<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<IntakeCollections>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let collections = state
    .store
    .get_collections(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?;
  Ok(Json(collections))
}

/// `GET /intakes/:id/measure` — 404 until a plan has been saved.
pub async fn get_measure<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Measure>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let measure = state
    .store
    .get_measure_plan(id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("intake {id} has no measure plan"))
    })?;
  Ok(Json(measure))
}

// ─── Decision branch ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
  #[serde(flatten)]
  pub submission:       DecisionSubmission,
  pub expected_version: i64,
  pub actor:            ActorContext,
}

/// `POST /intakes/:id/decision`
pub async fn decide<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DecisionBody>,
) -> Result<Json<Audited<Intake>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let updated = state
    .lifecycle
    .submit_reception_decision(id, body.submission, body.expected_version, body.actor)
    .await?;
  Ok(Json(updated))
}

// ─── Advancement and closure ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdvanceBody {
  pub expected_version: i64,
  pub actor:            ActorContext,
}

/// `POST /intakes/:id/advance`
pub async fn advance<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<AdvanceBody>,
) -> Result<Json<Audited<Intake>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let updated = state
    .lifecycle
    .advance_stage(id, body.expected_version, body.actor)
    .await?;
  Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct CloseBody {
  pub reason:           ClosureReason,
  pub expected_version: i64,
  pub actor:            ActorContext,
}

/// `POST /intakes/:id/close`
pub async fn close<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CloseBody>,
) -> Result<Json<Audited<Intake>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let updated = state
    .lifecycle
    .close_intake(id, body.reason, body.expected_version, body.actor)
    .await?;
  Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub outcome:          EscalationOutcome,
  pub expected_version: i64,
  pub actor:            ActorContext,
}

/// `POST /intakes/:id/escalation`
pub async fn resolve<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ResolveBody>,
) -> Result<Json<Audited<Intake>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let updated = state
    .lifecycle
    .resolve_escalation(id, body.outcome, body.expected_version, body.actor)
    .await?;
  Ok(Json(updated))
}

// ─── Collections and measure plan ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CollectionsBody {
  #[serde(default)]
  pub collections:      CollectionBundle,
  pub expected_version: i64,
  pub actor:            ActorContext,
}

/// `PUT /intakes/:id/collections` — replaces all four collections wholesale.
pub async fn save_collections<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CollectionsBody>,
) -> Result<Json<Audited<Intake>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let updated = state
    .cascade
    .save_collections(id, body.expected_version, body.collections, body.actor)
    .await?;
  Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct MeasureBody {
  #[serde(flatten)]
  pub plan:             NewMeasurePlan,
  pub expected_version: i64,
  pub actor:            ActorContext,
}

/// `PUT /intakes/:id/measure`
pub async fn save_measure<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MeasureBody>,
) -> Result<Json<Audited<Measure>>, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let measure = state
    .lifecycle
    .save_measure_plan(id, body.plan, body.expected_version, body.actor)
    .await?;
  Ok(Json(measure))
}
