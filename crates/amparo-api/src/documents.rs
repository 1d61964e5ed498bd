//! Handler for document payload upload.
//!
//! Payloads travel as base64 in the JSON body; the bytes go straight to the
//! blob store and only the returned reference is handed back. The client
//! then cites that reference in a collections save or an intervention's
//! attached documents.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use base64::Engine as _;
use amparo_core::{
  actor::ActorContext, blob::BlobStore, notify::Notifier, store::CaseStore,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct UploadBody {
  pub title:          String,
  pub media_type:     String,
  /// Base64-encoded payload bytes.
  pub content_base64: String,
  pub actor:          ActorContext,
}

/// `POST /intakes/:id/documents` — returns 201 + `{"blob_ref": "..."}`.
pub async fn upload<S, N, B>(
  State(state): State<AppState<S, N, B>>,
  Path(intake_id): Path<Uuid>,
  Json(body): Json<UploadBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  // The intake must exist before we accept bytes for it.
  state
    .store
    .get_intake(intake_id)
    .await
    .map_err(Into::<amparo_core::Error>::into)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("intake {intake_id} not found"))
    })?;

  let bytes = base64::engine::general_purpose::STANDARD
    .decode(&body.content_base64)
    .map_err(|e| ApiError::BadRequest(format!("invalid base64 payload: {e}")))?;
  if bytes.is_empty() {
    return Err(ApiError::BadRequest("empty document payload".into()));
  }

  let path = format!("intakes/{intake_id}/{}", body.title);
  let blob_ref = state.blobs.put(bytes, &path).await?;

  Ok((
    StatusCode::CREATED,
    Json(json!({
      "blob_ref": blob_ref,
      "title": body.title,
      "media_type": body.media_type,
      "uploaded_by": body.actor.user_id,
    })),
  ))
}
