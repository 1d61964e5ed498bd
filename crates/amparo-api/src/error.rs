//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  /// Invariant or optimistic-concurrency violation; the client must reload
  /// and resubmit.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<amparo_core::Error> for ApiError {
  fn from(e: amparo_core::Error) -> Self {
    use amparo_core::Error as E;
    match e {
      E::ChildNotFound(_)
      | E::CaseNotFound(_)
      | E::IntakeNotFound(_)
      | E::InterventionNotFound(_) => ApiError::NotFound(e.to_string()),
      E::ActiveIntakeExists(_)
      | E::ActiveCaseExists(_)
      | E::IntakeNotOpen(_)
      | E::Conflict { .. } => ApiError::Conflict(e.to_string()),
      E::Validation(_) => ApiError::BadRequest(e.to_string()),
      E::Forbidden(_) => ApiError::Forbidden(e.to_string()),
      E::AuditWriteFailure(_)
      | E::Notification(_)
      | E::Blob(_)
      | E::Serialization(_)
      | E::Storage(_) => ApiError::Internal(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
