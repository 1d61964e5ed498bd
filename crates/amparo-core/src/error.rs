//! Error types for `amparo-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("child not found: {0}")]
  ChildNotFound(Uuid),

  #[error("case not found: {0}")]
  CaseNotFound(Uuid),

  #[error("intake not found: {0}")]
  IntakeNotFound(Uuid),

  #[error("intervention not found: {0}")]
  InterventionNotFound(Uuid),

  /// The single-open-intake invariant: a case may have at most one intake
  /// with `open` status at any time.
  #[error("case {0} already has an open intake")]
  ActiveIntakeExists(Uuid),

  /// The single-active-case invariant: a child may have at most one active
  /// case at any time.
  #[error("child {0} already has an active case")]
  ActiveCaseExists(Uuid),

  #[error("intake {0} is not open")]
  IntakeNotOpen(Uuid),

  /// Optimistic-concurrency failure: the intake changed since the caller
  /// loaded it. The caller must reload and resubmit.
  #[error(
    "version conflict on intake {intake_id}: expected {expected}, found \
     {actual}"
  )]
  Conflict {
    intake_id: Uuid,
    expected:  i64,
    actual:    i64,
  },

  /// Input rejected before any mutation took place.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  /// The business mutation succeeded but the audit trail write did not.
  /// Distinct from a rolled-back mutation; operators must reconcile.
  #[error("audit write failed: {0}")]
  AuditWriteFailure(String),

  #[error("notification dispatch failed: {0}")]
  Notification(String),

  #[error("blob storage failed: {0}")]
  Blob(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Backend fault in the persistence gateway.
  #[error("storage error: {0}")]
  Storage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
