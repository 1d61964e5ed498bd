//! Error type for `amparo-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Domain-level failure (invariant violation, version conflict, not
  /// found). Carried through so higher layers can match on it.
  #[error(transparent)]
  Core(#[from] amparo_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// An enum column held a value this build does not know.
  #[error("unknown discriminant in column {column}: {value:?}")]
  UnknownDiscriminant { column: &'static str, value: String },
}

impl From<Error> for amparo_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      other => amparo_core::Error::Storage(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
