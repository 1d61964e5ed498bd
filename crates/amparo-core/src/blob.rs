//! The blob-storage boundary for document payloads.
//!
//! The engine never handles document bytes beyond handing them to a
//! [`BlobStore`]; only the returned stable reference is persisted.

use std::future::Future;

/// Abstraction over an external blob-storage facility.
pub trait BlobStore: Send + Sync {
  /// Store `bytes` under a logical `path` and return a stable reference
  /// that can later be resolved to the payload.
  fn put(
    &self,
    bytes: Vec<u8>,
    path: &str,
  ) -> impl Future<Output = crate::Result<String>> + Send + '_;
}
