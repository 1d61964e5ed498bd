//! Process-level wiring for the Amparo server.
//!
//! Holds the runtime configuration, the filesystem blob store, the tracing
//! notification dispatcher, and the function that assembles the full axum
//! router from them.

use std::{
  future::Future,
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use serde::Deserialize;
use sha2::{Digest as _, Sha256};
use tower_http::trace::TraceLayer;

use amparo_core::{
  blob::BlobStore,
  notify::{Notification, Notifier},
  store::CaseStore,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`. Every
/// field has a default so the server starts with no config file at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  /// Path of the SQLite case store file.
  pub store_path: PathBuf,
  /// Root directory for document payloads.
  pub blob_root:  PathBuf,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".into(),
      port:       8970,
      store_path: PathBuf::from("amparo.db"),
      blob_root:  PathBuf::from("blobs"),
    }
  }
}

// ─── Blob storage ────────────────────────────────────────────────────────────

/// Content-addressed blob storage on the local filesystem.
///
/// Payloads land at `<root>/<aa>/<rest-of-digest>` keyed by their SHA-256,
/// so identical uploads share one file and references never go stale.
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
}

impl BlobStore for FsBlobStore {
  fn put(
    &self,
    bytes: Vec<u8>,
    path: &str,
  ) -> impl Future<Output = amparo_core::Result<String>> + Send + '_ {
    let logical_path = path.to_owned();
    async move {
      let digest = hex::encode(Sha256::digest(&bytes));
      let (shard, rest) = digest.split_at(2);
      let dir = self.root.join(shard);
      let target = dir.join(rest);

      tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| amparo_core::Error::Blob(e.to_string()))?;
      if tokio::fs::try_exists(&target)
        .await
        .map_err(|e| amparo_core::Error::Blob(e.to_string()))?
      {
        tracing::debug!(%digest, path = %logical_path, "blob already stored");
      } else {
        tokio::fs::write(&target, &bytes)
          .await
          .map_err(|e| amparo_core::Error::Blob(e.to_string()))?;
        tracing::debug!(%digest, path = %logical_path, "blob stored");
      }

      Ok(format!("sha256:{digest}"))
    }
  }
}

// ─── Notification dispatch ───────────────────────────────────────────────────

/// A dispatcher that writes notifications to the log.
///
/// Stands in until an external channel (mail, in-app inbox) is wired up;
/// delivery semantics match the real thing: always succeeds, never blocks a
/// mutation.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(
    &self,
    notification: Notification,
  ) -> impl Future<Output = amparo_core::Result<()>> + Send + '_ {
    async move {
      tracing::info!(
        user_id = %notification.user_id,
        title = %notification.title,
        link = notification.link.as_deref().unwrap_or("-"),
        "notification dispatched"
      );
      Ok(())
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Assemble the full application router: the JSON API under `/api`, with
/// request tracing.
pub fn router<S, N, B>(
  store: Arc<S>,
  notifier: Arc<N>,
  blobs: Arc<B>,
) -> Router
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  Router::new()
    .nest("/api", amparo_api::api_router(store, notifier, blobs))
    .layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Integration tests ───────────────────────────────────────────────────────
