//! The notification dispatcher boundary.
//!
//! Delivery is fire-and-forget and best-effort: a failed notification never
//! rolls back the mutation that triggered it.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub user_id: Uuid,
  pub title:   String,
  pub message: String,
  /// Deep link into the receiving user's view of the referenced record.
  pub link:    Option<String>,
}

/// Abstraction over an external notification dispatcher.
pub trait Notifier: Send + Sync {
  fn notify(
    &self,
    notification: Notification,
  ) -> impl Future<Output = crate::Result<()>> + Send + '_;
}
