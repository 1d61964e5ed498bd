//! The audit recorder — the single funnel for trail writes.
//!
//! An audit failure never rolls back the business mutation that preceded
//! it. It is logged, and surfaced to the caller as
//! [`AuditStatus::Failed`] so operators can reconcile.

use std::sync::Arc;

use amparo_core::{
  audit::{AuditStatus, NewAuditEntry},
  store::CaseStore,
};

pub struct AuditRecorder<S> {
  store: Arc<S>,
}

impl<S> Clone for AuditRecorder<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store) }
  }
}

impl<S: CaseStore> AuditRecorder<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Append one audit entry, reporting the outcome instead of failing.
  pub async fn record(&self, entry: NewAuditEntry) -> AuditStatus {
    let table = entry.table_name.clone();
    let record_id = entry.record_id;
    match self.store.append_audit(entry).await {
      Ok(_) => AuditStatus::Recorded,
      Err(e) => {
        let e: amparo_core::Error = e.into();
        tracing::warn!(
          %table,
          %record_id,
          error = %e,
          "business mutation committed but audit write failed"
        );
        AuditStatus::Failed { message: e.to_string() }
      }
    }
  }
}
