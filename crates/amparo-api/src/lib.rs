//! JSON REST API for Amparo.
//!
//! Exposes an axum [`Router`] over the lifecycle engine, the cascading write
//! coordinator and the transfer coordinator, all backed by any
//! [`amparo_core::store::CaseStore`]. Auth, TLS, and transport concerns are
//! the caller's responsibility: every mutating body carries an explicit
//! [`amparo_core::actor::ActorContext`] resolved by the mounting server.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", amparo_api::api_router(store, notifier, blobs))
//! ```

pub mod cases;
pub mod documents;
pub mod error;
pub mod intakes;
pub mod interventions;
pub mod transfers;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use amparo_core::{blob::BlobStore, notify::Notifier, store::CaseStore};
use amparo_engine::{
  CascadeCoordinator, LifecycleEngine, TransferCoordinator,
};

pub use error::ApiError;

/// Everything the handlers need, cheap to clone per request.
pub struct AppState<S, N, B> {
  pub store:     Arc<S>,
  pub lifecycle: LifecycleEngine<S>,
  pub cascade:   CascadeCoordinator<S>,
  pub transfers: TransferCoordinator<S, N>,
  pub blobs:     Arc<B>,
}

impl<S, N, B> Clone for AppState<S, N, B> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      lifecycle: self.lifecycle.clone(),
      cascade:   self.cascade.clone(),
      transfers: self.transfers.clone(),
      blobs:     Arc::clone(&self.blobs),
    }
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N, B>(
  store: Arc<S>,
  notifier: Arc<N>,
  blobs: Arc<B>,
) -> Router<()>
where
  S: CaseStore + 'static,
  N: Notifier + 'static,
  B: BlobStore + 'static,
{
  let cascade = CascadeCoordinator::new(Arc::clone(&store));
  let state = AppState {
    lifecycle: LifecycleEngine::new(Arc::clone(&store), cascade.clone()),
    transfers: TransferCoordinator::new(Arc::clone(&store), notifier),
    cascade,
    store,
    blobs,
  };

  Router::new()
    // Reception and cases
    .route("/receptions", post(cases::register::<S, N, B>))
    .route("/cases/{id}", get(cases::get_one::<S, N, B>))
    .route(
      "/cases/{id}/intakes",
      get(cases::list_intakes::<S, N, B>).post(intakes::open::<S, N, B>),
    )
    .route("/cases/{id}/transfers", get(cases::list_transfers::<S, N, B>))
    // Intake lifecycle
    .route("/intakes/{id}", get(intakes::get_one::<S, N, B>))
    .route("/intakes/{id}/decision", post(intakes::decide::<S, N, B>))
    .route("/intakes/{id}/advance", post(intakes::advance::<S, N, B>))
    .route("/intakes/{id}/close", post(intakes::close::<S, N, B>))
    .route("/intakes/{id}/escalation", post(intakes::resolve::<S, N, B>))
    // Collections and measure plan
    .route(
      "/intakes/{id}/collections",
      get(intakes::get_collections::<S, N, B>)
        .put(intakes::save_collections::<S, N, B>),
    )
    .route(
      "/intakes/{id}/measure",
      get(intakes::get_measure::<S, N, B>)
        .put(intakes::save_measure::<S, N, B>),
    )
    // Interventions and documents
    .route(
      "/intakes/{id}/interventions",
      get(interventions::list::<S, N, B>)
        .post(interventions::record::<S, N, B>),
    )
    .route("/intakes/{id}/documents", post(documents::upload::<S, N, B>))
    // Transfers
    .route("/transfers/preview", post(transfers::preview::<S, N, B>))
    .route("/transfers/commit", post(transfers::commit::<S, N, B>))
    // Audit
    .route("/audit/{record_id}", get(cases::audit_trail::<S, N, B>))
    .with_state(state)
}
