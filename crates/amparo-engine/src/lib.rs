//! The Amparo case-lifecycle engine.
//!
//! Three coordinators sit between the I/O boundary and the persistence
//! gateway:
//!
//! - [`LifecycleEngine`] owns the intake stage machine: only it changes an
//!   intake's stage or status, including the three-way decision branch at
//!   reception close and the closure vocabulary at follow-up.
//! - [`CascadeCoordinator`] owns replace-on-save for an intake's collection
//!   sub-records and the group-intervention replication fan-out.
//! - [`TransferCoordinator`] owns the two-phase inter-unit ownership handoff
//!   with its notification fan-out.
//!
//! Every mutating operation finishes through the [`AuditRecorder`]; results
//! come back as [`amparo_core::audit::Audited`] so a failed audit write is
//! reported without masking the successful mutation.

pub mod audit;
pub mod cascade;
pub mod lifecycle;
pub mod transfer;

pub use amparo_core::{Error, Result};
pub use audit::AuditRecorder;
pub use cascade::{
  CascadeCoordinator, FailedTarget, InterventionDraft, InterventionOutcome,
};
pub use lifecycle::{DecisionSubmission, LifecycleEngine, ReceptionIntake};
pub use transfer::{TransferCoordinator, TransferOutcome, TransferPreview};

#[cfg(test)]
mod tests;
