//! The `CaseStore` trait — the persistence gateway contract.
//!
//! The trait is implemented by storage backends (e.g. `amparo-store-sqlite`).
//! Higher layers (`amparo-engine`, `amparo-api`) depend on this abstraction,
//! not on any concrete backend.
//!
//! Compound operations (replace-on-save, intervention insert with its
//! associations, the transfer ownership swap) are trait methods rather than
//! call sequences so the backend can run each one inside a single
//! transaction.

use std::future::Future;

use uuid::Uuid;

use crate::{
  actor::UserRef,
  audit::{AuditEntry, NewAuditEntry},
  case::{Case, NewCase},
  child::{Child, NewChild},
  intake::{Intake, IntakeTransition, NewIntake},
  intervention::{InterventionRecord, NewIntervention},
  measure::{Measure, NewMeasurePlan},
  records::{CollectionBundle, HouseholdMember, IntakeCollections},
  transfer::{NewTransfer, TransferRecord},
};

/// Abstraction over an Amparo case store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CaseStore: Send + Sync {
  type Error: std::error::Error
    + Into<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Children ──────────────────────────────────────────────────────────

  /// Look a child up by national id. Returns `None` if never received.
  fn find_child_by_national_id(
    &self,
    national_id: &str,
  ) -> impl Future<Output = Result<Option<Child>, Self::Error>> + Send + '_;

  fn get_child(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Child>, Self::Error>> + Send + '_;

  /// Create and persist a new child. `created_at`/`updated_at` are set by
  /// the store.
  fn add_child(
    &self,
    input: NewChild,
  ) -> impl Future<Output = Result<Child, Self::Error>> + Send + '_;

  /// Overwrite a child's mutable fields from a reception edit. Bumps
  /// `updated_at`. Children are never deleted.
  fn update_child(
    &self,
    child: Child,
  ) -> impl Future<Output = Result<Child, Self::Error>> + Send + '_;

  // ── Cases ─────────────────────────────────────────────────────────────

  /// Create a new active case for a child, generating the immutable case
  /// number. Fails if the child already has an active case.
  fn add_case(
    &self,
    input: NewCase,
  ) -> impl Future<Output = Result<Case, Self::Error>> + Send + '_;

  fn get_case(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Case>, Self::Error>> + Send + '_;

  fn find_active_case(
    &self,
    child_id: Uuid,
  ) -> impl Future<Output = Result<Option<Case>, Self::Error>> + Send + '_;

  /// Set the case's `active` flag. Used only by the lifecycle engine when
  /// an advice-only decision closes the whole case.
  fn set_case_active(
    &self,
    case_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Intakes ───────────────────────────────────────────────────────────

  /// Open a new intake at `reception`/`open` with the next per-case
  /// sequence number.
  ///
  /// Fails with the `ActiveIntakeExists` invariant error (no row created)
  /// if the case already has an open intake.
  fn open_intake(
    &self,
    input: NewIntake,
  ) -> impl Future<Output = Result<Intake, Self::Error>> + Send + '_;

  fn get_intake(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Intake>, Self::Error>> + Send + '_;

  fn list_intakes(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Intake>, Self::Error>> + Send + '_;

  /// Apply a state change to an intake, conditioned on `expected_version`.
  ///
  /// Bumps the version and stamps `last_modified_by`. Fails with a conflict
  /// error (no mutation) if the stored version differs.
  fn apply_intake_transition(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    change: IntakeTransition,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<Intake, Self::Error>> + Send + '_;

  // ── Collection sub-records ────────────────────────────────────────────

  /// Replace-on-save: delete every existing row of the four collections for
  /// `intake_id`, then insert `bundle`, as one transaction conditioned on
  /// `expected_version`. Documents attached to interventions are untouched.
  ///
  /// Returns the intake with its bumped version.
  fn replace_collections(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    bundle: CollectionBundle,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<Intake, Self::Error>> + Send + '_;

  fn get_collections(
    &self,
    intake_id: Uuid,
  ) -> impl Future<Output = Result<IntakeCollections, Self::Error>> + Send + '_;

  fn list_household_members(
    &self,
    intake_id: Uuid,
  ) -> impl Future<Output = Result<Vec<HouseholdMember>, Self::Error>> + Send + '_;

  // ── Interventions ─────────────────────────────────────────────────────

  /// Insert an intervention record, its professional associations and its
  /// attached documents in one transaction.
  ///
  /// Fails with the `IntakeNotOpen` invariant error if the target intake is
  /// not open — this is the per-target check group replication relies on.
  fn add_intervention(
    &self,
    input: NewIntervention,
  ) -> impl Future<Output = Result<InterventionRecord, Self::Error>> + Send + '_;

  fn list_interventions(
    &self,
    intake_id: Uuid,
  ) -> impl Future<Output = Result<Vec<InterventionRecord>, Self::Error>> + Send + '_;

  // ── Measure plan ──────────────────────────────────────────────────────

  /// Replace the intake's measure and its actions wholesale, conditioned on
  /// `expected_version`.
  fn save_measure_plan(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    plan: NewMeasurePlan,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<Measure, Self::Error>> + Send + '_;

  fn get_measure_plan(
    &self,
    intake_id: Uuid,
  ) -> impl Future<Output = Result<Option<Measure>, Self::Error>> + Send + '_;

  // ── Transfers ─────────────────────────────────────────────────────────

  /// The transactional core of a case transfer: read the current owning
  /// unit, insert the immutable transfer record, and swap the case's owning
  /// unit, all or nothing. Notification fan-out is the caller's concern.
  fn transfer_case(
    &self,
    input: NewTransfer,
  ) -> impl Future<Output = Result<TransferRecord, Self::Error>> + Send + '_;

  fn list_transfers(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TransferRecord>, Self::Error>> + Send + '_;

  // ── Users ─────────────────────────────────────────────────────────────

  fn add_user(
    &self,
    user: UserRef,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Every user whose home unit is `unit_id`; the transfer coordinator's
  /// notification audience.
  fn list_users_in_unit(
    &self,
    unit_id: Uuid,
  ) -> impl Future<Output = Result<Vec<UserRef>, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Append one immutable audit entry. `recorded_at` is set by the store.
  fn append_audit(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditEntry, Self::Error>> + Send + '_;

  fn list_audit_for(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;
}
