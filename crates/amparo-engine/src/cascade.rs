//! The cascading write coordinator.
//!
//! Owns the two fan-shaped write patterns of the system: replace-on-save for
//! an intake's collection sub-records, and the replication of a group
//! intervention into every linked household member's own open intake.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinSet;
use uuid::Uuid;

use amparo_core::{
  Error, Result,
  actor::ActorContext,
  audit::{AuditAction, Audited, NewAuditEntry},
  intake::Intake,
  intervention::{
    GROUP_COPY_PREFIX, InterventionKind, InterventionRecord, NewIntervention,
  },
  records::{CollectionBundle, NewDocument},
  store::CaseStore,
};

use crate::audit::AuditRecorder;

/// Upper bound on concurrent replica/notification writes against the
/// gateway.
pub const DEFAULT_PARALLELISM: usize = 4;

// ─── Inputs and outcomes ─────────────────────────────────────────────────────

/// Caller-supplied content of an intervention record.
#[derive(Debug, Clone, Deserialize)]
pub struct InterventionDraft {
  pub kind:          InterventionKind,
  pub narrative:     String,
  pub occurred_at:   DateTime<Utc>,
  #[serde(default)]
  pub professionals: Vec<Uuid>,
  #[serde(default)]
  pub documents:     Vec<NewDocument>,
}

/// A replication target that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTarget {
  pub intake_id:   Uuid,
  pub member_name: String,
  pub error:       String,
}

/// The result of recording an intervention: the canonical record plus the
/// per-target outcome of group replication.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionOutcome {
  pub primary:        InterventionRecord,
  pub replicated:     Vec<InterventionRecord>,
  pub failed_targets: Vec<FailedTarget>,
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct CascadeCoordinator<S> {
  store:       Arc<S>,
  audit:       AuditRecorder<S>,
  parallelism: usize,
}

impl<S> Clone for CascadeCoordinator<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      audit:       self.audit.clone(),
      parallelism: self.parallelism,
    }
  }
}

impl<S> CascadeCoordinator<S>
where
  S: CaseStore + Send + Sync + 'static,
{
  pub fn new(store: Arc<S>) -> Self {
    let audit = AuditRecorder::new(Arc::clone(&store));
    Self { store, audit, parallelism: DEFAULT_PARALLELISM }
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  // ── Replace-on-save ───────────────────────────────────────────────────

  /// Replace the intake's four collections wholesale, without writing an
  /// audit entry. Used by the lifecycle engine, which audits the whole
  /// transition as one entry.
  ///
  /// The store runs the delete+insert as a single transaction conditioned
  /// on `expected_version`; a concurrent save surfaces as
  /// [`Error::Conflict`] with nothing written.
  pub async fn replace_collections(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    bundle: CollectionBundle,
    actor: ActorContext,
  ) -> Result<Intake> {
    self
      .store
      .replace_collections(intake_id, expected_version, bundle, actor.user_id)
      .await
      .map_err(Into::into)
  }

  /// Replace-on-save as a standalone operation, with its own audit entry.
  pub async fn save_collections(
    &self,
    intake_id: Uuid,
    expected_version: i64,
    bundle: CollectionBundle,
    actor: ActorContext,
  ) -> Result<Audited<Intake>> {
    let counts = json!({
      "right_violations": bundle.right_violations.len(),
      "household_members": bundle.household_members.len(),
      "community_contacts": bundle.community_contacts.len(),
      "documents": bundle.documents.len(),
    });

    let intake = self
      .replace_collections(intake_id, expected_version, bundle, actor)
      .await?;

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "intakes".into(),
        record_id:  intake_id,
        action:     AuditAction::Update,
        actor_id:   actor.user_id,
        payload:    Some(json!({ "op": "replace_collections", "counts": counts })),
      })
      .await;

    Ok(Audited::new(intake, audit))
  }

  // ── Intervention recording and group replication ──────────────────────

  /// Record an intervention against an intake; when `is_group` is set, fan
  /// a copy out to every household member's own open intake.
  ///
  /// Replication is best-effort per target: a failed target is logged,
  /// reported in `failed_targets`, and never rolls back the canonical save
  /// or the remaining targets.
  pub async fn record_intervention(
    &self,
    intake_id: Uuid,
    draft: InterventionDraft,
    is_group: bool,
    actor: ActorContext,
  ) -> Result<Audited<InterventionOutcome>> {
    let primary = self
      .store
      .add_intervention(NewIntervention {
        intake_id,
        kind: draft.kind,
        narrative: draft.narrative.clone(),
        occurred_at: draft.occurred_at,
        recorded_by: actor.user_id,
        group: is_group,
        replicated_from: None,
        professionals: draft.professionals.clone(),
        documents: draft.documents.clone(),
      })
      .await
      .map_err(Into::into)?;

    let (replicated, failed_targets) = if is_group {
      self.replicate_to_household(&primary, &draft, actor).await?
    } else {
      (Vec::new(), Vec::new())
    };

    if !failed_targets.is_empty() {
      // Leave a reconciliation marker for operators; best-effort.
      self
        .audit
        .record(NewAuditEntry {
          table_name: "interventions".into(),
          record_id:  primary.intervention_id,
          action:     AuditAction::Reconciliation,
          actor_id:   actor.user_id,
          payload:    Some(json!({
            "failed_targets": failed_targets
              .iter()
              .map(|f| f.intake_id)
              .collect::<Vec<_>>(),
          })),
        })
        .await;
    }

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "interventions".into(),
        record_id:  primary.intervention_id,
        action:     AuditAction::Insert,
        actor_id:   actor.user_id,
        payload:    Some(json!({
          "intake_id": intake_id,
          "group": is_group,
          "replicated": replicated.len(),
          "failed": failed_targets.len(),
        })),
      })
      .await;

    Ok(Audited::new(
      InterventionOutcome { primary, replicated, failed_targets },
      audit,
    ))
  }

  /// Fan the canonical record out to each linked open intake, through a
  /// bounded worker pool. Each replica write runs in its own transaction
  /// with its own open-status check.
  async fn replicate_to_household(
    &self,
    primary: &InterventionRecord,
    draft: &InterventionDraft,
    actor: ActorContext,
  ) -> Result<(Vec<InterventionRecord>, Vec<FailedTarget>)> {
    let members = self
      .store
      .list_household_members(primary.intake_id)
      .await
      .map_err(Into::into)?;

    let mut seen = Vec::new();
    let mut targets = Vec::new();
    for member in members {
      let Some(linked) = member.linked_intake_id else { continue };
      if linked == primary.intake_id || seen.contains(&linked) {
        continue;
      }
      seen.push(linked);
      targets.push((linked, member.full_name));
    }

    let mut pending = targets.into_iter();
    let mut set: JoinSet<(Uuid, String, Result<InterventionRecord>)> =
      JoinSet::new();

    let spawn = |set: &mut JoinSet<_>, target: Uuid, member_name: String| {
      let store = Arc::clone(&self.store);
      let input = NewIntervention {
        intake_id:       target,
        kind:            primary.kind,
        narrative:       format!("{GROUP_COPY_PREFIX}{}", draft.narrative),
        occurred_at:     primary.occurred_at,
        recorded_by:     actor.user_id,
        group:           true,
        replicated_from: Some(primary.intervention_id),
        professionals:   draft.professionals.clone(),
        // Same blob references, new metadata rows on the target intake.
        documents:       draft.documents.clone(),
      };
      set.spawn(async move {
        let result = store.add_intervention(input).await.map_err(Into::into);
        (target, member_name, result)
      });
    };

    for _ in 0..self.parallelism {
      if let Some((target, name)) = pending.next() {
        spawn(&mut set, target, name);
      }
    }

    let mut replicated = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok((_, _, Ok(record))) => replicated.push(record),
        Ok((target, member_name, Err(e))) => {
          tracing::warn!(
            target_intake = %target,
            member = %member_name,
            error = %e,
            "group intervention replication failed for target"
          );
          failed.push(FailedTarget {
            intake_id: target,
            member_name,
            error: e.to_string(),
          });
        }
        Err(join_err) => {
          tracing::error!(error = %join_err, "replication task panicked");
          return Err(Error::Storage(join_err.to_string()));
        }
      }
      if let Some((target, name)) = pending.next() {
        spawn(&mut set, target, name);
      }
    }

    Ok((replicated, failed))
  }
}
