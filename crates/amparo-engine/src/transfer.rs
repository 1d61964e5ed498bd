//! The inter-unit transfer coordinator.
//!
//! A transfer is irreversible from the source unit's point of view (it loses
//! all visibility of the case), so commits are gated behind a two-phase
//! confirmation: `preview` validates the move and hands back a single-use
//! ticket, `commit` redeems the ticket within its TTL and performs the
//! ownership swap.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::{sync::Mutex, task::JoinSet, time::Instant};
use uuid::Uuid;

use amparo_core::{
  Error, Result,
  actor::ActorContext,
  audit::{AuditAction, Audited, NewAuditEntry},
  notify::{Notification, Notifier},
  store::CaseStore,
  transfer::{NewTransfer, TransferRecord},
};

use crate::{audit::AuditRecorder, cascade::DEFAULT_PARALLELISM};

/// How long a confirmation ticket stays redeemable.
pub const TICKET_TTL: Duration = Duration::from_secs(10 * 60);

// ─── Tickets ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Ticket {
  case_id:        Uuid,
  to_unit:        Uuid,
  reason:         String,
  transferred_at: Option<DateTime<Utc>>,
  initiated_by:   Uuid,
  issued_at:      Instant,
}

/// What `preview` hands back for the caller to confirm.
#[derive(Debug, Clone, Serialize)]
pub struct TransferPreview {
  pub ticket_id:   Uuid,
  pub case_id:     Uuid,
  pub case_number: String,
  pub from_unit:   Uuid,
  pub to_unit:     Uuid,
  pub reason:      String,
  /// Seconds until the ticket expires.
  pub valid_for:   u64,
}

/// The committed transfer plus the notification delivery tally.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
  pub record:               TransferRecord,
  pub notified:             usize,
  pub notification_failures: usize,
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct TransferCoordinator<S, N> {
  store:       Arc<S>,
  notifier:    Arc<N>,
  audit:       AuditRecorder<S>,
  tickets:     Arc<Mutex<HashMap<Uuid, Ticket>>>,
  parallelism: usize,
}

impl<S, N> Clone for TransferCoordinator<S, N> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      notifier:    Arc::clone(&self.notifier),
      audit:       self.audit.clone(),
      tickets:     Arc::clone(&self.tickets),
      parallelism: self.parallelism,
    }
  }
}

impl<S, N> TransferCoordinator<S, N>
where
  S: CaseStore + Send + Sync + 'static,
  N: Notifier + 'static,
{
  pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
    let audit = AuditRecorder::new(Arc::clone(&store));
    Self {
      store,
      notifier,
      audit,
      tickets: Arc::new(Mutex::new(HashMap::new())),
      parallelism: DEFAULT_PARALLELISM,
    }
  }

  /// Phase one: validate the move and issue a single-use ticket.
  ///
  /// Only unit leads and admins may move a case, and the destination must
  /// differ from the current owning unit. An explicit `transferred_at`
  /// (e.g. a back-dated administrative move) is carried through the ticket;
  /// otherwise the commit time is stamped.
  pub async fn preview(
    &self,
    case_id: Uuid,
    to_unit: Uuid,
    reason: String,
    transferred_at: Option<DateTime<Utc>>,
    actor: ActorContext,
  ) -> Result<TransferPreview> {
    if !actor.role.may_administer_case() {
      return Err(Error::Forbidden(
        "only a unit lead or admin may transfer a case".into(),
      ));
    }
    if reason.trim().is_empty() {
      return Err(Error::Validation(
        "a transfer requires a reason".into(),
      ));
    }

    let case = self
      .store
      .get_case(case_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::CaseNotFound(case_id))?;

    if case.unit_id == to_unit {
      return Err(Error::Validation(
        "destination unit already owns this case".into(),
      ));
    }

    let ticket_id = Uuid::new_v4();
    let mut tickets = self.tickets.lock().await;
    tickets.retain(|_, t| t.issued_at.elapsed() < TICKET_TTL);
    tickets.insert(ticket_id, Ticket {
      case_id,
      to_unit,
      reason: reason.clone(),
      transferred_at,
      initiated_by: actor.user_id,
      issued_at: Instant::now(),
    });

    Ok(TransferPreview {
      ticket_id,
      case_id,
      case_number: case.case_number,
      from_unit: case.unit_id,
      to_unit,
      reason,
      valid_for: TICKET_TTL.as_secs(),
    })
  }

  /// Phase two: redeem the ticket and perform the ownership swap.
  ///
  /// The ticket must be unexpired, unredeemed, and redeemed by the same
  /// user who previewed. The swap itself runs as one store transaction;
  /// the destination-unit notification fan-out happens after commit and is
  /// best-effort.
  pub async fn commit(
    &self,
    ticket_id: Uuid,
    actor: ActorContext,
  ) -> Result<Audited<TransferOutcome>> {
    let ticket = {
      let mut tickets = self.tickets.lock().await;
      let ticket = tickets
        .remove(&ticket_id)
        .ok_or_else(|| Error::Validation(
          "unknown or already redeemed transfer ticket".into(),
        ))?;
      if ticket.issued_at.elapsed() >= TICKET_TTL {
        return Err(Error::Validation("transfer ticket has expired".into()));
      }
      ticket
    };

    if ticket.initiated_by != actor.user_id {
      return Err(Error::Forbidden(
        "a transfer must be confirmed by the user who initiated it".into(),
      ));
    }

    let record = self
      .store
      .transfer_case(NewTransfer {
        case_id:        ticket.case_id,
        to_unit:        ticket.to_unit,
        reason:         ticket.reason,
        transferred_at: ticket.transferred_at.unwrap_or_else(Utc::now),
        initiated_by:   actor.user_id,
      })
      .await
      .map_err(Into::into)?;

    let (notified, notification_failures) = self.notify_destination(&record).await;

    let audit = self
      .audit
      .record(NewAuditEntry {
        table_name: "cases".into(),
        record_id:  record.case_id,
        action:     AuditAction::Transfer,
        actor_id:   actor.user_id,
        payload:    Some(json!({
          "transfer_id": record.transfer_id,
          "from_unit": record.from_unit,
          "to_unit": record.to_unit,
        })),
      })
      .await;

    Ok(Audited::new(
      TransferOutcome { record, notified, notification_failures },
      audit,
    ))
  }

  /// Tell every user in the destination unit about the incoming case,
  /// through a bounded worker pool. Failures are counted, never fatal.
  async fn notify_destination(&self, record: &TransferRecord) -> (usize, usize) {
    let audience = match self.store.list_users_in_unit(record.to_unit).await {
      Ok(users) => users,
      Err(e) => {
        let e: Error = e.into();
        tracing::warn!(
          to_unit = %record.to_unit,
          error = %e,
          "could not list destination unit users for transfer notification"
        );
        return (0, 0);
      }
    };

    let message = format!(
      "A case has been transferred into your unit (transfer {}).",
      record.transfer_id
    );
    let link = format!("/cases/{}", record.case_id);

    let mut pending = audience.into_iter();
    let mut set: JoinSet<Result<()>> = JoinSet::new();

    let spawn = |set: &mut JoinSet<_>, user_id: Uuid| {
      let notifier = Arc::clone(&self.notifier);
      let notification = Notification {
        user_id,
        title: "Case transferred to your unit".into(),
        message: message.clone(),
        link: Some(link.clone()),
      };
      set.spawn(async move { notifier.notify(notification).await });
    };

    for _ in 0..self.parallelism {
      if let Some(user) = pending.next() {
        spawn(&mut set, user.user_id);
      }
    }

    let mut notified = 0;
    let mut failures = 0;
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok(Ok(())) => notified += 1,
        Ok(Err(e)) => {
          tracing::warn!(error = %e, "transfer notification failed");
          failures += 1;
        }
        Err(join_err) => {
          tracing::error!(error = %join_err, "notification task panicked");
          failures += 1;
        }
      }
      if let Some(user) = pending.next() {
        spawn(&mut set, user.user_id);
      }
    }

    (notified, failures)
  }
}
