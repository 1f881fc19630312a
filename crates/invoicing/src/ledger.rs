//! Reducer over (authoritative snapshot, pending optimistic patch).
//!
//! The visible invoice is always a pure function of the two: the pending
//! patch when one exists, the snapshot otherwise. Server responses replace the
//! snapshot and drop the patch; failures drop the patch and ask for a refetch.

use chrono::{DateTime, Utc};
use serde_json::Value;

use tradedesk_core::{Entity, RecordId};

use crate::model::Invoice;
use crate::normalize::normalize_invoice;
use crate::policy::LedgerPolicy;
use crate::reconcile::{
    PaymentError, PaymentInput, PaymentPayload, VoidPayload, apply_payment, void_payment,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Payment,
    Void,
}

/// An optimistic change awaiting the server's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub payment_id: RecordId,
    pub optimistic: Invoice,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The server's copy was adopted. `drifted` is set when it disagrees with
    /// the optimistic balance (e.g. a concurrent payment from another session).
    Settled { drifted: bool },
    /// The patch was discarded; the caller must refetch the snapshot.
    RefetchRequired,
    /// The patch was discarded because the request was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    snapshot: Invoice,
    pending: Option<PendingChange>,
}

impl LedgerState {
    pub fn new(snapshot: Invoice) -> Self {
        Self {
            snapshot,
            pending: None,
        }
    }

    /// What the UI renders.
    pub fn view(&self) -> &Invoice {
        self.pending
            .as_ref()
            .map(|p| &p.optimistic)
            .unwrap_or(&self.snapshot)
    }

    pub fn snapshot(&self) -> &Invoice {
        &self.snapshot
    }

    pub fn pending(&self) -> Option<&PendingChange> {
        self.pending.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Install a pending change. Only one change may be in flight per invoice.
    pub fn begin(&mut self, change: PendingChange) -> Result<(), PaymentError> {
        if self.pending.is_some() {
            return Err(PaymentError::InFlight(self.snapshot.id.clone()));
        }
        self.pending = Some(change);
        Ok(())
    }

    pub fn begin_payment(
        &mut self,
        input: &PaymentInput,
        policy: &LedgerPolicy,
        now: DateTime<Utc>,
    ) -> Result<PaymentPayload, PaymentError> {
        self.ensure_idle()?;
        let applied = apply_payment(&self.snapshot, input, policy, now)?;
        self.begin(PendingChange {
            kind: ChangeKind::Payment,
            payment_id: applied.payment_id,
            optimistic: applied.optimistic,
            started_at: now,
        })?;
        Ok(applied.payload)
    }

    pub fn begin_void(
        &mut self,
        payment_id: &RecordId,
        reason: &str,
        voided_by: Option<&str>,
        policy: &LedgerPolicy,
        now: DateTime<Utc>,
    ) -> Result<VoidPayload, PaymentError> {
        self.ensure_idle()?;
        let optimistic = void_payment(&self.snapshot, payment_id, reason, voided_by, policy, now)?;
        self.begin(PendingChange {
            kind: ChangeKind::Void,
            payment_id: payment_id.clone(),
            optimistic,
            started_at: now,
        })?;
        Ok(VoidPayload::new(self.snapshot.id.clone(), payment_id.clone(), reason).by(voided_by))
    }

    /// Adopt the server's authoritative copy of the invoice.
    pub fn settle(&mut self, server_raw: &Value, source: &str) -> SettleOutcome {
        match normalize_invoice(server_raw, source) {
            Some(invoice) => self.settle_with(invoice),
            None => {
                tracing::warn!(
                    invoice_id = %self.snapshot.id,
                    source,
                    "server response could not be normalized, refetch required"
                );
                self.pending = None;
                SettleOutcome::RefetchRequired
            }
        }
    }

    pub fn settle_with(&mut self, invoice: Invoice) -> SettleOutcome {
        if !self.snapshot.same_record(&invoice) {
            tracing::warn!(
                invoice_id = %self.snapshot.id,
                received_id = %invoice.id,
                "server answered with a different invoice, refetch required"
            );
            self.pending = None;
            return SettleOutcome::RefetchRequired;
        }
        let drifted = self.pending.take().is_some_and(|p| {
            p.optimistic.received != invoice.received
                || p.optimistic.outstanding != invoice.outstanding
                || p.optimistic.payment_status != invoice.payment_status
        });
        if drifted {
            tracing::info!(
                invoice_id = %invoice.id,
                received = %invoice.received,
                outstanding = %invoice.outstanding,
                "server balance differs from optimistic state, using server copy"
            );
        }
        self.snapshot = invoice;
        SettleOutcome::Settled { drifted }
    }

    /// The request failed: drop the patch and ask the caller to refetch.
    pub fn abandon(&mut self) -> SettleOutcome {
        if let Some(p) = self.pending.take() {
            tracing::warn!(
                invoice_id = %self.snapshot.id,
                payment_id = %p.payment_id,
                kind = ?p.kind,
                "optimistic change rolled back"
            );
        }
        SettleOutcome::RefetchRequired
    }

    /// The request was cancelled: drop the patch quietly.
    pub fn cancel(&mut self) -> SettleOutcome {
        self.pending = None;
        SettleOutcome::Cancelled
    }

    /// Last authoritative fetch wins; any pending patch still overlays it.
    pub fn replace_snapshot(&mut self, invoice: Invoice) {
        self.snapshot = invoice;
    }

    fn ensure_idle(&self) -> Result<(), PaymentError> {
        match self.pending {
            Some(_) => Err(PaymentError::InFlight(self.snapshot.id.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaymentMethod, PaymentStatus};
    use crate::normalize::to_canonical_json;
    use crate::reconcile::tests::{invoice_with_total, t0};
    use serde_json::json;
    use tradedesk_core::Money;

    fn cash(minor: i64) -> PaymentInput {
        PaymentInput::new(Money::from_minor(minor), PaymentMethod::Cash)
    }

    #[test]
    fn view_shows_patch_until_settled() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));

        let payload = ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();
        assert_eq!(payload.amount, Money::from_minor(40_000));
        assert!(ledger.is_in_flight());
        assert_eq!(ledger.view().outstanding, Money::from_minor(60_000));
        assert_eq!(ledger.snapshot().outstanding, Money::from_minor(100_000));

        let server = to_canonical_json(ledger.view());
        assert_eq!(ledger.settle(&server, "test"), SettleOutcome::Settled { drifted: false });
        assert!(!ledger.is_in_flight());
        assert_eq!(ledger.view().payment_status, PaymentStatus::PartiallyPaid);
    }

    #[test]
    fn second_operation_is_rejected_while_in_flight() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));
        ledger.begin_payment(&cash(10_000), &policy, t0()).unwrap();

        let err = ledger.begin_payment(&cash(10_000), &policy, t0()).unwrap_err();
        assert_eq!(err, PaymentError::InFlight(RecordId::from("inv-1")));
        assert_eq!(ledger.view().received, Money::from_minor(10_000));
    }

    #[test]
    fn server_copy_wins_even_when_it_disagrees() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));
        ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();

        let mut concurrent = ledger.view().clone();
        concurrent.received = Money::from_minor(90_000);
        concurrent.outstanding = Money::from_minor(10_000);
        assert_eq!(ledger.settle_with(concurrent), SettleOutcome::Settled { drifted: true });
        assert_eq!(ledger.view().outstanding, Money::from_minor(10_000));
    }

    #[test]
    fn failure_rolls_back_and_requests_refetch() {
        let policy = LedgerPolicy::default();
        let original = invoice_with_total(100_000);
        let mut ledger = LedgerState::new(original.clone());
        ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();

        assert_eq!(ledger.abandon(), SettleOutcome::RefetchRequired);
        assert_eq!(ledger.view(), &original);
    }

    #[test]
    fn unusable_server_payload_requests_refetch() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));
        ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();

        assert_eq!(ledger.settle(&json!("ok"), "test"), SettleOutcome::RefetchRequired);
        assert!(!ledger.is_in_flight());
    }

    #[test]
    fn response_for_another_invoice_is_not_adopted() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));
        ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();

        let mut other = invoice_with_total(5_000);
        other.id = RecordId::from("inv-2");
        assert_eq!(ledger.settle_with(other), SettleOutcome::RefetchRequired);
        assert_eq!(ledger.snapshot().id, RecordId::from("inv-1"));
        assert!(!ledger.is_in_flight());
    }

    #[test]
    fn cancel_is_a_quiet_no_op() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));
        ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();
        assert_eq!(ledger.cancel(), SettleOutcome::Cancelled);
        assert_eq!(ledger.view().received, Money::ZERO);
    }

    #[test]
    fn void_goes_through_the_same_cycle() {
        let policy = LedgerPolicy::default();
        let mut ledger = LedgerState::new(invoice_with_total(100_000));
        ledger.begin_payment(&cash(40_000), &policy, t0()).unwrap();
        let paid = ledger.view().clone();
        ledger.settle_with(paid);

        let payment_id = ledger.view().payments[0].id.clone();
        let payload = ledger
            .begin_void(&payment_id, " customer dispute ", Some("auditor"), &policy, t0())
            .unwrap();
        assert_eq!(payload.reason, "customer dispute");
        assert_eq!(payload.voided_by.as_deref(), Some("auditor"));
        assert_eq!(ledger.view().received, Money::ZERO);
        assert_eq!(ledger.pending().map(|p| p.kind), Some(ChangeKind::Void));
    }
}
