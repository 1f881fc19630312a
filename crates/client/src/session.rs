//! One open invoice: optimistic payment/void flow against a backend.
//!
//! The ledger shows the optimistic patch while the request is in flight, then
//! adopts the server's recomputed invoice. Failures roll back by refetching.
//! A cancelled request is dropped without reporting anything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use tradedesk_auth::CapabilityOracle;
use tradedesk_core::RecordId;
use tradedesk_invoicing::{
    ActionContext, FieldGuard, Invoice, InvoiceActions, LedgerPolicy, LedgerState, PaymentError,
    PaymentInput, SettleOutcome, commission_due, normalize_invoice_at, resolve_actions,
};

use crate::backend::{BackendError, InvoiceBackend};

const SOURCE: &str = "invoice_session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("server returned an invoice that could not be normalized")]
    Unusable,
}

/// Side effects worth telling the user about that do not change the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    CommissionCalculated,
    CommissionFailed(String),
    /// The server's balance differs from what was shown optimistically.
    BalanceAdjusted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcome {
    pub settle: SettleOutcome,
    pub notices: Vec<Notice>,
}

pub struct InvoiceSession<B> {
    backend: Arc<B>,
    ledger: LedgerState,
    policy: LedgerPolicy,
    guard: FieldGuard,
}

impl<B: InvoiceBackend> InvoiceSession<B> {
    /// Fetch and normalize `invoice_id`.
    pub async fn open(
        backend: Arc<B>,
        invoice_id: &RecordId,
        policy: LedgerPolicy,
    ) -> Result<Self, SessionError> {
        let raw = backend.fetch_invoice(invoice_id).await?;
        let invoice = adopt(&raw, Utc::now())?;
        let session = Self {
            backend,
            ledger: LedgerState::new(invoice),
            policy,
            guard: FieldGuard::new(policy.guard_mode),
        };
        session.guard.audit_invoice(session.ledger.view());
        Ok(session)
    }

    pub fn view(&self) -> &Invoice {
        self.ledger.view()
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Actions for the visible invoice. Payment actions are disabled while a
    /// change is in flight so the same payment cannot be submitted twice.
    pub fn actions<C>(&self, caps: &C, now: DateTime<Utc>) -> InvoiceActions
    where
        C: CapabilityOracle + ?Sized,
    {
        let ctx = ActionContext::new(now).with_policy(self.policy);
        let mut actions = resolve_actions(self.view(), caps, &ctx);
        if self.ledger.is_in_flight() {
            actions.record_payment.state.enabled = false;
            actions.record_payment.can_add_payment = false;
            actions.record_payment.state.tooltip = "Payment in progress".to_string();
        }
        actions
    }

    pub async fn record_payment(
        &mut self,
        input: &PaymentInput,
        now: DateTime<Utc>,
    ) -> Result<ChangeOutcome, SessionError> {
        let payload = self.ledger.begin_payment(input, &self.policy, now)?;
        let result = {
            let pending = PendingGuard::new(&mut self.ledger);
            let result = self.backend.add_payment(&payload).await;
            pending.release();
            result
        };
        let mut outcome = self.complete(result, now).await?;

        if matches!(outcome.settle, SettleOutcome::Settled { .. }) && commission_due(self.view()) {
            let invoice_id = self.view().id.clone();
            match self.backend.calculate_commission(&invoice_id).await {
                Ok(_) => {
                    tracing::info!(invoice_id = %invoice_id, "commission calculated");
                    outcome.notices.push(Notice::CommissionCalculated);
                }
                Err(err) => {
                    tracing::warn!(invoice_id = %invoice_id, error = %err, "commission calculation failed");
                    outcome.notices.push(Notice::CommissionFailed(err.to_string()));
                }
            }
        }
        Ok(outcome)
    }

    pub async fn void_payment(
        &mut self,
        payment_id: &RecordId,
        reason: &str,
        voided_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ChangeOutcome, SessionError> {
        let payload = self
            .ledger
            .begin_void(payment_id, reason, voided_by, &self.policy, now)?;
        let result = {
            let pending = PendingGuard::new(&mut self.ledger);
            let result = self.backend.void_payment(&payload).await;
            pending.release();
            result
        };
        self.complete(result, now).await
    }

    /// Refetch the authoritative invoice. Any pending patch stays on top.
    pub async fn refresh(&mut self) -> Result<(), SessionError> {
        let raw = self.backend.fetch_invoice(&self.ledger.snapshot().id).await?;
        let invoice = adopt(&raw, Utc::now())?;
        self.guard.audit_invoice(&invoice);
        self.ledger.replace_snapshot(invoice);
        Ok(())
    }

    async fn complete(
        &mut self,
        result: Result<Value, BackendError>,
        now: DateTime<Utc>,
    ) -> Result<ChangeOutcome, SessionError> {
        match result {
            Ok(raw) => {
                let settle = match extract_invoice(&raw) {
                    Some(invoice) => match normalize_invoice_at(invoice, SOURCE, now) {
                        Some(invoice) => self.ledger.settle_with(invoice),
                        None => self.ledger.abandon(),
                    },
                    None => self.ledger.abandon(),
                };
                let mut notices = Vec::new();
                match settle {
                    SettleOutcome::Settled { drifted } => {
                        self.guard.audit_invoice(self.ledger.view());
                        if drifted {
                            notices.push(Notice::BalanceAdjusted);
                        }
                    }
                    SettleOutcome::RefetchRequired => self.refresh().await?,
                    SettleOutcome::Cancelled => {}
                }
                Ok(ChangeOutcome { settle, notices })
            }
            Err(BackendError::Cancelled) => {
                let settle = self.ledger.cancel();
                if let Err(err) = self.refresh().await {
                    tracing::debug!(error = %err, "refetch after cancelled request failed");
                }
                Ok(ChangeOutcome {
                    settle,
                    notices: Vec::new(),
                })
            }
            Err(err) => {
                self.ledger.abandon();
                if let Err(refetch) = self.refresh().await {
                    tracing::warn!(error = %refetch, "refetch after failed request also failed");
                }
                Err(err.into())
            }
        }
    }
}

/// Drops the optimistic patch if the request future is dropped before the
/// backend answers (timeout, `select!`), so the session never stays in flight.
struct PendingGuard<'a> {
    ledger: &'a mut LedgerState,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(ledger: &'a mut LedgerState) -> Self {
        Self { ledger, armed: true }
    }

    fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(
                invoice_id = %self.ledger.snapshot().id,
                "request dropped before completion, discarding optimistic change"
            );
            self.ledger.cancel();
        }
    }
}

/// Responses come back bare or wrapped as `{invoice: ..}` / `{data: ..}`.
fn extract_invoice(raw: &Value) -> Option<&Value> {
    let obj = raw.as_object()?;
    for key in ["invoice", "data"] {
        if let Some(inner) = obj.get(key).filter(|v| v.is_object()) {
            return Some(inner);
        }
    }
    Some(raw)
}

fn adopt(raw: &Value, now: DateTime<Utc>) -> Result<Invoice, SessionError> {
    extract_invoice(raw)
        .and_then(|v| normalize_invoice_at(v, SOURCE, now))
        .ok_or(SessionError::Unusable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use serde_json::json;
    use std::time::Duration;
    use tradedesk_auth::CapabilitySet;
    use tradedesk_core::Money;
    use tradedesk_invoicing::{GuardMode, PaymentMethod, PaymentStatus};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn seeded(agent: Option<&str>) -> Arc<InMemoryBackend> {
        let invoice = normalize_invoice_at(
            &json!({
                "id": "inv-7",
                "invoiceNumber": "INV-007",
                "status": "issued",
                "customer": {"id": "c-1", "name": "Acme Trading"},
                "total": "500.00",
                "invoiceDate": "2025-05-01",
                "dueDate": "2025-05-31",
                "salesAgentId": agent,
                "payments": [],
            }),
            "test",
            now(),
        )
        .unwrap();
        Arc::new(InMemoryBackend::with_invoices([invoice]))
    }

    fn policy() -> LedgerPolicy {
        LedgerPolicy::default().with_guard_mode(GuardMode::Development)
    }

    async fn open(backend: &Arc<InMemoryBackend>) -> InvoiceSession<InMemoryBackend> {
        InvoiceSession::open(Arc::clone(backend), &RecordId::from("inv-7"), policy())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn partial_payment_adopts_server_ids_and_balances() {
        let backend = seeded(None);
        let mut session = open(&backend).await;

        let input = PaymentInput::new(Money::from_minor(20_000), PaymentMethod::Cash);
        let outcome = session.record_payment(&input, now()).await.unwrap();

        assert_eq!(outcome.settle, SettleOutcome::Settled { drifted: false });
        let view = session.view();
        assert_eq!(view.received, Money::from_minor(20_000));
        assert_eq!(view.outstanding, Money::from_minor(30_000));
        assert_eq!(view.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(view.payments[0].id, RecordId::from("srv-1"));
        assert!(!session.ledger().is_in_flight());
    }

    #[tokio::test]
    async fn full_payment_with_agent_triggers_commission() {
        let backend = seeded(Some("agent-9"));
        let mut session = open(&backend).await;

        let input = PaymentInput::new(Money::from_minor(50_000), PaymentMethod::Cash);
        let outcome = session.record_payment(&input, now()).await.unwrap();

        assert_eq!(session.view().payment_status, PaymentStatus::Paid);
        assert_eq!(outcome.notices, vec![Notice::CommissionCalculated]);
        assert_eq!(backend.commission_calls(), vec![RecordId::from("inv-7")]);
    }

    #[tokio::test]
    async fn commission_failure_keeps_the_payment() {
        let backend = seeded(Some("agent-9"));
        backend.fail_commission(Some(BackendError::Api {
            status: 500,
            body: "boom".into(),
        }));
        let mut session = open(&backend).await;

        let input = PaymentInput::new(Money::from_minor(50_000), PaymentMethod::Cash);
        let outcome = session.record_payment(&input, now()).await.unwrap();

        assert!(matches!(outcome.notices[..], [Notice::CommissionFailed(_)]));
        assert_eq!(session.view().payment_status, PaymentStatus::Paid);
        assert_eq!(session.view().payments.len(), 1);
    }

    #[tokio::test]
    async fn no_commission_without_agent() {
        let backend = seeded(None);
        let mut session = open(&backend).await;
        let input = PaymentInput::new(Money::from_minor(50_000), PaymentMethod::Cash);
        session.record_payment(&input, now()).await.unwrap();
        assert!(backend.commission_calls().is_empty());
    }

    #[tokio::test]
    async fn network_failure_rolls_back_to_server_state() {
        let backend = seeded(None);
        let mut session = open(&backend).await;
        backend.fail_next_payment(BackendError::Network("connection reset".into()));

        let input = PaymentInput::new(Money::from_minor(10_000), PaymentMethod::Cash);
        let err = session.record_payment(&input, now()).await.unwrap_err();

        assert!(matches!(err, SessionError::Backend(BackendError::Network(_))));
        assert!(!session.ledger().is_in_flight());
        assert!(session.view().payments.is_empty());
        assert_eq!(session.view().outstanding, Money::from_minor(50_000));
    }

    #[tokio::test]
    async fn cancelled_request_is_quiet() {
        let backend = seeded(None);
        let mut session = open(&backend).await;
        backend.fail_next_payment(BackendError::Cancelled);

        let input = PaymentInput::new(Money::from_minor(10_000), PaymentMethod::Cash);
        let outcome = session.record_payment(&input, now()).await.unwrap();

        assert_eq!(outcome.settle, SettleOutcome::Cancelled);
        assert!(outcome.notices.is_empty());
        assert!(session.view().payments.is_empty());
    }

    #[tokio::test]
    async fn validation_errors_never_reach_the_backend() {
        let backend = seeded(None);
        let mut session = open(&backend).await;

        let input = PaymentInput::new(Money::from_minor(60_000), PaymentMethod::Cash);
        let err = session.record_payment(&input, now()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Payment(PaymentError::ExceedsOutstanding { .. })
        ));

        let cheque = PaymentInput::new(Money::from_minor(1_000), PaymentMethod::Cheque);
        let err = session.record_payment(&cheque, now()).await.unwrap_err();
        assert!(matches!(err, SessionError::Payment(PaymentError::ReferenceRequired { .. })));
        assert!(backend.invoice(&RecordId::from("inv-7")).unwrap().payments.is_empty());
    }

    #[tokio::test]
    async fn void_restores_outstanding() {
        let backend = seeded(None);
        let mut session = open(&backend).await;
        let input = PaymentInput::new(Money::from_minor(50_000), PaymentMethod::Cash);
        session.record_payment(&input, now()).await.unwrap();
        let payment_id = session.view().payments[0].id.clone();

        let outcome = session
            .void_payment(&payment_id, "entered twice", Some("clerk"), now())
            .await
            .unwrap();

        assert!(matches!(outcome.settle, SettleOutcome::Settled { .. }));
        let view = session.view();
        assert_eq!(view.payments.len(), 1);
        assert!(view.payments[0].voided);
        assert_eq!(view.payments[0].voided_by.as_deref(), Some("clerk"));
        assert_eq!(view.outstanding, Money::from_minor(50_000));
        assert_eq!(view.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn concurrent_payment_elsewhere_is_reported_as_drift() {
        let backend = seeded(None);
        let mut session = open(&backend).await;

        // Another session pays 100.00 first.
        let other = PaymentInput::new(Money::from_minor(10_000), PaymentMethod::Cash);
        let mut elsewhere = open(&backend).await;
        elsewhere.record_payment(&other, now()).await.unwrap();

        let input = PaymentInput::new(Money::from_minor(20_000), PaymentMethod::Cash);
        let outcome = session.record_payment(&input, now()).await.unwrap();

        assert_eq!(outcome.settle, SettleOutcome::Settled { drifted: true });
        assert_eq!(outcome.notices, vec![Notice::BalanceAdjusted]);
        assert_eq!(session.view().received, Money::from_minor(30_000));
    }

    #[tokio::test]
    async fn actions_reflect_the_settled_invoice() {
        let backend = seeded(None);
        let mut session = open(&backend).await;
        let caps = CapabilitySet::all();

        assert!(session.actions(&caps, now()).record_payment.can_add_payment);

        let input = PaymentInput::new(Money::from_minor(50_000), PaymentMethod::Cash);
        session.record_payment(&input, now()).await.unwrap();
        let actions = session.actions(&caps, now());
        assert!(actions.record_payment.is_paid);
        assert!(!actions.record_payment.can_add_payment);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_request_leaves_the_session_usable() {
        let backend = seeded(None);
        let mut session = open(&backend).await;
        backend.set_payment_latency(Some(Duration::from_secs(5)));

        let input = PaymentInput::new(Money::from_minor(10_000), PaymentMethod::Cash);
        let timed_out =
            tokio::time::timeout(Duration::from_secs(1), session.record_payment(&input, now())).await;
        assert!(timed_out.is_err());
        assert!(!session.ledger().is_in_flight());
        assert!(session.view().payments.is_empty());

        session.refresh().await.unwrap();
        assert_eq!(session.view().received, Money::ZERO);

        backend.set_payment_latency(None);
        let outcome = session.record_payment(&input, now()).await.unwrap();
        assert!(matches!(outcome.settle, SettleOutcome::Settled { .. }));
        assert_eq!(session.view().received, Money::from_minor(10_000));
    }

    #[test]
    fn envelopes_are_unwrapped() {
        let bare = json!({"id": "1"});
        let wrapped = json!({"invoice": {"id": "2"}});
        let data = json!({"data": {"id": "3"}});
        assert_eq!(extract_invoice(&bare).unwrap()["id"], "1");
        assert_eq!(extract_invoice(&wrapped).unwrap()["id"], "2");
        assert_eq!(extract_invoice(&data).unwrap()["id"], "3");
        assert!(extract_invoice(&json!([1, 2])).is_none());
    }
}
