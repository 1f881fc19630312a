//! Optimistic payment and void reconciliation.
//!
//! Both operations are pure: they validate, then return the next invoice state
//! the UI shows while the server call is in flight. Nothing is mutated when
//! validation fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradedesk_core::{DomainError, Money, RecordId};

use crate::model::{Invoice, PaymentMethod, PaymentRecord, PaymentStatus};
use crate::parse::to_iso_string;
use crate::policy::LedgerPolicy;
use crate::status::{derive_payment_status, recompute_balances};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment amount must be greater than zero (got {amount})")]
    AmountNotPositive { amount: Money },

    #[error("payment amount {amount} exceeds the outstanding balance {outstanding}")]
    ExceedsOutstanding { amount: Money, outstanding: Money },

    #[error("{} payments require a reference number", .method.label())]
    ReferenceRequired { method: PaymentMethod },

    #[error("invoice {invoice_id} does not accept payments ({reason})")]
    InvoiceNotPayable {
        invoice_id: RecordId,
        reason: &'static str,
    },

    #[error("payment {0} not found on invoice")]
    PaymentNotFound(RecordId),

    #[error("payment {0} is already voided")]
    AlreadyVoided(RecordId),

    #[error("a reason is required to void a payment")]
    MissingVoidReason,

    #[error("a payment operation is already in flight for invoice {0}")]
    InFlight(RecordId),
}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::PaymentNotFound(_) => DomainError::not_found(err.to_string()),
            PaymentError::AlreadyVoided(_) | PaymentError::InFlight(_) => {
                DomainError::conflict(err.to_string())
            }
            _ => DomainError::validation(err.to_string()),
        }
    }
}

/// What the user entered in the record-payment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub amount: Money,
    /// Defaults to the time the payment is applied.
    pub payment_date: Option<DateTime<Utc>>,
    pub method: PaymentMethod,
    pub reference_no: Option<String>,
    pub notes: Option<String>,
}

impl PaymentInput {
    pub fn new(amount: Money, method: PaymentMethod) -> Self {
        Self {
            amount,
            payment_date: None,
            method,
            reference_no: None,
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference_no: impl Into<String>) -> Self {
        self.reference_no = Some(reference_no.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn on(mut self, payment_date: DateTime<Utc>) -> Self {
        self.payment_date = Some(payment_date);
        self
    }
}

/// Body of the add-payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub invoice_id: RecordId,
    pub amount: Money,
    pub payment_date: String,
    pub method: PaymentMethod,
    pub reference_no: Option<String>,
    pub notes: Option<String>,
}

/// Body of the void-payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidPayload {
    pub invoice_id: RecordId,
    pub payment_id: RecordId,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voided_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentApplied {
    pub optimistic: Invoice,
    pub payload: PaymentPayload,
    /// Temporary id of the appended record (replaced by the server's id on settle).
    pub payment_id: RecordId,
}

/// Append a payment and recompute the balance optimistically.
pub fn apply_payment(
    invoice: &Invoice,
    input: &PaymentInput,
    policy: &LedgerPolicy,
    now: DateTime<Utc>,
) -> Result<PaymentApplied, PaymentError> {
    ensure_payable(invoice)?;

    let precision = &policy.precision;
    let amount = precision.round(input.amount);
    if !amount.is_positive() {
        return Err(PaymentError::AmountNotPositive { amount });
    }
    if amount > invoice.outstanding {
        return Err(PaymentError::ExceedsOutstanding {
            amount,
            outstanding: invoice.outstanding,
        });
    }

    let reference_no = non_blank(input.reference_no.as_deref());
    if input.method.requires_reference() && reference_no.is_none() {
        return Err(PaymentError::ReferenceRequired {
            method: input.method,
        });
    }

    let payment_date = input.payment_date.unwrap_or(now);
    let record = PaymentRecord {
        id: RecordId::temporary(),
        amount,
        payment_date,
        method: input.method,
        reference_no: reference_no.clone(),
        notes: non_blank(input.notes.as_deref()),
        voided: false,
        voided_at: None,
        void_reason: None,
        voided_by: None,
    };
    let payment_id = record.id.clone();

    let mut optimistic = invoice.clone();
    optimistic.payments.push(record);
    optimistic.received = precision.round(invoice.received + amount);
    optimistic.outstanding = precision.round((invoice.outstanding - amount).clamp_non_negative());
    optimistic.payment_status = derive_payment_status(
        optimistic.total,
        optimistic.outstanding,
        optimistic.payment_status,
        precision,
    );

    tracing::debug!(
        invoice_id = %invoice.id,
        %amount,
        outstanding = %optimistic.outstanding,
        payment_status = ?optimistic.payment_status,
        "payment applied optimistically"
    );

    Ok(PaymentApplied {
        payload: PaymentPayload {
            invoice_id: invoice.id.clone(),
            amount,
            payment_date: to_iso_string(payment_date),
            method: input.method,
            reference_no,
            notes: non_blank(input.notes.as_deref()),
        },
        optimistic,
        payment_id,
    })
}

/// Flag a payment as voided and recompute balances from the non-voided entries.
///
/// Only void metadata is written; amount, method, date and notes are untouched.
pub fn void_payment(
    invoice: &Invoice,
    payment_id: &RecordId,
    reason: &str,
    voided_by: Option<&str>,
    policy: &LedgerPolicy,
    now: DateTime<Utc>,
) -> Result<Invoice, PaymentError> {
    let idx = invoice
        .payments
        .iter()
        .position(|p| &p.id == payment_id)
        .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.clone()))?;

    if invoice.payments[idx].voided {
        return Err(PaymentError::AlreadyVoided(payment_id.clone()));
    }
    let reason = non_blank(Some(reason)).ok_or(PaymentError::MissingVoidReason)?;

    let mut next = invoice.clone();
    let entry = &mut next.payments[idx];
    entry.voided = true;
    entry.voided_at = Some(now);
    entry.void_reason = Some(reason);
    entry.voided_by = non_blank(voided_by);

    recompute_balances(&mut next, &policy.precision);

    tracing::debug!(
        invoice_id = %invoice.id,
        %payment_id,
        outstanding = %next.outstanding,
        payment_status = ?next.payment_status,
        "payment voided optimistically"
    );
    Ok(next)
}

impl VoidPayload {
    pub fn new(invoice_id: RecordId, payment_id: RecordId, reason: &str) -> Self {
        Self {
            invoice_id,
            payment_id,
            reason: reason.trim().to_string(),
            voided_by: None,
        }
    }

    /// Record who voided the payment; blank actors are dropped.
    pub fn by(mut self, voided_by: Option<&str>) -> Self {
        self.voided_by = non_blank(voided_by);
        self
    }
}

/// A fully paid invoice with a sales agent triggers commission calculation.
pub fn commission_due(invoice: &Invoice) -> bool {
    invoice.payment_status == PaymentStatus::Paid && invoice.has_sales_agent() && !invoice.is_deleted()
}

fn ensure_payable(invoice: &Invoice) -> Result<(), PaymentError> {
    let reason = if invoice.is_deleted() {
        "deleted"
    } else if invoice.status.is_closed() {
        invoice.status.as_str()
    } else {
        return Ok(());
    };
    Err(PaymentError::InvoiceNotPayable {
        invoice_id: invoice.id.clone(),
        reason,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
