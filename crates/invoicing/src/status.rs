//! The one place payment status and balances are derived.

use tradedesk_core::{CurrencyPrecision, Money};

use crate::model::{Invoice, PaymentStatus};

/// Canonical payment-status rule.
///
/// * a non-positive total is `Unpaid` (nothing to collect yet)
/// * an outstanding balance within `precision.tolerance` is `Paid`
/// * `0 < outstanding < total` is `PartiallyPaid`
/// * otherwise `Overdue` is preserved and everything else is `Unpaid`
pub fn derive_payment_status(
    total: Money,
    outstanding: Money,
    current: PaymentStatus,
    precision: &CurrencyPrecision,
) -> PaymentStatus {
    if !total.is_positive() {
        return PaymentStatus::Unpaid;
    }
    if precision.is_settled(outstanding) {
        return PaymentStatus::Paid;
    }
    if outstanding < total {
        return PaymentStatus::PartiallyPaid;
    }
    match current {
        PaymentStatus::Overdue => PaymentStatus::Overdue,
        _ => PaymentStatus::Unpaid,
    }
}

/// Recompute `received`, `outstanding` and `paymentStatus` from the payment
/// sequence (voided entries excluded).
pub fn recompute_balances(invoice: &mut Invoice, precision: &CurrencyPrecision) {
    let received = precision.round(invoice.sum_received());
    let outstanding = precision.round(invoice.total.saturating_sub(received).clamp_non_negative());

    invoice.received = received;
    invoice.outstanding = outstanding;
    invoice.payment_status =
        derive_payment_status(invoice.total, outstanding, invoice.payment_status, precision);
}
