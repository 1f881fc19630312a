//! Which row actions an invoice offers, and why.
//!
//! [`resolve_actions`] is pure and deterministic given the invoice, the
//! capability oracle and the [`ActionContext`] (which pins "now").

use chrono::{DateTime, Utc};
use serde::Serialize;

use tradedesk_auth::{Capability, CapabilityOracle};

use crate::model::{Invoice, InvoiceStatus, PaymentStatus};
use crate::policy::LedgerPolicy;
use crate::reminder::{ReminderType, reminder_info};

#[derive(Debug, Clone, Copy)]
pub struct ActionContext {
    pub now: DateTime<Utc>,
    pub policy: LedgerPolicy,
}

impl ActionContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            policy: LedgerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub enabled: bool,
    pub tooltip: String,
}

impl ActionState {
    fn on(tooltip: impl Into<String>) -> Self {
        Self {
            enabled: true,
            tooltip: tooltip.into(),
        }
    }

    fn off(tooltip: impl Into<String>) -> Self {
        Self {
            enabled: false,
            tooltip: tooltip.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAction {
    #[serde(flatten)]
    pub state: ActionState,
    /// Issued invoice past (or without) its grace window.
    pub locked: bool,
    pub grace_remaining_hours: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAction {
    #[serde(flatten)]
    pub state: ActionState,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentAction {
    #[serde(flatten)]
    pub state: ActionState,
    pub is_paid: bool,
    pub can_add_payment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderAction {
    #[serde(flatten)]
    pub state: ActionState,
    pub reminder_type: Option<ReminderType>,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryNoteAction {
    #[serde(flatten)]
    pub state: ActionState,
    pub has_notes: bool,
}

/// Every row action keyed the way the list view consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceActions {
    pub view: ActionState,
    pub download: DownloadAction,
    #[serde(rename = "editOrLock")]
    pub edit: EditAction,
    pub credit_note: ActionState,
    pub record_payment: RecordPaymentAction,
    pub commission: ActionState,
    pub reminder: ReminderAction,
    pub phone: ActionState,
    pub statement: ActionState,
    pub delivery_note: DeliveryNoteAction,
    pub delete: ActionState,
    pub restore: ActionState,
}

pub fn resolve_actions<C>(invoice: &Invoice, caps: &C, ctx: &ActionContext) -> InvoiceActions
where
    C: CapabilityOracle + ?Sized,
{
    let deleted = invoice.is_deleted();
    let can_read = caps.can(Capability::ReadInvoices);
    let can_read_customers = caps.can(Capability::ReadCustomers);

    let view = if can_read {
        ActionState::on("View Invoice")
    } else {
        ActionState::off("No permission to view invoices")
    };

    let actions = InvoiceActions {
        view,
        download: download_action(invoice, can_read),
        edit: edit_action(invoice, caps, ctx),
        credit_note: credit_note_action(invoice, caps),
        record_payment: record_payment_action(invoice, caps),
        commission: commission_action(invoice),
        reminder: reminder_action(invoice, ctx),
        phone: if deleted {
            ActionState::off("Invoice is deleted")
        } else if !can_read_customers {
            ActionState::off("No permission to view customer")
        } else {
            ActionState::on("Phone Notes")
        },
        statement: if can_read_customers {
            ActionState::on("Customer Statement")
        } else {
            ActionState::off("No permission to view customer statements")
        },
        delivery_note: delivery_note_action(invoice, caps),
        delete: if deleted {
            ActionState::off("Invoice is already deleted")
        } else if !caps.can(Capability::DeleteInvoices) {
            ActionState::off("No permission to delete invoices")
        } else {
            ActionState::on("Delete Invoice")
        },
        restore: if !deleted {
            ActionState::off("Invoice is not deleted")
        } else if !caps.can(Capability::UpdateInvoices) {
            ActionState::off("No permission to restore invoices")
        } else {
            ActionState::on("Restore Invoice")
        },
    };

    debug_check(invoice, &actions, ctx);
    actions
}

fn edit_action<C>(invoice: &Invoice, caps: &C, ctx: &ActionContext) -> EditAction
where
    C: CapabilityOracle + ?Sized,
{
    let unlocked = |state| EditAction {
        state,
        locked: false,
        grace_remaining_hours: None,
    };

    if invoice.is_deleted() {
        return unlocked(ActionState::off("Cannot edit a deleted invoice"));
    }
    if !caps.can(Capability::UpdateInvoices) {
        return unlocked(ActionState::off("No permission to edit invoices"));
    }

    match invoice.status {
        InvoiceStatus::Draft | InvoiceStatus::Proforma => unlocked(ActionState::on("Edit Invoice")),
        InvoiceStatus::Cancelled | InvoiceStatus::Void => unlocked(ActionState::off(format!(
            "Cannot edit a {} invoice",
            invoice.status.as_str()
        ))),
        InvoiceStatus::Issued | InvoiceStatus::Sent => match grace_remaining(invoice, ctx) {
            Some(remaining_hours) => EditAction {
                state: ActionState::on(format!(
                    "Edit Invoice ({remaining_hours}h left in grace period)"
                )),
                locked: false,
                grace_remaining_hours: Some(remaining_hours),
            },
            None => EditAction {
                state: ActionState::off("Invoice locked (grace period expired)"),
                locked: true,
                grace_remaining_hours: None,
            },
        },
    }
}

/// Whole hours (rounded up) left in the edit window, `None` once it has closed.
fn grace_remaining(invoice: &Invoice, ctx: &ActionContext) -> Option<i64> {
    let issued_at = invoice.issued_at?;
    let elapsed = ctx.now - issued_at;
    if elapsed >= ctx.policy.edit_window {
        return None;
    }
    let left = ctx.policy.edit_window - elapsed.max(chrono::TimeDelta::zero());
    let minutes = left.num_minutes();
    Some((minutes + 59) / 60)
}

fn credit_note_action<C>(invoice: &Invoice, caps: &C) -> ActionState
where
    C: CapabilityOracle + ?Sized,
{
    if invoice.is_deleted() {
        ActionState::off("Cannot create a credit note for a deleted invoice")
    } else if !invoice.status.is_issued_like() {
        ActionState::off("Credit notes require an issued invoice")
    } else if !caps.can(Capability::CreateCreditNotes) {
        ActionState::off("No permission to create credit notes")
    } else {
        ActionState::on("Create Credit Note")
    }
}

fn record_payment_action<C>(invoice: &Invoice, caps: &C) -> RecordPaymentAction
where
    C: CapabilityOracle + ?Sized,
{
    let is_paid = invoice.payment_status == PaymentStatus::Paid;
    if invoice.is_deleted() {
        return RecordPaymentAction {
            state: ActionState::off("Cannot record payments on a deleted invoice"),
            is_paid,
            can_add_payment: false,
        };
    }

    let can_add_payment =
        !is_paid && !invoice.status.is_closed() && caps.can(Capability::RecordPayments);
    let tooltip = if is_paid {
        "View Payment History"
    } else if can_add_payment {
        "Record Payment"
    } else {
        "View Payments"
    };
    RecordPaymentAction {
        state: ActionState::on(tooltip),
        is_paid,
        can_add_payment,
    }
}

fn commission_action(invoice: &Invoice) -> ActionState {
    if invoice.is_deleted() {
        ActionState::off("Invoice is deleted")
    } else if !invoice.has_sales_agent() {
        ActionState::off("No sales agent assigned")
    } else if invoice.payment_status != PaymentStatus::Paid {
        ActionState::off("Commission is available once the invoice is fully paid")
    } else {
        ActionState::on("Calculate Commission")
    }
}

fn reminder_action(invoice: &Invoice, ctx: &ActionContext) -> ReminderAction {
    let off = |tooltip: &str| ReminderAction {
        state: ActionState::off(tooltip),
        reminder_type: None,
        is_overdue: false,
    };

    if invoice.is_deleted() {
        return off("Invoice is deleted");
    }
    if !invoice.status.is_issued_like() {
        return off("Reminders are only sent for issued invoices");
    }
    if !matches!(
        invoice.payment_status,
        PaymentStatus::Unpaid | PaymentStatus::PartiallyPaid
    ) {
        return off("No reminder needed");
    }

    match reminder_info(invoice, ctx.now, &ctx.policy) {
        Some(info) => ReminderAction {
            state: ActionState::on(format!(
                "Send Reminder: {} ({})",
                info.reminder_type.label(),
                info.message()
            )),
            reminder_type: Some(info.reminder_type),
            is_overdue: info.is_overdue,
        },
        None => off("No reminder needed"),
    }
}

fn delivery_note_action<C>(invoice: &Invoice, caps: &C) -> DeliveryNoteAction
where
    C: CapabilityOracle + ?Sized,
{
    let has_notes = invoice.delivery_status.has_notes;
    let state = if !invoice.status.is_issued_like() {
        ActionState::off("Delivery notes require an issued invoice")
    } else if !(caps.can(Capability::ReadDeliveryNotes) || caps.can(Capability::CreateDeliveryNotes)) {
        ActionState::off("No permission for delivery notes")
    } else if has_notes {
        ActionState::on("View Delivery Notes")
    } else {
        ActionState::on("Create Delivery Note")
    };
    DeliveryNoteAction { state, has_notes }
}

fn download_action(invoice: &Invoice, can_read: bool) -> DownloadAction {
    let readiness = download_readiness(invoice);
    let state = if !can_read {
        ActionState::off("No permission to download invoices")
    } else if readiness.complete {
        ActionState::on("Download PDF")
    } else {
        ActionState::on(format!("Download PDF (incomplete: missing {})", readiness.missing.join(", ")))
    };
    DownloadAction {
        state,
        missing: readiness.missing,
    }
}

/// Whether the invoice carries enough data for a printable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub complete: bool,
    pub missing: Vec<&'static str>,
}

pub fn download_readiness(invoice: &Invoice) -> Readiness {
    let mut missing = Vec::new();
    if invoice.customer.is_unknown() || invoice.customer.name.trim().is_empty() {
        missing.push("customer name");
    }
    let has_valid_item = invoice
        .items
        .iter()
        .any(|i| !i.name.trim().is_empty() && i.quantity > 0.0 && i.rate.is_positive());
    if !has_valid_item {
        missing.push("line items");
    }
    if invoice.due_date.is_none() {
        missing.push("due date");
    }
    Readiness {
        complete: missing.is_empty(),
        missing,
    }
}

/// Rules the resolver must never break. Empty for a consistent result.
pub fn invariant_violations(invoice: &Invoice, actions: &InvoiceActions, ctx: &ActionContext) -> Vec<String> {
    let deleted = invoice.is_deleted();
    let issued = invoice.status.is_issued_like();
    let mut out = Vec::new();
    let mut check = |broken: bool, what: &str| {
        if broken {
            out.push(what.to_string());
        }
    };

    check(deleted && actions.edit.state.enabled, "edit enabled on a deleted invoice");
    check(
        issued && actions.edit.state.enabled && grace_remaining(invoice, ctx).is_none(),
        "edit enabled on an issued invoice outside its grace window",
    );
    check(
        actions.credit_note.enabled && (deleted || !issued),
        "credit note enabled on a deleted or non-issued invoice",
    );
    check(
        actions.commission.enabled
            && (deleted || !invoice.has_sales_agent() || invoice.payment_status != PaymentStatus::Paid),
        "commission enabled without a paid, agent-attached, live invoice",
    );
    check(
        actions.reminder.state.enabled
            && (!issued
                || !matches!(invoice.payment_status, PaymentStatus::Unpaid | PaymentStatus::PartiallyPaid)),
        "reminder enabled on an invoice that expects no payment",
    );
    check(actions.delivery_note.state.enabled && !issued, "delivery note enabled on a non-issued invoice");
    check(actions.delete.enabled && deleted, "delete enabled on a deleted invoice");
    check(actions.restore.enabled && !deleted, "restore enabled on a live invoice");
    check(actions.record_payment.state.enabled && deleted, "payments enabled on a deleted invoice");
    out
}

#[cfg(debug_assertions)]
fn debug_check(invoice: &Invoice, actions: &InvoiceActions, ctx: &ActionContext) {
    if !ctx.policy.guard_mode.is_enabled() {
        return;
    }
    for violation in invariant_violations(invoice, actions, ctx) {
        tracing::error!(
            invoice_id = %invoice.id,
            status = invoice.status.as_str(),
            payment_status = ?invoice.payment_status,
            deleted = invoice.is_deleted(),
            violation = %violation,
            "action eligibility invariant violated"
        );
    }
}

#[cfg(not(debug_assertions))]
#[inline(always)]
fn debug_check(_invoice: &Invoice, _actions: &InvoiceActions, _ctx: &ActionContext) {}
