//! Invoice payment ledger: normalization, reconciliation and action eligibility.
//!
//! This crate is pure domain logic (no IO, no HTTP, no storage). Raw server
//! payloads come in as `serde_json::Value`, leave as canonical [`Invoice`]s,
//! and every state transition is a function of its inputs plus an explicit
//! `now`.

pub mod actions;
pub mod guard;
pub mod ledger;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod policy;
pub mod reconcile;
pub mod reminder;
pub mod status;

pub use actions::{
    ActionContext, ActionState, InvoiceActions, Readiness, download_readiness,
    invariant_violations, resolve_actions,
};
pub use guard::{
    FieldDiagnostic, FieldGuard, GuardError, Guarded, KeySchema, KeyVerdict, classify_key, guard,
    guard_invoice, guard_invoices, snake_to_camel,
};
pub use ledger::{ChangeKind, LedgerState, PendingChange, SettleOutcome};
pub use model::{
    Customer, DeliveryStatus, Invoice, InvoiceStatus, LineItem, PaymentMethod, PaymentRecord,
    PaymentStatus,
};
pub use normalize::{
    InvoicePage, Pagination, normalize_customer, normalize_delivery_status, normalize_invoice,
    normalize_invoice_at, normalize_invoice_page, normalize_invoice_page_at, normalize_invoices,
    normalize_invoices_at, normalize_line_item, normalize_payment, to_canonical_json,
};
pub use parse::{Warnings, parse_date, parse_money, parse_number, parse_optional_date, to_iso_string};
pub use policy::{GuardMode, LedgerPolicy};
pub use reconcile::{
    PaymentApplied, PaymentError, PaymentInput, PaymentPayload, VoidPayload, apply_payment,
    commission_due, void_payment,
};
pub use reminder::{ReminderInfo, ReminderType, days_until_due, reminder_info};
pub use status::{derive_payment_status, recompute_balances};
