//! Wire payload → canonical [`Invoice`] mapping.
//!
//! The backend is tolerated defensively: keys may be camelCase or snake_case,
//! sub-objects may be missing or malformed, and numbers may arrive as text.
//! A record that is not a JSON object is dropped (`None`); anything else
//! yields a best-effort entity plus warnings, logged once per call.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tradedesk_core::{CurrencyPrecision, Money, RecordId};

use crate::model::{
    Customer, DeliveryStatus, Invoice, InvoiceStatus, LineItem, PaymentMethod, PaymentRecord,
    PaymentStatus,
};
use crate::parse::{
    Warnings, parse_date, parse_money_checked, parse_number, parse_optional_date,
};
use crate::status::derive_payment_status;

pub const DEFAULT_CURRENCY: &str = "AED";
pub const DEFAULT_PAGE_SIZE: u32 = 20;

type Object = Map<String, Value>;

/// Normalize one invoice payload at the current time.
pub fn normalize_invoice(raw: &Value, source: &str) -> Option<Invoice> {
    normalize_invoice_at(raw, source, Utc::now())
}

/// Normalize one invoice payload; `now` backs missing required dates.
pub fn normalize_invoice_at(raw: &Value, source: &str, now: DateTime<Utc>) -> Option<Invoice> {
    let Some(obj) = raw.as_object() else {
        tracing::warn!(source, kind = json_kind(raw), "dropping invoice payload that is not an object");
        return None;
    };

    let mut warnings = Warnings::new();
    let invoice = invoice_from_object(obj, now, &mut warnings);
    warnings.log(source, &format!("invoice {}", invoice.id));
    Some(invoice)
}

/// Normalize a batch; malformed records are dropped without affecting the rest.
pub fn normalize_invoices(raws: &[Value], source: &str) -> Vec<Invoice> {
    normalize_invoices_at(raws, source, Utc::now())
}

pub fn normalize_invoices_at(raws: &[Value], source: &str, now: DateTime<Utc>) -> Vec<Invoice> {
    let invoices: Vec<Invoice> = raws
        .iter()
        .filter_map(|raw| normalize_invoice_at(raw, source, now))
        .collect();

    let dropped = raws.len() - invoices.len();
    if dropped > 0 {
        tracing::warn!(source, dropped, kept = invoices.len(), "dropped malformed invoice records");
    }
    invoices
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl Pagination {
    fn for_items(len: usize) -> Self {
        let total_items = len as u64;
        Self {
            current_page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total_items,
            total_pages: page_count(total_items, DEFAULT_PAGE_SIZE),
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePage {
    pub invoices: Vec<Invoice>,
    pub pagination: Pagination,
}

pub fn normalize_invoice_page(raw: &Value, source: &str) -> InvoicePage {
    normalize_invoice_page_at(raw, source, Utc::now())
}

/// Accepts `{invoices, pagination}`, `{data, pageInfo}` or a bare array.
pub fn normalize_invoice_page_at(raw: &Value, source: &str, now: DateTime<Utc>) -> InvoicePage {
    match raw {
        Value::Array(items) => {
            let invoices = normalize_invoices_at(items, source, now);
            let pagination = Pagination::for_items(invoices.len());
            InvoicePage { invoices, pagination }
        }
        Value::Object(obj) => {
            let list = pick(obj, &["invoices", "data", "items", "results"]);
            let invoices = match list {
                Some(Value::Array(items)) => normalize_invoices_at(items, source, now),
                Some(other) => {
                    tracing::warn!(source, kind = json_kind(other), "invoice list is not an array");
                    Vec::new()
                }
                None => Vec::new(),
            };
            let pagination = match pick(obj, &["pagination", "pageInfo", "page_info", "meta"]) {
                Some(Value::Object(p)) => normalize_pagination(p, invoices.len()),
                _ => Pagination::for_items(invoices.len()),
            };
            InvoicePage { invoices, pagination }
        }
        other => {
            tracing::warn!(source, kind = json_kind(other), "list response is neither an array nor an object");
            InvoicePage {
                invoices: Vec::new(),
                pagination: Pagination::for_items(0),
            }
        }
    }
}

fn normalize_pagination(p: &Object, received: usize) -> Pagination {
    let current_page = positive_u32(pick(p, &["currentPage", "current_page", "page"])).unwrap_or(1);
    let page_size = positive_u32(pick(p, &["pageSize", "page_size", "perPage", "per_page", "limit"]))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let total_items = parse_number(
        pick(p, &["totalItems", "total_items", "total", "totalCount", "count"]),
        received as f64,
    )
    .max(0.0) as u64;
    let total_pages = positive_u32(pick(p, &["totalPages", "total_pages", "pages"]))
        .unwrap_or_else(|| page_count(total_items, page_size));

    Pagination {
        current_page,
        page_size,
        total_items,
        total_pages,
    }
}

fn page_count(total_items: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    u32::try_from(total_items.div_ceil(size).max(1)).unwrap_or(u32::MAX)
}

fn invoice_from_object(obj: &Object, now: DateTime<Utc>, w: &mut Warnings) -> Invoice {
    let id = record_id(pick(obj, &["id", "invoiceId", "invoice_id"])).unwrap_or_else(|| {
        w.push("id", "missing invoice id, assigned a temporary one");
        RecordId::temporary()
    });

    let payments: Vec<PaymentRecord> = array(obj, &["payments", "paymentHistory", "payment_history"], "payments", w)
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let p = normalize_payment_at(raw, now, w);
            if p.is_none() {
                w.push(format!("payments[{idx}]"), "payment entry is not an object, skipped");
            }
            p
        })
        .collect();

    let items: Vec<LineItem> = array(obj, &["items", "lineItems", "line_items"], "items", w)
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let item = normalize_line_item(raw, w);
            if item.is_none() {
                w.push(format!("items[{idx}]"), "line item is not an object, skipped");
            }
            item
        })
        .collect();

    let customer = invoice_customer(obj, w);

    let status = match pick(obj, &["status", "invoiceStatus", "invoice_status"]) {
        None => InvoiceStatus::Draft,
        Some(v) => text(Some(v))
            .as_deref()
            .and_then(InvoiceStatus::from_wire)
            .unwrap_or_else(|| {
                w.push("status", format!("unrecognized status {v}, treating as draft"));
                InvoiceStatus::Draft
            }),
    };

    let subtotal = parse_money_checked(pick(obj, &["subtotal", "subTotal", "sub_total"]), Money::ZERO, "subtotal", w);
    let vat_amount = parse_money_checked(
        pick(obj, &["vatAmount", "vat_amount", "taxAmount", "tax_amount"]),
        Money::ZERO,
        "vatAmount",
        w,
    );
    let summed = subtotal.checked_add(vat_amount);
    let total_raw = pick(obj, &["total", "totalAmount", "total_amount"]).filter(|v| !v.is_null());
    if total_raw.is_none() && summed.is_none() {
        w.push("total", "subtotal + vatAmount is out of range, using subtotal");
    }
    let total = parse_money_checked(total_raw, summed.unwrap_or(subtotal), "total", w);

    let paid_sum = Money::checked_sum(payments.iter().map(PaymentRecord::counted_amount));
    let received_raw = pick(obj, &["received", "amountPaid", "amount_paid", "paidAmount"])
        .filter(|v| !v.is_null());
    if received_raw.is_none() && paid_sum.is_none() {
        w.push("received", "sum of payments is out of range, using 0");
    }
    let received = parse_money_checked(received_raw, paid_sum.unwrap_or(Money::ZERO), "received", w);
    let difference = total.checked_sub(received);
    let outstanding_raw = pick(obj, &["outstanding", "balanceDue", "balance_due", "outstandingAmount"])
        .filter(|v| !v.is_null());
    if outstanding_raw.is_none() && difference.is_none() {
        w.push("outstanding", "total - received is out of range, using 0");
    }
    let outstanding = parse_money_checked(
        outstanding_raw,
        difference.map_or(Money::ZERO, Money::clamp_non_negative),
        "outstanding",
        w,
    );

    let derived = || derive_payment_status(total, outstanding, PaymentStatus::Unpaid, &CurrencyPrecision::default());
    let payment_status = match pick(obj, &["paymentStatus", "payment_status"]) {
        None => derived(),
        Some(v) => text(Some(v))
            .as_deref()
            .and_then(PaymentStatus::from_wire)
            .unwrap_or_else(|| {
                w.push("paymentStatus", format!("unrecognized payment status {v}, deriving from balances"));
                derived()
            }),
    };

    let invoice_date = parse_date(pick(obj, &["invoiceDate", "invoice_date", "date"]), "invoiceDate", now, w);
    let created_at = match pick(obj, &["createdAt", "created_at"]) {
        Some(v) => parse_date(Some(v), "createdAt", now, w),
        None => invoice_date,
    };

    Invoice {
        id,
        invoice_number: text(pick(obj, &["invoiceNumber", "invoice_number", "number"])).unwrap_or_default(),
        status,
        payment_status,
        customer,
        items,
        payments,
        currency: text(pick(obj, &["currency", "currencyCode", "currency_code"]))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        subtotal,
        vat_amount,
        total,
        received,
        outstanding,
        invoice_date,
        due_date: parse_optional_date(pick(obj, &["dueDate", "due_date"]), "dueDate", w),
        issued_at: parse_optional_date(pick(obj, &["issuedAt", "issued_at"]), "issuedAt", w),
        created_at,
        deleted_at: parse_optional_date(pick(obj, &["deletedAt", "deleted_at"]), "deletedAt", w),
        deletion_reason: text(pick(obj, &["deletionReason", "deletion_reason"])),
        sales_agent_id: agent_id(pick(obj, &["salesAgentId", "sales_agent_id"])),
        sales_agent_name: text(pick(obj, &["salesAgentName", "sales_agent_name"])),
        delivery_status: pick(obj, &["deliveryStatus", "delivery_status"])
            .map(normalize_delivery_status)
            .unwrap_or_default(),
        notes: text(pick(obj, &["notes", "remarks"])),
    }
}

fn invoice_customer(obj: &Object, w: &mut Warnings) -> Customer {
    if let Some(nested) = pick(obj, &["customer", "customerDetails", "customer_details"]) {
        return normalize_customer(nested, w);
    }

    let flat_id = record_id(pick(obj, &["customerId", "customer_id"]));
    let flat_name = text(pick(obj, &["customerName", "customer_name"]));
    if flat_id.is_none() && flat_name.is_none() {
        w.push("customer", "no customer on payload, using unknown customer");
        return Customer::unknown();
    }

    let fallback = Customer::unknown();
    Customer {
        id: flat_id.unwrap_or(fallback.id),
        name: flat_name.unwrap_or(fallback.name),
        ..fallback
    }
}

/// Malformed input degrades to [`Customer::unknown`].
pub fn normalize_customer(raw: &Value, w: &mut Warnings) -> Customer {
    let Some(obj) = raw.as_object() else {
        w.push("customer", format!("customer is {}, using unknown customer", json_kind(raw)));
        return Customer::unknown();
    };

    let fallback = Customer::unknown();
    Customer {
        id: record_id(pick(obj, &["id", "customerId", "customer_id"])).unwrap_or(fallback.id),
        name: text(pick(obj, &["name", "customerName", "customer_name", "companyName", "company_name"]))
            .unwrap_or(fallback.name),
        email: text(pick(obj, &["email", "emailAddress", "email_address"])),
        phone: text(pick(obj, &["phone", "phoneNumber", "phone_number", "mobile"])),
        address: address(pick(obj, &["address", "billingAddress", "billing_address"])),
        vat_number: text(pick(obj, &["vatNumber", "vat_number", "trn", "trnNumber", "trn_number"])),
    }
}

/// Negative quantity or rate is clamped to zero; a missing amount is `quantity × rate`.
pub fn normalize_line_item(raw: &Value, w: &mut Warnings) -> Option<LineItem> {
    let obj = raw.as_object()?;

    let mut quantity = parse_number(pick(obj, &["quantity", "qty"]), 0.0);
    if quantity < 0.0 {
        w.push("items.quantity", format!("negative quantity {quantity} clamped to 0"));
        quantity = 0.0;
    }

    let mut rate = parse_money_checked(pick(obj, &["rate", "unitPrice", "unit_price", "price"]), Money::ZERO, "items.rate", w);
    if rate.is_negative() {
        w.push("items.rate", format!("negative rate {rate} clamped to 0"));
        rate = Money::ZERO;
    }

    let amount = match pick(obj, &["amount", "lineTotal", "line_total"]) {
        Some(v) => parse_money_checked(Some(v), line_amount(quantity, rate), "items.amount", w),
        None => line_amount(quantity, rate),
    }
    .clamp_non_negative();

    Some(LineItem {
        product_id: record_id(pick(obj, &["productId", "product_id"])),
        name: text(pick(obj, &["name", "productName", "product_name", "description"])).unwrap_or_default(),
        quantity,
        rate,
        amount,
    })
}

fn line_amount(quantity: f64, rate: Money) -> Money {
    Decimal::from_f64(quantity)
        .and_then(|q| rate.checked_mul(q))
        .map(|m| CurrencyPrecision::default().round(m))
        .unwrap_or(Money::ZERO)
}

pub fn normalize_payment(raw: &Value, w: &mut Warnings) -> Option<PaymentRecord> {
    normalize_payment_at(raw, Utc::now(), w)
}

pub fn normalize_payment_at(raw: &Value, now: DateTime<Utc>, w: &mut Warnings) -> Option<PaymentRecord> {
    let obj = raw.as_object()?;

    let id = record_id(pick(obj, &["id", "paymentId", "payment_id", "_id"])).unwrap_or_else(|| {
        w.push("payments.id", "payment without id, assigned a temporary one");
        RecordId::temporary()
    });

    Some(PaymentRecord {
        id,
        amount: parse_money_checked(pick(obj, &["amount"]), Money::ZERO, "payments.amount", w),
        payment_date: parse_date(
            pick(obj, &["paymentDate", "payment_date", "date"]),
            "payments.paymentDate",
            now,
            w,
        ),
        method: text(pick(obj, &["method", "paymentMethod", "paymentMode", "payment_method"]))
            .map(|m| PaymentMethod::from_wire(&m))
            .unwrap_or(PaymentMethod::Other),
        reference_no: text(pick(obj, &["referenceNo", "referenceNumber", "reference_number", "reference"])),
        notes: text(pick(obj, &["notes", "note", "remarks"])),
        voided: flag(pick(obj, &["voided", "isVoided", "is_voided"])).unwrap_or(false),
        voided_at: parse_optional_date(pick(obj, &["voidedAt", "voided_at"]), "payments.voidedAt", w),
        void_reason: text(pick(obj, &["voidReason", "void_reason"])),
        voided_by: text(pick(obj, &["voidedBy", "voided_by"])),
    })
}

/// Accepts an object (`hasNotes`/`count`) or a bare boolean.
pub fn normalize_delivery_status(raw: &Value) -> DeliveryStatus {
    match raw {
        Value::Bool(has_notes) => DeliveryStatus {
            has_notes: *has_notes,
            count: 0,
        },
        Value::Object(obj) => {
            let count = parse_number(pick(obj, &["count", "deliveryNoteCount", "delivery_note_count"]), 0.0)
                .clamp(0.0, f64::from(u32::MAX)) as u32;
            DeliveryStatus {
                has_notes: flag(pick(obj, &["hasNotes", "has_notes"])).unwrap_or(count > 0),
                count,
            }
        }
        _ => DeliveryStatus::default(),
    }
}

/// First present, non-null value among `keys` (camelCase first by convention).
fn pick<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| !v.is_null())
}

fn array<'a>(obj: &'a Object, keys: &[&str], field: &str, w: &mut Warnings) -> &'a [Value] {
    match pick(obj, keys) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            w.push(field, format!("expected an array, got {}", json_kind(other)));
            &[]
        }
        None => &[],
    }
}

/// Trimmed non-empty text; numbers are rendered as text.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn record_id(value: Option<&Value>) -> Option<RecordId> {
    text(value).map(RecordId::from)
}

/// Agent ids of `0`, `"0"` or blank mean "no agent".
fn agent_id(value: Option<&Value>) -> Option<RecordId> {
    text(value).filter(|s| s != "0").map(RecordId::from)
}

fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn positive_u32(value: Option<&Value>) -> Option<u32> {
    let n = parse_number(value, 0.0);
    (n >= 1.0).then(|| n.min(f64::from(u32::MAX)) as u32)
}

fn address(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(parts) => {
            let joined: Vec<String> = ["street", "line1", "line2", "city", "state", "postalCode", "country"]
                .iter()
                .filter_map(|k| text(parts.get(*k)))
                .collect();
            (!joined.is_empty()).then(|| joined.join(", "))
        }
        other => text(Some(other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serialize a normalized entity back to its canonical wire form.
pub fn to_canonical_json(invoice: &Invoice) -> Value {
    serde_json::to_value(invoice).unwrap_or(Value::Null)
}
