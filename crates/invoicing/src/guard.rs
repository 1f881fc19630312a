//! Development-time field naming guard.
//!
//! Normalized entities must only expose canonical camelCase keys. This module
//! checks that in two ways, both inert in [`GuardMode::Production`]:
//!
//! * [`FieldGuard::audit`] is a schema pass over serialized data that reports
//!   forbidden snake_case keys, other snake-like keys and unknown camelCase keys
//!   (recursing into customer, items and payments);
//! * [`Guarded`] wraps an entity for dynamic, key-based access. Forbidden keys
//!   read as missing and cannot be written; typed access through `Deref` is
//!   untouched.

use core::ops::Deref;
use std::panic::Location;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::Invoice;
use crate::policy::GuardMode;

/// Allowed and forbidden keys for one entity shape.
#[derive(Debug, PartialEq, Eq)]
pub struct KeySchema {
    pub entity: &'static str,
    canonical: &'static [&'static str],
    forbidden: &'static [&'static str],
}

impl KeySchema {
    pub const INVOICE: KeySchema = KeySchema {
        entity: "Invoice",
        canonical: &[
            "id", "invoiceNumber", "status", "paymentStatus", "customer", "items", "payments",
            "currency", "subtotal", "vatAmount", "total", "received", "outstanding", "invoiceDate",
            "dueDate", "issuedAt", "createdAt", "updatedAt", "deletedAt", "deletionReason",
            "salesAgentId", "salesAgentName", "deliveryStatus", "notes",
            // Accepted camelCase aliases still read by older screens.
            "date", "customerId", "customerName", "customerDetails", "totalAmount", "balanceDue",
            "lastPaymentDate", "commissionAmount", "commissionCalculated", "terms",
            "termsAndConditions", "companyDetails", "recreatedFrom",
        ],
        forbidden: &[
            "invoice_number", "invoice_date", "due_date", "customer_id", "customer_details",
            "customer_name", "vat_amount", "total_amount", "payment_status", "sales_agent_id",
            "sales_agent_name", "commission_amount", "commission_calculated", "balance_due",
            "delivery_status", "deleted_at", "created_at", "updated_at", "last_payment_date",
            "deletion_reason", "recreated_from", "terms_and_conditions", "company_details",
        ],
    };

    pub const PAYMENT: KeySchema = KeySchema {
        entity: "Payment",
        canonical: &[
            "id", "amount", "paymentDate", "method", "referenceNo", "notes", "voided", "voidedAt",
            "voidReason", "voidedBy",
        ],
        forbidden: &[
            "payment_date", "payment_method", "payment_mode", "reference_number", "receipt_number",
            "invoice_number", "created_at", "voided_at",
        ],
    };

    pub const CUSTOMER: KeySchema = KeySchema {
        entity: "Customer",
        canonical: &["id", "name", "email", "phone", "address", "vatNumber"],
        forbidden: &[
            "customer_name", "company_name", "email_address", "phone_number", "vat_number",
            "tax_registration_number", "credit_limit", "current_credit", "payment_terms",
        ],
    };

    pub const LINE_ITEM: KeySchema = KeySchema {
        entity: "LineItem",
        canonical: &["productId", "name", "quantity", "rate", "amount"],
        forbidden: &["product_id", "product_name", "unit_price", "line_total"],
    };

    pub fn is_canonical(&self, key: &str) -> bool {
        self.canonical.contains(&key)
    }

    pub fn is_forbidden(&self, key: &str) -> bool {
        self.forbidden.contains(&key)
    }

    /// Nested schema for a child key, if the audit should descend into it.
    fn child(&self, key: &str) -> Option<&'static KeySchema> {
        match (self.entity, key) {
            ("Invoice", "customer") => Some(&Self::CUSTOMER),
            ("Invoice", "items") => Some(&Self::LINE_ITEM),
            ("Invoice", "payments") => Some(&Self::PAYMENT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyVerdict {
    Canonical,
    /// A known legacy snake_case name.
    Forbidden { suggestion: String },
    /// Not in the forbidden list but contains `_`.
    SnakeLike { suggestion: String },
    /// camelCase but not allow-listed (possibly a new backend field).
    Unknown,
}

pub fn classify_key(schema: &KeySchema, key: &str) -> KeyVerdict {
    if schema.is_forbidden(key) {
        KeyVerdict::Forbidden {
            suggestion: snake_to_camel(key),
        }
    } else if key.contains('_') {
        KeyVerdict::SnakeLike {
            suggestion: snake_to_camel(key),
        }
    } else if schema.is_canonical(key) {
        KeyVerdict::Canonical
    } else {
        KeyVerdict::Unknown
    }
}

/// `invoice_number` → `invoiceNumber`.
pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiagnostic {
    pub entity: &'static str,
    /// Dotted path from the audited root (`payments[1].voided_at`).
    pub path: String,
    pub key: String,
    pub verdict: KeyVerdict,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("snake_case field '{key}' is not part of the {entity} contract; use '{suggestion}'")]
    ForbiddenField {
        entity: &'static str,
        key: String,
        suggestion: String,
    },

    #[error("'{key}' is not a field of {entity}")]
    UnknownField { entity: &'static str, key: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldGuard {
    pub mode: GuardMode,
}

impl FieldGuard {
    pub fn new(mode: GuardMode) -> Self {
        Self { mode }
    }

    /// Report every non-canonical key in `value` (an object or an array of them).
    #[track_caller]
    pub fn audit(&self, schema: &'static KeySchema, value: &Value) -> Vec<FieldDiagnostic> {
        if !self.mode.is_enabled() {
            return Vec::new();
        }
        let mut found = Vec::new();
        walk(schema, value, "", &mut found);

        let location = Location::caller();
        for d in &found {
            emit(d, "read", location);
        }
        found
    }

    /// Audit a normalized invoice; a correct normalizer yields nothing.
    #[track_caller]
    pub fn audit_invoice(&self, invoice: &Invoice) -> Vec<FieldDiagnostic> {
        if !self.mode.is_enabled() {
            return Vec::new();
        }
        match serde_json::to_value(invoice) {
            Ok(value) => self.audit(&KeySchema::INVOICE, &value),
            Err(err) => {
                tracing::error!(invoice_id = %invoice.id, error = %err, "invoice could not be serialized for audit");
                Vec::new()
            }
        }
    }
}

fn walk(schema: &'static KeySchema, value: &Value, prefix: &str, found: &mut Vec<FieldDiagnostic>) {
    match value {
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                walk(schema, item, &format!("{prefix}[{idx}]"), found);
            }
        }
        Value::Object(fields) => {
            for (key, child) in fields {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match classify_key(schema, key) {
                    KeyVerdict::Canonical => {
                        if let Some(nested) = schema.child(key) {
                            walk(nested, child, &path, found);
                        }
                    }
                    verdict => found.push(FieldDiagnostic {
                        entity: schema.entity,
                        path,
                        key: key.clone(),
                        verdict,
                    }),
                }
            }
        }
        _ => {}
    }
}

fn emit(d: &FieldDiagnostic, access: &str, location: &Location<'_>) {
    match &d.verdict {
        KeyVerdict::Canonical => {}
        KeyVerdict::Forbidden { suggestion } => tracing::error!(
            entity = d.entity,
            field = %d.path,
            suggestion = %suggestion,
            access,
            location = %location,
            "forbidden snake_case field on normalized entity"
        ),
        KeyVerdict::SnakeLike { suggestion } => tracing::warn!(
            entity = d.entity,
            field = %d.path,
            suggestion = %suggestion,
            access,
            location = %location,
            "snake_case style field on normalized entity"
        ),
        KeyVerdict::Unknown => tracing::info!(
            entity = d.entity,
            field = %d.path,
            access,
            location = %location,
            "field is not allow-listed; add it to the schema if it is new"
        ),
    }
}

/// An entity with guarded key-based access.
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<T> {
    inner: T,
    schema: &'static KeySchema,
    mode: GuardMode,
}

/// Wrap an entity. In production the wrapper adds no diagnostics.
pub fn guard<T>(entity: T, schema: &'static KeySchema, mode: GuardMode) -> Guarded<T> {
    Guarded {
        inner: entity,
        schema,
        mode,
    }
}

pub fn guard_invoice(invoice: Invoice, mode: GuardMode) -> Guarded<Invoice> {
    guard(invoice, &KeySchema::INVOICE, mode)
}

pub fn guard_invoices(invoices: Vec<Invoice>, mode: GuardMode) -> Vec<Guarded<Invoice>> {
    invoices.into_iter().map(|i| guard_invoice(i, mode)).collect()
}

impl<T> Guarded<T> {
    pub fn into_inner(self) -> T {
        self.inner
    }

    #[track_caller]
    fn diagnose(&self, key: &str, access: &str) -> KeyVerdict {
        let verdict = classify_key(self.schema, key);
        if self.mode.is_enabled() {
            let d = FieldDiagnostic {
                entity: self.schema.entity,
                path: key.to_string(),
                key: key.to_string(),
                verdict: verdict.clone(),
            };
            emit(&d, access, Location::caller());
        }
        verdict
    }
}

impl<T: Serialize + DeserializeOwned> Guarded<T> {
    /// Read a field by its wire name. Forbidden names read as missing.
    #[track_caller]
    pub fn get(&self, key: &str) -> Option<Value> {
        if let KeyVerdict::Forbidden { .. } = self.diagnose(key, "read") {
            return None;
        }
        match serde_json::to_value(&self.inner) {
            Ok(Value::Object(mut fields)) => fields.remove(key).filter(|v| !v.is_null()),
            _ => None,
        }
    }

    /// Write a field by its wire name. Forbidden and unknown names are rejected.
    #[track_caller]
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), GuardError> {
        let entity = self.schema.entity;
        if let KeyVerdict::Forbidden { suggestion } = self.diagnose(key, "write") {
            return Err(GuardError::ForbiddenField {
                entity,
                key: key.to_string(),
                suggestion,
            });
        }

        let invalid = |err: serde_json::Error| GuardError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
        };
        let mut fields: Map<String, Value> = match serde_json::to_value(&self.inner).map_err(invalid)? {
            Value::Object(fields) => fields,
            _ => {
                return Err(GuardError::UnknownField {
                    entity,
                    key: key.to_string(),
                });
            }
        };
        if !fields.contains_key(key) {
            return Err(GuardError::UnknownField {
                entity,
                key: key.to_string(),
            });
        }
        fields.insert(key.to_string(), value);
        self.inner = serde_json::from_value(Value::Object(fields)).map_err(invalid)?;
        Ok(())
    }
}

impl<T> Deref for Guarded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_invoice, to_canonical_json};
    use serde_json::json;

    fn dev() -> FieldGuard {
        FieldGuard::new(GuardMode::Development)
    }

    fn sample() -> Invoice {
        normalize_invoice(
            &json!({
                "id": "9",
                "invoiceNumber": "INV-9",
                "status": "issued",
                "total": "100.00",
                "customer": {"id": "c", "name": "Acme"},
                "items": [{"name": "bolt", "quantity": 2, "rate": "50"}],
                "payments": [{"id": "p", "amount": "10", "paymentDate": "2025-01-01", "method": "cash"}],
                "invoiceDate": "2025-01-01",
            }),
            "guard-test",
        )
        .unwrap()
    }

    #[test]
    fn classification_follows_precedence() {
        let s = &KeySchema::INVOICE;
        assert_eq!(classify_key(s, "invoiceNumber"), KeyVerdict::Canonical);
        assert_eq!(
            classify_key(s, "invoice_number"),
            KeyVerdict::Forbidden { suggestion: "invoiceNumber".into() }
        );
        assert_eq!(
            classify_key(s, "shipping_mark"),
            KeyVerdict::SnakeLike { suggestion: "shippingMark".into() }
        );
        assert_eq!(classify_key(s, "shippingMark"), KeyVerdict::Unknown);
    }

    #[test]
    fn snake_to_camel_handles_edges() {
        assert_eq!(snake_to_camel("terms_and_conditions"), "termsAndConditions");
        assert_eq!(snake_to_camel("_private"), "private");
        assert_eq!(snake_to_camel("a__b"), "aB");
        assert_eq!(snake_to_camel("plain"), "plain");
    }

    #[test]
    fn normalized_output_passes_the_audit() {
        assert!(dev().audit_invoice(&sample()).is_empty());
    }

    #[test]
    fn audit_reports_nested_offenders_with_paths() {
        let mut raw = to_canonical_json(&sample());
        raw["payment_status"] = json!("paid");
        raw["payments"][0]["voided_at"] = json!(null);
        raw["customer"]["credit_limit"] = json!(5000);
        raw["shippingMark"] = json!("X");

        let found = dev().audit(&KeySchema::INVOICE, &raw);
        let paths: Vec<&str> = found.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"payment_status"));
        assert!(paths.contains(&"payments[0].voided_at"));
        assert!(paths.contains(&"customer.credit_limit"));
        assert!(paths.contains(&"shippingMark"));
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn production_mode_is_silent() {
        let raw = json!({"invoice_number": "x"});
        assert!(FieldGuard::new(GuardMode::Production).audit(&KeySchema::INVOICE, &raw).is_empty());
    }

    #[test]
    fn forbidden_reads_are_missing_and_writes_rejected() {
        let mut g = guard_invoice(sample(), GuardMode::Development);
        assert_eq!(g.get("invoice_number"), None);
        assert_eq!(g.get("invoiceNumber"), Some(json!("INV-9")));

        let err = g.set("payment_status", json!("paid")).unwrap_err();
        assert_eq!(
            err,
            GuardError::ForbiddenField {
                entity: "Invoice",
                key: "payment_status".into(),
                suggestion: "paymentStatus".into(),
            }
        );
        assert!(matches!(g.set("shippingMark", json!("X")), Err(GuardError::UnknownField { .. })));
    }

    #[test]
    fn canonical_writes_pass_through_and_typed_access_is_untouched() {
        let mut g = guard_invoice(sample(), GuardMode::Development);
        g.set("notes", json!("deliver before noon")).unwrap();
        assert_eq!(g.notes.as_deref(), Some("deliver before noon"));
        assert_eq!(g.invoice_number, "INV-9");

        let err = g.set("total", json!({"bad": true})).unwrap_err();
        assert!(matches!(err, GuardError::InvalidValue { .. }));
        assert_eq!(g.into_inner().notes.as_deref(), Some("deliver before noon"));
    }

    #[test]
    fn production_wrapper_behaves_like_plain_data() {
        let g = guard_invoice(sample(), GuardMode::Production);
        assert_eq!(g.get("invoice_number"), None);
        assert_eq!(g.get("id"), Some(json!("9")));
        assert_eq!(g.status, crate::model::InvoiceStatus::Issued);
    }

    #[test]
    fn wrappers_compare_by_entity_schema_and_mode() {
        let dev_a = guard_invoice(sample(), GuardMode::Development);
        let dev_b = guard_invoice(sample(), GuardMode::Development);
        assert_eq!(dev_a, dev_b);
        assert_ne!(dev_a, guard_invoice(sample(), GuardMode::Production));

        let mut other = sample();
        other.notes = Some("changed".to_string());
        assert_ne!(dev_a, guard_invoice(other, GuardMode::Development));
        assert_eq!(KeySchema::INVOICE, KeySchema::INVOICE);
    }
}
