use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "invoices.read").
/// A special wildcard permission `"*"` can be used by policy layers to indicate
/// "allow all" without enumerating every domain permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const INVOICES_READ: Permission = Permission(Cow::Borrowed("invoices.read"));
    pub const INVOICES_UPDATE: Permission = Permission(Cow::Borrowed("invoices.update"));
    pub const INVOICES_DELETE: Permission = Permission(Cow::Borrowed("invoices.delete"));
    pub const PAYMENTS_RECORD: Permission = Permission(Cow::Borrowed("payments.record"));
    pub const CREDIT_NOTES_CREATE: Permission = Permission(Cow::Borrowed("credit_notes.create"));
    pub const CUSTOMERS_READ: Permission = Permission(Cow::Borrowed("customers.read"));
    pub const DELIVERY_NOTES_READ: Permission = Permission(Cow::Borrowed("delivery_notes.read"));
    pub const DELIVERY_NOTES_CREATE: Permission =
        Permission(Cow::Borrowed("delivery_notes.create"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Resource part of a dotted permission (`"invoices"` for `"invoices.read"`).
    pub fn resource(&self) -> &str {
        self.as_str().split('.').next().unwrap_or_default()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
