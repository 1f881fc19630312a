use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; the backend decides which permissions a role
/// carries and ships the resolved list inside the principal's [`crate::Membership`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Built-in defaults used when the backend does not send explicit permissions.
    pub fn default_permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            "admin" => vec![Permission::WILDCARD],
            "accountant" => vec![
                Permission::INVOICES_READ,
                Permission::INVOICES_UPDATE,
                Permission::PAYMENTS_RECORD,
                Permission::CREDIT_NOTES_CREATE,
                Permission::CUSTOMERS_READ,
            ],
            "salesperson" => vec![
                Permission::INVOICES_READ,
                Permission::CUSTOMERS_READ,
                Permission::DELIVERY_NOTES_READ,
            ],
            "warehouse" => vec![
                Permission::INVOICES_READ,
                Permission::DELIVERY_NOTES_READ,
                Permission::DELIVERY_NOTES_CREATE,
            ],
            _ => vec![Permission::INVOICES_READ],
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
