//! Capability oracle: the yes/no permission questions domain code may ask.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{authorize, Permission, Principal};

/// Actions the invoice screens gate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadInvoices,
    UpdateInvoices,
    DeleteInvoices,
    RecordPayments,
    CreateCreditNotes,
    ReadCustomers,
    ReadDeliveryNotes,
    CreateDeliveryNotes,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ReadInvoices,
        Capability::UpdateInvoices,
        Capability::DeleteInvoices,
        Capability::RecordPayments,
        Capability::CreateCreditNotes,
        Capability::ReadCustomers,
        Capability::ReadDeliveryNotes,
        Capability::CreateDeliveryNotes,
    ];

    /// Backend permission that grants this capability.
    pub fn permission(self) -> Permission {
        match self {
            Capability::ReadInvoices => Permission::INVOICES_READ,
            Capability::UpdateInvoices => Permission::INVOICES_UPDATE,
            Capability::DeleteInvoices => Permission::INVOICES_DELETE,
            Capability::RecordPayments => Permission::PAYMENTS_RECORD,
            Capability::CreateCreditNotes => Permission::CREDIT_NOTES_CREATE,
            Capability::ReadCustomers => Permission::CUSTOMERS_READ,
            Capability::ReadDeliveryNotes => Permission::DELIVERY_NOTES_READ,
            Capability::CreateDeliveryNotes => Permission::DELIVERY_NOTES_CREATE,
        }
    }
}

/// Pure predicate answering "may the current actor do this?".
///
/// Implementations must not perform IO or have side effects; the action
/// resolver may ask the same question many times per render.
pub trait CapabilityOracle {
    fn can(&self, capability: Capability) -> bool;
}

impl<F> CapabilityOracle for F
where
    F: Fn(Capability) -> bool,
{
    fn can(&self, capability: Capability) -> bool {
        self(capability)
    }
}

impl CapabilityOracle for Principal {
    fn can(&self, capability: Capability) -> bool {
        authorize(self, &capability.permission()).is_ok()
    }
}

/// Explicit set of granted capabilities (handy for tests and cached grants).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(HashSet<Capability>);

impl CapabilitySet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.0.remove(&capability);
        self
    }

    /// Snapshot any oracle into a set (one question per capability).
    pub fn snapshot(oracle: &dyn CapabilityOracle) -> Self {
        Self(Capability::ALL.into_iter().filter(|c| oracle.can(*c)).collect())
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl CapabilityOracle for CapabilitySet {
    fn can(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Membership, PrincipalId, Role};

    #[test]
    fn principal_answers_through_authorize() {
        let principal = Principal {
            principal_id: PrincipalId::new(),
            display_name: "warehouse clerk".to_string(),
            membership: Membership {
                roles: vec![Role::new("warehouse")],
                permissions: Vec::new(),
            },
        };
        assert!(principal.can(Capability::CreateDeliveryNotes));
        assert!(!principal.can(Capability::DeleteInvoices));
    }

    #[test]
    fn closures_are_oracles() {
        let only_read = |c: Capability| c == Capability::ReadInvoices;
        assert!(only_read.can(Capability::ReadInvoices));
        assert!(!only_read.can(Capability::UpdateInvoices));
    }

    #[test]
    fn snapshot_matches_source_oracle() {
        let set = CapabilitySet::all().without(Capability::DeleteInvoices);
        let snap = CapabilitySet::snapshot(&set);
        assert_eq!(snap, set);
        assert!(!snap.can(Capability::DeleteInvoices));
    }
}
