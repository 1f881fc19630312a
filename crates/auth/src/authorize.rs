use std::collections::HashSet;

use thiserror::Error;

use crate::{Membership, Permission, PrincipalId};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the session layer derives the membership from whatever the
/// login endpoint returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub display_name: String,
    pub membership: Membership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let effective = principal.membership.effective_permissions();
    let perms: HashSet<&str> = effective.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        tracing::debug!(
            principal_id = %principal.principal_id,
            permission = required.as_str(),
            "permission denied"
        );
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(roles: &[&'static str], permissions: Vec<Permission>) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            display_name: "tester".to_string(),
            membership: Membership {
                roles: roles.iter().map(|r| Role::new(*r)).collect(),
                permissions,
            },
        }
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(&[], vec![Permission::WILDCARD]);
        assert!(authorize(&p, &Permission::INVOICES_DELETE).is_ok());
    }

    #[test]
    fn explicit_permissions_override_role_defaults() {
        let p = principal(&["admin"], vec![Permission::INVOICES_READ]);
        assert_eq!(
            authorize(&p, &Permission::INVOICES_DELETE),
            Err(AuthzError::Forbidden("invoices.delete".to_string()))
        );
        assert!(authorize(&p, &Permission::INVOICES_READ).is_ok());
    }

    #[test]
    fn role_defaults_apply_without_explicit_permissions() {
        let p = principal(&["accountant"], Vec::new());
        assert!(authorize(&p, &Permission::PAYMENTS_RECORD).is_ok());
        assert!(authorize(&p, &Permission::INVOICES_DELETE).is_err());
    }
}
