use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Permission, Role};

/// Identity of an authenticated principal (human user, service account, etc).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Roles and permissions granted to a principal.
///
/// `permissions` is the resolved list sent by the backend. When it is empty
/// the role defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Membership {
    /// Explicit permissions, or the union of role defaults when none were sent.
    pub fn effective_permissions(&self) -> Vec<Permission> {
        if !self.permissions.is_empty() {
            return self.permissions.clone();
        }
        let mut out: Vec<Permission> = Vec::new();
        for role in &self.roles {
            for perm in role.default_permissions() {
                if !out.contains(&perm) {
                    out.push(perm);
                }
            }
        }
        out
    }
}
