//! Opaque record identifiers.
//!
//! The backend assigns ids (numeric or textual, depending on the endpoint); the
//! client never interprets them. Records created optimistically before the
//! server answers carry a temporary id that the authoritative copy replaces.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

const TEMPORARY_PREFIX: &str = "tmp-";

/// Identifier of a server-owned record (invoice, payment, customer, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Client-generated placeholder id for a record the server has not confirmed yet.
    ///
    /// Uses UUIDv7 (time-ordered) so temporary records sort in creation order.
    pub fn temporary() -> Self {
        Self(format!("{TEMPORARY_PREFIX}{}", Uuid::now_v7()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("RecordId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_ids_are_flagged_and_unique() {
        let a = RecordId::temporary();
        let b = RecordId::temporary();
        assert!(a.is_temporary());
        assert_ne!(a, b);
        assert!(!RecordId::from(42u64).is_temporary());
    }

    #[test]
    fn parsing_rejects_blank_ids() {
        assert!(matches!("  ".parse::<RecordId>(), Err(DomainError::InvalidId(_))));
        assert_eq!(" 17 ".parse::<RecordId>().unwrap(), RecordId::from("17"));
    }
}
