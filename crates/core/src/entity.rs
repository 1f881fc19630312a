//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Normalized records (invoices, payment records) are entities: two snapshots
/// with the same id describe the same record, even when their fields differ
/// (e.g. an optimistic copy and the authoritative server copy).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Whether `other` is a snapshot of the same record.
    fn same_record(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.id() == other.id()
    }
}
