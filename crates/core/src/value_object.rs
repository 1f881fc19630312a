//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values: two
/// `Money` amounts of `400.00` are the same value no matter where they came
/// from. To "modify" one, build a new one.
///
/// ```ignore
/// let a = Money::from_minor(40_000);
/// let b = Money::parse("400.00").unwrap();
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
