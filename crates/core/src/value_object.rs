//! Value object marker: equality by value, not identity.

/// Marker trait for immutable values compared entirely by their attributes:
/// a currency code, an account selector, a monetary amount. "Modifying" a
/// value object means constructing a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
