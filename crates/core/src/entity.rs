//! Entity trait: identity that persists across state changes.

/// Entity marker + minimal interface.
///
/// Two entities with the same id are the same entity regardless of their
/// current attribute values (contrast with [`crate::ValueObject`]).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
