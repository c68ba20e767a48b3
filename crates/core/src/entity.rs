//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// A block entry keeps its id for as long as it lives in the store; a later
/// re-block of the same country is a different entity with a fresh id.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
