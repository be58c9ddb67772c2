//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Child rows of an aggregate (order items, payments, discounts) are entities:
/// they keep their identity while their fields change, and the audit stream
/// keys its entries on that identity.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
