//! Entity traits: identity, plus the ownership anchor used by the policy layer.

use crate::id::UserId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// A resource with a single owning user.
///
/// Mutations on an owned resource are only permitted to its owner; see the
/// policy layer in `devbook-auth`.
pub trait Owned {
    fn owner(&self) -> UserId;
}
