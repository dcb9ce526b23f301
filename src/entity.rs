// src/entity.rs
//! Capabilities every mirrored record must provide, plus the caller context
//! permission checks are evaluated against.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

/// Primary key of a mirrored entity. Keys are numeric so they can be
/// reported in errors uniformly.
pub trait EntityKey: Copy + Eq + Hash + Ord + Debug + Send + Sync + Into<u64> + 'static {}

impl<T> EntityKey for T where T: Copy + Eq + Hash + Ord + Debug + Send + Sync + Into<u64> + 'static {}

/// A record held by a [`Registry`](crate::registry::Registry).
pub trait Entity: Send + Sync + 'static {
    type Key: EntityKey;

    /// Unique, immutable key.
    fn key(&self) -> Self::Key;

    /// Stable external identifier used by the secondary index, if any.
    /// Empty identifiers are treated as absent.
    fn secondary_key(&self) -> Option<&str> {
        None
    }

    /// Whether `caller` may act on this entity.
    fn has_permission(&self, caller: &Caller) -> bool;
}

/// Access level of a [`Caller`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

/// Identity of whoever is reading or mutating through the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: u64,
    pub role: Role,
}

impl Caller {
    /// Caller allowed to act on every entity.
    pub fn admin(user_id: u64) -> Self {
        Self { user_id, role: Role::Admin }
    }

    /// Caller limited to the entities it owns.
    pub fn member(user_id: u64) -> Self {
        Self { user_id, role: Role::Member }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Ownership rule shared by every operator-managed entity: admins act on
    /// anything, members only on what they own.
    pub fn can_access(&self, owner: u64) -> bool {
        self.is_admin() || self.user_id == owner
    }
}

/// Ordering and visibility of a registry's sorted views.
pub trait ViewOrder<V>: Send + Sync + 'static {
    fn compare(&self, a: &V, b: &V) -> Ordering;

    /// Whether `v` belongs in the filtered view. Everything is visible unless
    /// overridden.
    fn visible(&self, _v: &V) -> bool {
        true
    }
}

/// Ascending by key, no filtering.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByKey;

impl<V: Entity> ViewOrder<V> for ByKey {
    fn compare(&self, a: &V, b: &V) -> Ordering {
        a.key().cmp(&b.key())
    }
}
