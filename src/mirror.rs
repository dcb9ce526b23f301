// src/mirror.rs
//! Single write path keeping a store and its registry in step.
//!
//! Handlers may still write the store and call `Registry::update`/`delete`
//! themselves; routing writes through [`MirroredStore`] removes the chance of
//! forgetting the second step.

use tracing::warn;

use crate::entity::{Caller, Entity, ViewOrder};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::store::EntityStore;

pub struct MirroredStore<'a, S, V: Entity, O: ViewOrder<V>> {
    store: &'a S,
    registry: &'a Registry<V, O>,
}

impl<'a, S, V, O> MirroredStore<'a, S, V, O>
where
    S: EntityStore<V>,
    V: Entity,
    O: ViewOrder<V>,
{
    pub fn new(store: &'a S, registry: &'a Registry<V, O>) -> Self {
        Self { store, registry }
    }

    /// Persist `value`, then install it in the registry. The registry is left
    /// untouched if the store rejects the write.
    pub fn save(&self, value: V) -> Result<()> {
        self.store.save(&value)?;
        self.registry.update(value);
        Ok(())
    }

    /// Bulk delete on behalf of `caller`: permission check against the
    /// registry, store delete, then registry delete.
    pub fn delete(&self, caller: &Caller, keys: &[V::Key]) -> Result<()> {
        if !self.registry.check_permission(caller, keys.iter().copied()) {
            warn!(user_id = caller.user_id, ?keys, "bulk delete denied");
            return Err(Error::PermissionDenied);
        }
        self.store.delete(keys)?;
        self.registry.delete(keys.iter().copied());
        Ok(())
    }
}
