// src/bootstrap.rs
//! Startup load of registries from the persisted store.

use tracing::info;

use crate::entity::{Entity, ViewOrder};
use crate::error::Result;
use crate::registry::Registry;
use crate::store::EntityStore;

/// Read every persisted row of one entity type and build its registry.
/// The registry is fully sorted and indexed before it is returned.
pub fn load_registry<V, O>(kind: &str, store: &dyn EntityStore<V>, order: O) -> Result<Registry<V, O>>
where
    V: Entity,
    O: ViewOrder<V>,
{
    let rows = store.load_all()?;
    let loaded = rows.len();
    let registry = Registry::new(order, rows);
    info!(kind, loaded, entries = registry.len(), "registry bootstrapped");
    Ok(registry)
}
