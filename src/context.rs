// src/context.rs
//! Application context owning every registry for the life of the process.

use std::sync::Arc;

use crate::bootstrap::load_registry;
use crate::entity::ByKey;
use crate::error::Result;
use crate::model::{DdnsProfile, DdnsRegistry, Nat, NatRegistry, Server, ServerOrder, ServerRegistry};
use crate::store::EntityStore;

/// Stores the context is bootstrapped from.
pub struct Stores<'a> {
    pub servers: &'a dyn EntityStore<Server>,
    pub ddns: &'a dyn EntityStore<DdnsProfile>,
    pub nats: &'a dyn EntityStore<Nat>,
}

/// Built once at startup and handed to request handlers and background jobs.
#[derive(Clone)]
pub struct AppContext {
    pub servers: Arc<ServerRegistry>,
    pub ddns: Arc<DdnsRegistry>,
    pub nats: Arc<NatRegistry>,
}

impl AppContext {
    /// Load every registry. Nothing is exposed unless all loads succeed.
    pub fn bootstrap(stores: Stores<'_>) -> Result<Self> {
        let servers = load_registry("server", stores.servers, ServerOrder)?;
        let ddns = load_registry("ddns", stores.ddns, ByKey)?;
        let nats = load_registry("nat", stores.nats, ByKey)?;
        Ok(Self {
            servers: Arc::new(servers),
            ddns: Arc::new(ddns),
            nats: Arc::new(nats),
        })
    }

    /// Resolve the DDNS profiles a node dispatches to. Fails on the first
    /// profile that no longer exists.
    pub fn ddns_profiles(&self, ids: &[u64]) -> Result<Vec<Arc<DdnsProfile>>> {
        self.ddns.get_many(ids.iter().copied())
    }

    /// NAT mapping serving `host`, if any.
    pub fn nat_for_host(&self, host: &str) -> Option<Arc<Nat>> {
        self.nats.get_by_secondary(host)
    }

    /// Server behind an agent's uuid.
    pub fn server_by_uuid(&self, uuid: &str) -> Option<Arc<Server>> {
        self.servers.get_by_secondary(uuid)
    }
}
