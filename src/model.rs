// src/model.rs
//! Operator-managed records mirrored by the registries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::{ByKey, Caller, Entity, ViewOrder};
use crate::registry::Registry;

/// Live counters reported by a node's agent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub net_in_transfer: u64,
    pub net_out_transfer: u64,
}

/// A compute node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,
    pub uuid: String,
    pub name: String,
    pub user_id: u64,
    /// Higher values are listed first.
    pub display_index: i32,
    pub hide_for_guest: bool,
    #[serde(default)]
    pub state: ServerState,
}

impl Entity for Server {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.uuid)
    }

    fn has_permission(&self, caller: &Caller) -> bool {
        caller.can_access(self.user_id)
    }
}

/// Display index descending, then id ascending; the filtered view is the
/// guest listing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOrder;

impl ViewOrder<Server> for ServerOrder {
    fn compare(&self, a: &Server, b: &Server) -> Ordering {
        b.display_index
            .cmp(&a.display_index)
            .then_with(|| a.id.cmp(&b.id))
    }

    fn visible(&self, v: &Server) -> bool {
        !v.hide_for_guest
    }
}

/// Dynamic-DNS update settings a node dispatches to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdnsProfile {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub provider: String,
    pub domains: Vec<String>,
    pub max_retries: u64,
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
}

impl Entity for DdnsProfile {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn has_permission(&self, caller: &Caller) -> bool {
        caller.can_access(self.user_id)
    }
}

/// A host-name to internal-address mapping served through a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nat {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub enabled: bool,
    pub server_id: u64,
    pub host: String,
    /// Unique; requests are routed by matching their host against it.
    pub domain: String,
}

impl Entity for Nat {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.domain)
    }

    fn has_permission(&self, caller: &Caller) -> bool {
        caller.can_access(self.user_id)
    }
}

/// Servers, with the guest listing as the filtered view.
pub type ServerRegistry = Registry<Server, ServerOrder>;
/// DDNS profiles ordered by id.
pub type DdnsRegistry = Registry<DdnsProfile, ByKey>;
/// NAT mappings ordered by id, indexed by domain.
pub type NatRegistry = Registry<Nat, ByKey>;
