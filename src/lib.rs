// src/lib.rs
//! Lodestore: in-process mirrors of persisted fleet entities.
//!
//! Registries are loaded once from the persisted store at startup, owned by
//! an [`AppContext`], and kept in step afterwards by handlers that call
//! `update`/`delete` after each successful store write (or route writes
//! through [`MirroredStore`]).

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod mirror;
pub mod model;
pub mod refresh;
pub mod registry;
pub mod store;

pub use config::Config;
pub use context::{AppContext, Stores};
pub use entity::{ByKey, Caller, Entity, EntityKey, Role, ViewOrder};
pub use error::{Error, Result};
pub use mirror::MirroredStore;
pub use model::{DdnsProfile, DdnsRegistry, Nat, NatRegistry, Server, ServerOrder, ServerRegistry, ServerState};
pub use refresh::{spawn_refresher, RefresherHandle, TransferRecorder};
pub use registry::Registry;
pub use store::{EntityStore, MemoryStore, MemoryTransferSink, TransferRecord, TransferSink};

/// Install a global `fmt` subscriber at `level` ("info", "debug", ...).
#[cfg(feature = "subscriber")]
pub fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| Error::Config(format!("unknown log level '{level}'")))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .map_err(|e| Error::Config(e.to_string()))
}
