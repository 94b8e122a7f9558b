//! Actor name registry
//!
//! Maps `(host, port, role)` triples to live handles so peers and callers
//! can resolve a node's actors by URI. Entries are registered when a node
//! starts and removed when it shuts down.

use crate::network::listener::Listener;
use crate::network::logic::LogicHandle;
use crate::network::node::Handle;
use crate::network::supervisor::Supervisor;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Node,
    Logic,
    Listener,
    Clients,
    Connectors,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Node => write!(f, "node"),
            Role::Logic => write!(f, "logic"),
            Role::Listener => write!(f, "listener"),
            Role::Clients => write!(f, "clients"),
            Role::Connectors => write!(f, "connectors"),
        }
    }
}

/// A live handle under a registered name.
#[derive(Clone)]
pub enum RegistryEntry {
    Node(Handle),
    Logic(LogicHandle),
    Listener(Arc<Listener>),
    Clients(Supervisor),
    Connectors(Supervisor),
}

type Key = (String, u16, Role);

pub struct Registry {
    inner: RwLock<HashMap<Key, RegistryEntry>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, host: &str, port: u16, role: Role, entry: RegistryEntry) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on registry - this should never happen");
        inner.insert((host.to_string(), port, role), entry);
    }

    pub fn lookup(&self, host: &str, port: u16, role: Role) -> Option<RegistryEntry> {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on registry - this should never happen");
        inner.get(&(host.to_string(), port, role)).cloned()
    }

    /// The node handle registered for `(host, port)`, if any.
    pub fn node(&self, host: &str, port: u16) -> Option<Handle> {
        match self.lookup(host, port, Role::Node) {
            Some(RegistryEntry::Node(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn contains(&self, host: &str, port: u16, role: Role) -> bool {
        self.lookup(host, port, role).is_some()
    }

    /// Drop every role registered for `(host, port)`.
    pub fn unregister_node(&self, host: &str, port: u16) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on registry - this should never happen");
        for role in [
            Role::Node,
            Role::Logic,
            Role::Listener,
            Role::Clients,
            Role::Connectors,
        ] {
            inner.remove(&(host.to_string(), port, role));
        }
    }
}
