//! Node startup and the public handle
//!
//! `start` wires a node together: validate and install the genesis, open the
//! configured store backend, spawn the coordinator and the listener, and
//! register every actor under the node's URI. Starting an already running
//! URI hands back the existing node.

use crate::config::{GenesisConfig, StoreBackend, GLOBAL_CONFIG};
use crate::core::{Block, Hash, MinerJob};
use crate::error::{ChainError, Result};
use crate::network::connector;
use crate::network::listener::Listener;
use crate::network::logic::{self, LogicHandle};
use crate::network::registry::{RegistryEntry, Role, REGISTRY};
use crate::network::supervisor::Supervisor;
use crate::storage::BlockStore;
use log::info;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;

const URI_SCHEME: &str = "tcp://";

/// A node identity: `(host, port)`, rendered as `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeUri {
    host: String,
    port: u16,
}

impl NodeUri {
    /// Accepts `tcp://host:port` or a bare `host:port`.
    pub fn parse(uri: &str) -> Result<NodeUri> {
        let bare = uri.strip_prefix(URI_SCHEME).unwrap_or(uri);
        if bare.contains("://") {
            return Err(ChainError::Config(format!(
                "unsupported URI scheme in {uri:?}"
            )));
        }
        let (host, port) = bare
            .rsplit_once(':')
            .ok_or_else(|| ChainError::Config(format!("missing port in {uri:?}")))?;
        if host.is_empty() {
            return Err(ChainError::Config(format!("missing host in {uri:?}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| ChainError::Config(format!("bad port in {uri:?}: {e}")))?;
        Ok(NodeUri {
            host: host.to_string(),
            port,
        })
    }

    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let authority = format!("{}:{}", self.host, self.port);
        authority
            .to_socket_addrs()
            .map_err(|e| ChainError::Network(format!("cannot resolve {authority}: {e}")))?
            .next()
            .ok_or_else(|| ChainError::Network(format!("no address for {authority}")))
    }
}

impl fmt::Display for NodeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URI_SCHEME}{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeUri {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<NodeUri> {
        NodeUri::parse(s)
    }
}

/// Name handles addressing one node's actors.
#[derive(Clone)]
pub struct Handle {
    uri: NodeUri,
    logic: LogicHandle,
    listener: Arc<Listener>,
    clients: Supervisor,
    connectors: Supervisor,
}

impl Handle {
    pub fn get_uri(&self) -> &NodeUri {
        &self.uri
    }

    pub fn logic(&self) -> &LogicHandle {
        &self.logic
    }

    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    pub fn clients(&self) -> &Supervisor {
        &self.clients
    }

    pub fn connectors(&self) -> &Supervisor {
        &self.connectors
    }

    /// Dial out to a remote node. The dial runs on a supervised connector;
    /// a refused connection ends quietly, other failures are retried per
    /// the transient policy.
    pub fn connect(&self, uri: &str) -> Result<()> {
        let target = NodeUri::parse(uri)?;
        let addr = target.socket_addr()?;
        let events = self.logic.sender();
        self.connectors.add_child(
            &format!("connector-{target}"),
            Box::new(move || connector::dial(addr, &events)),
        );
        Ok(())
    }

    /// The local chain, newest first.
    pub fn chain(&self) -> Result<Vec<Block>> {
        Ok(self.logic.snapshot()?.chain)
    }

    pub fn head(&self) -> Result<Block> {
        let mut chain = self.logic.snapshot()?.chain;
        Ok(chain.remove(0))
    }

    pub fn peer_count(&self) -> Result<usize> {
        Ok(self.logic.snapshot()?.peer_count)
    }

    /// Forge a block on top of the current head: seal, mine on a worker,
    /// then hand it to the coordinator to adopt and gossip. Loses the race
    /// with a concurrent extension and reports it as a stale block.
    pub fn mine_and_announce(&self, content_hash: Hash, timestamp: u64) -> Result<Block> {
        let head = self.head()?;
        let sealed = Block::new(content_hash, timestamp).as_child_of(&head).seal();
        let job = MinerJob::spawn(sealed);
        let mined = job
            .join()
            .ok_or_else(|| ChainError::Network("mining was cancelled".to_string()))?;
        self.logic.submit_block(mined)
    }

    /// Stop the node: unregister its names, stop accepting, stop dialing,
    /// and let the coordinator close every peer socket.
    pub fn shutdown(&self) {
        info!("{}: shutting down", self.uri);
        REGISTRY.unregister_node(&self.uri.host, self.uri.port);
        self.listener.shutdown();
        self.connectors.shutdown();
        self.logic.shutdown();
    }
}

/// Start a node (idempotent per URI) and return its handle.
pub fn start(uri: &str, genesis: GenesisConfig) -> Result<Handle> {
    let uri = NodeUri::parse(uri)?;
    if let Some(existing) = REGISTRY.node(&uri.host, uri.port) {
        return Ok(existing);
    }

    genesis.validate()?;
    GLOBAL_CONFIG.install_genesis(genesis)?;

    let store = match GLOBAL_CONFIG.store_backend() {
        StoreBackend::Memory => BlockStore::memory(),
        StoreBackend::Disk => BlockStore::open(&GLOBAL_CONFIG.node_store_path(uri.port))?,
    };

    let clients = Supervisor::new(&format!("{uri}/clients"));
    let connectors = Supervisor::new(&format!("{uri}/connectors"));
    let (logic, _worker) = logic::spawn(uri.clone(), store, clients.clone())?;
    let listener = Listener::spawn(uri.socket_addr()?, logic.sender())?;

    let handle = Handle {
        uri: uri.clone(),
        logic: logic.clone(),
        listener: Arc::clone(&listener),
        clients: clients.clone(),
        connectors: connectors.clone(),
    };

    REGISTRY.register(
        &uri.host,
        uri.port,
        Role::Node,
        RegistryEntry::Node(handle.clone()),
    );
    REGISTRY.register(&uri.host, uri.port, Role::Logic, RegistryEntry::Logic(logic));
    REGISTRY.register(
        &uri.host,
        uri.port,
        Role::Listener,
        RegistryEntry::Listener(listener),
    );
    REGISTRY.register(
        &uri.host,
        uri.port,
        Role::Clients,
        RegistryEntry::Clients(clients),
    );
    REGISTRY.register(
        &uri.host,
        uri.port,
        Role::Connectors,
        RegistryEntry::Connectors(connectors),
    );

    info!("{uri}: node started");
    Ok(handle)
}

/// Dial out from a running node. Thin wrapper over [`Handle::connect`].
pub fn connect(handle: &Handle, uri: &str) -> Result<()> {
    handle.connect(uri)
}
