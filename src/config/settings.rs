use crate::core::{miner, Block, Hash};
use crate::error::{ChainError, Result};
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

const STORE_BACKEND_KEY: &str = "STORE_BACKEND";
const STORE_PATH_KEY: &str = "STORE_PATH";
const DEFAULT_STORE_ROOT: &str = "data";

/// The dev genesis is derived once by sealing and mining a template block,
/// so it is valid by construction.
static DEV_GENESIS: Lazy<GenesisConfig> =
    Lazy::new(|| GenesisConfig::generate(Hash::digest(b"lattice-dev-genesis"), 1_704_067_200));

/// The statically configured fields of the genesis block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    pub timestamp: u64,
    pub nonce: u64,
    pub parent_hash: Hash,
    pub content_hash: Hash,
    pub component_hash: Hash,
    pub hash: Hash,
}

impl GenesisConfig {
    /// Derive a complete genesis configuration from a payload identity and a
    /// timestamp by sealing and mining the height-zero template.
    pub fn generate(content_hash: Hash, timestamp: u64) -> GenesisConfig {
        let template = Block::assemble(
            0,
            timestamp,
            Hash::zero(),
            content_hash,
            Hash::invalid(),
            0,
            Hash::invalid(),
        )
        .seal();
        let mined = miner::mine(template);
        GenesisConfig {
            timestamp,
            nonce: mined.get_nonce(),
            parent_hash: Hash::zero(),
            content_hash,
            component_hash: *mined.get_component_hash(),
            hash: *mined.get_hash(),
        }
    }

    /// The development/test genesis.
    pub fn dev() -> GenesisConfig {
        DEV_GENESIS.clone()
    }

    /// Overlay the configured fields onto a zeroed block.
    pub fn overlay(&self) -> Block {
        Block::assemble(
            0,
            self.timestamp,
            self.parent_hash,
            self.content_hash,
            self.component_hash,
            self.nonce,
            self.hash,
        )
    }

    /// A usable genesis sits at height zero, descends from the zero hash and
    /// carries a consistent seal and proof.
    pub fn validate(&self) -> Result<()> {
        if !self.parent_hash.is_zero() {
            return Err(ChainError::Config(
                "genesis parent hash must be zero".to_string(),
            ));
        }
        self.overlay()
            .ensure_final()
            .map_err(|e| ChainError::Config(format!("genesis block is not final: {e}")))
    }
}

/// Block store backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Disk,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "disk" => Ok(StoreBackend::Disk),
            _ => Err(format!(
                "Invalid store backend: {s}. Valid options: memory, disk"
            )),
        }
    }
}

struct Settings {
    genesis: Option<GenesisConfig>,
    backend: StoreBackend,
    store_root: PathBuf,
}

/// Process-wide configuration, seeded from the environment once.
pub struct Config {
    inner: RwLock<Settings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let backend = env::var(STORE_BACKEND_KEY)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(StoreBackend::Memory);
        let store_root = env::var(STORE_PATH_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_ROOT));

        Config {
            inner: RwLock::new(Settings {
                genesis: None,
                backend,
                store_root,
            }),
        }
    }

    /// The installed genesis, falling back to the dev genesis when none has
    /// been injected yet.
    pub fn genesis(&self) -> GenesisConfig {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner.genesis.clone().unwrap_or_else(GenesisConfig::dev)
    }

    /// Install the genesis configuration. Re-installing the same genesis is
    /// a no-op; a conflicting one is rejected, since every node in this
    /// process must agree on the chain root.
    pub fn install_genesis(&self, genesis: GenesisConfig) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        match &inner.genesis {
            Some(existing) if *existing != genesis => Err(ChainError::Config(
                "conflicting genesis already installed".to_string(),
            )),
            _ => {
                inner.genesis = Some(genesis);
                Ok(())
            }
        }
    }

    pub fn store_backend(&self) -> StoreBackend {
        self.inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen")
            .backend
    }

    pub fn set_store_backend(&self, backend: StoreBackend) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.backend = backend;
    }

    pub fn set_store_root(&self, root: PathBuf) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.store_root = root;
    }

    /// Per-node database directory, so several nodes can share one machine
    /// with isolated stores.
    pub fn node_store_path(&self, port: u16) -> PathBuf {
        self.inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen")
            .store_root
            .join(format!("node_{port}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_genesis_is_valid() {
        let genesis = GenesisConfig::dev();
        assert!(genesis.validate().is_ok());

        let block = genesis.overlay();
        assert_eq!(block.get_height(), 0);
        assert!(block.get_parent_hash().is_zero());
        assert_eq!(block.get_timestamp(), Some(genesis.timestamp));
    }

    #[test]
    fn test_generate_produces_final_genesis() {
        let genesis = GenesisConfig::generate(Hash::digest(b"custom-root"), 99);
        assert!(genesis.validate().is_ok());
        assert!(genesis.overlay().ensure_final().is_ok());
    }

    #[test]
    fn test_install_genesis_conflicts() {
        let config = Config::new();
        let first = GenesisConfig::dev();
        config.install_genesis(first.clone()).unwrap();
        // Same genesis again is fine.
        config.install_genesis(first.clone()).unwrap();
        assert_eq!(config.genesis(), first);

        let other = GenesisConfig::generate(Hash::digest(b"other-root"), 7);
        assert!(matches!(
            config.install_genesis(other),
            Err(ChainError::Config(_))
        ));
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("Disk".parse::<StoreBackend>().unwrap(), StoreBackend::Disk);
        assert!("tape".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_node_store_path_isolates_nodes() {
        let config = Config::new();
        config.set_store_root(PathBuf::from("chain-data"));
        assert_eq!(
            config.node_store_path(7001),
            PathBuf::from("chain-data").join("node_7001")
        );
        assert_ne!(config.node_store_path(7001), config.node_store_path(7002));
    }
}
