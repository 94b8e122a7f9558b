// This is my block store - every block a node ever accepts ends up in here
// I'm using Sled as an embedded database for the durable backend, and I keep
// a plain in-memory map around so tests don't have to touch the disk at all
// Blocks are content-addressed: the raw 32-byte hash is the only key I need

use crate::core::{Block, Hash};
use crate::error::{ChainError, Result};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

// I use this constant to organize my database storage
const BLOCKS_TREE: &str = "blocks"; // Tree name for storing all blocks

/// Content-addressed block persistence.
///
/// This is my storage handle - I made it cloneable so the coordinator and
/// any helper can share one backend. Each operation is individually atomic;
/// nothing here needs multi-key transactions.
#[derive(Clone)]
pub struct BlockStore {
    backend: Arc<Backend>,
}

// I support two backends behind the same operations:
// - Memory: a locked HashMap, perfect for tests and throwaway nodes
// - Disk: a Sled tree, so a real node survives a restart
enum Backend {
    Memory(RwLock<HashMap<Hash, Block>>),
    Disk {
        // Held so the database outlives the tree handle.
        _db: Db,
        tree: Tree,
    },
}

impl BlockStore {
    // When I want a throwaway store that lives and dies with the process
    pub fn memory() -> BlockStore {
        BlockStore {
            backend: Arc::new(Backend::Memory(RwLock::new(HashMap::new()))),
        }
    }

    // When I want a durable store, I open the Sled database at the given
    // path and keep a dedicated tree for blocks
    pub fn open(path: &Path) -> Result<BlockStore> {
        let db = sled::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {e}")))?;
        let tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Ok(BlockStore {
            backend: Arc::new(Backend::Disk { _db: db, tree }),
        })
    }

    /// Persist a block under its hash. Storing an equal block twice is a
    /// no-op; the block is handed back unchanged.
    pub fn store(&self, block: &Block) -> Result<Block> {
        match &*self.backend {
            Backend::Memory(map) => {
                let mut map = map
                    .write()
                    .map_err(|_| ChainError::Database("block map lock poisoned".to_string()))?;
                map.insert(*block.get_hash(), block.clone());
            }
            Backend::Disk { tree, .. } => {
                let bytes = block.serialize()?;
                tree.insert(block.get_hash().as_bytes(), bytes)
                    .map_err(|e| ChainError::Database(format!("Failed to store block: {e}")))?;
            }
        }
        Ok(block.clone())
    }

    // When I want to look a block up by its hash alone
    pub fn find_by_hash(&self, hash: &Hash) -> Result<Block> {
        match &*self.backend {
            Backend::Memory(map) => {
                let map = map
                    .read()
                    .map_err(|_| ChainError::Database("block map lock poisoned".to_string()))?;
                map.get(hash).cloned().ok_or(ChainError::NotFound)
            }
            Backend::Disk { tree, .. } => {
                let bytes = tree
                    .get(hash.as_bytes())
                    .map_err(|e| ChainError::Database(format!("Failed to get block: {e}")))?
                    .ok_or(ChainError::NotFound)?;
                Block::deserialize(bytes.as_ref())
            }
        }
    }

    // When I need the lookup to agree on position too - I fetch by hash and
    // then check the height, so I don't need a secondary index
    pub fn find_by_hash_and_height(&self, hash: &Hash, height: u64) -> Result<Block> {
        let block = self.find_by_hash(hash)?;
        if block.get_height() == height {
            Ok(block)
        } else {
            Err(ChainError::NotFound)
        }
    }

    pub fn remove(&self, hash: &Hash) -> Result<()> {
        match &*self.backend {
            Backend::Memory(map) => {
                let mut map = map
                    .write()
                    .map_err(|_| ChainError::Database("block map lock poisoned".to_string()))?;
                map.remove(hash).map(|_| ()).ok_or(ChainError::NotFound)
            }
            Backend::Disk { tree, .. } => tree
                .remove(hash.as_bytes())
                .map_err(|e| ChainError::Database(format!("Failed to remove block: {e}")))?
                .map(|_| ())
                .ok_or(ChainError::NotFound),
        }
    }

    // When a durable node restarts I need every stored block back, in no
    // particular order, so the coordinator can rebuild its chain
    pub fn all_blocks(&self) -> Result<Vec<Block>> {
        match &*self.backend {
            Backend::Memory(map) => {
                let map = map
                    .read()
                    .map_err(|_| ChainError::Database("block map lock poisoned".to_string()))?;
                Ok(map.values().cloned().collect())
            }
            Backend::Disk { tree, .. } => {
                let mut blocks = Vec::new();
                for entry in tree.iter() {
                    let (_, bytes) = entry
                        .map_err(|e| ChainError::Database(format!("Failed to scan blocks: {e}")))?;
                    blocks.push(Block::deserialize(bytes.as_ref())?);
                }
                Ok(blocks)
            }
        }
    }

    pub fn count(&self) -> usize {
        match &*self.backend {
            Backend::Memory(map) => map.read().map(|m| m.len()).unwrap_or(0),
            Backend::Disk { tree, .. } => tree.len(),
        }
    }

    // I only use this from tests, to reset a store between scenarios
    pub fn clear(&self) -> Result<()> {
        match &*self.backend {
            Backend::Memory(map) => {
                let mut map = map
                    .write()
                    .map_err(|_| ChainError::Database("block map lock poisoned".to_string()))?;
                map.clear();
                Ok(())
            }
            Backend::Disk { tree, .. } => tree
                .clear()
                .map_err(|e| ChainError::Database(format!("Failed to clear blocks tree: {e}"))),
        }
    }
}
