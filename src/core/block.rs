use crate::config::GLOBAL_CONFIG;
use crate::core::hash::{Hash, HashPart};
use crate::error::{ChainError, Result};
use crate::storage::BlockStore;
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Difficulty grows by one zero byte every this many heights
const DIFFICULTY_STEP: u64 = 128;

/// One record in the chain.
///
/// A block is built up in stages: `new` fixes the payload identity and the
/// timestamp, `as_child_of` fixes its position in the chain, `seal` derives
/// the component hash, and mining fills `nonce` and `hash`. After that it is
/// immutable and may be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    height: u64,
    /// Unset on the zeroed block; every constructed block carries one. An
    /// absent timestamp hashes as the empty string, which is what the seal
    /// of the all-default block is defined over.
    timestamp: Option<u64>,
    parent_hash: Hash,
    content_hash: Hash,
    component_hash: Hash,
    nonce: u64,
    hash: Hash,
}

impl Block {
    /// A fresh block carrying only its payload identity and timestamp.
    pub fn new(content_hash: Hash, timestamp: u64) -> Block {
        Block {
            height: 0,
            timestamp: Some(timestamp),
            parent_hash: Hash::invalid(),
            content_hash,
            component_hash: Hash::invalid(),
            nonce: 0,
            hash: Hash::invalid(),
        }
    }

    /// Position this block directly on top of `parent`. Other fields are
    /// untouched.
    pub fn as_child_of(mut self, parent: &Block) -> Block {
        self.height = parent.height + 1;
        self.parent_hash = parent.hash;
        self
    }

    /// The statically configured genesis block: the configured fields
    /// overlaid onto a zeroed block.
    pub fn genesis() -> Block {
        GLOBAL_CONFIG.genesis().overlay()
    }

    /// Fix the component hash. Sealing an already sealed block yields the
    /// identical block.
    pub fn seal(mut self) -> Block {
        self.component_hash = self.compute_component_hash();
        self
    }

    /// Re-derive the component hash and the block hash, compare them to the
    /// stored fields, then check proof-of-work hardness. The first failing
    /// check wins: component mismatch before hash mismatch before unmet
    /// difficulty.
    pub fn ensure_final(&self) -> Result<()> {
        if self.compute_component_hash() != self.component_hash {
            return Err(ChainError::ComponentHashMismatch);
        }
        if self.compute_hash(self.nonce) != self.hash {
            return Err(ChainError::HashMismatch);
        }
        self.hash.ensure_hardness(self.difficulty())
    }

    /// Succeeds iff the store holds this block's parent at `height - 1`.
    /// A zero parent hash marks genesis and is an explicit success.
    pub fn ensure_known_parent(&self, store: &BlockStore) -> Result<()> {
        if self.parent_hash.is_zero() {
            return Ok(());
        }
        let parent_height = self.height.checked_sub(1).ok_or(ChainError::UnknownParent)?;
        match store.find_by_hash_and_height(&self.parent_hash, parent_height) {
            Ok(_) => Ok(()),
            Err(ChainError::NotFound) => Err(ChainError::UnknownParent),
            Err(e) => Err(e),
        }
    }

    /// True iff the block links to a stored parent and is internally final.
    pub fn is_mined(&self, store: &BlockStore) -> bool {
        self.ensure_known_parent(store).is_ok() && self.ensure_final().is_ok()
    }

    /// Ancestors of this block, oldest first, walking `parent_hash` through
    /// the store. The result never includes `self`. The walk ends at a zero
    /// parent hash or once `limit` ancestors have been collected; the first
    /// store error propagates.
    pub fn ancestry(&self, store: &BlockStore, limit: Option<usize>) -> Result<Vec<Block>> {
        let mut collected: Vec<Block> = Vec::new();
        let mut current = self.clone();
        loop {
            if let Some(n) = limit {
                if collected.len() >= n {
                    break;
                }
            }
            if current.parent_hash.is_zero() {
                break;
            }
            let parent_height = current.height.checked_sub(1).ok_or(ChainError::NotFound)?;
            let parent = store.find_by_hash_and_height(&current.parent_hash, parent_height)?;
            collected.push(parent.clone());
            current = parent;
        }
        collected.reverse();
        Ok(collected)
    }

    /// Whether any ancestor of this block has the given hash. A store error
    /// during the walk propagates rather than reading as "absent".
    pub fn ancestry_contains(&self, store: &BlockStore, target: &Hash) -> Result<bool> {
        let mut current = self.clone();
        while !current.parent_hash.is_zero() {
            if current.parent_hash == *target {
                return Ok(true);
            }
            let parent_height = current.height.checked_sub(1).ok_or(ChainError::NotFound)?;
            current = store.find_by_hash_and_height(&current.parent_hash, parent_height)?;
        }
        Ok(false)
    }

    /// Required leading zero bytes for a block at the given height.
    pub fn difficulty_for(height: u64) -> u32 {
        (height / DIFFICULTY_STEP + 1) as u32
    }

    /// Required leading zero bytes for this block's hash.
    pub fn difficulty(&self) -> u32 {
        Self::difficulty_for(self.height)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn get_parent_hash(&self) -> &Hash {
        &self.parent_hash
    }

    pub fn get_content_hash(&self) -> &Hash {
        &self.content_hash
    }

    pub fn get_component_hash(&self) -> &Hash {
        &self.component_hash
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_hash(&self) -> &Hash {
        &self.hash
    }

    fn compute_component_hash(&self) -> Hash {
        let timestamp = match self.timestamp {
            Some(t) => HashPart::Int(t),
            None => HashPart::Raw(b""),
        };
        Hash::digest_parts(&[
            HashPart::Int(self.height),
            timestamp,
            HashPart::Raw(self.parent_hash.as_bytes()),
            HashPart::Raw(self.content_hash.as_bytes()),
        ])
    }

    /// Candidate block hash for a given nonce, derived from the sealed
    /// component hash.
    pub(crate) fn compute_hash(&self, nonce: u64) -> Hash {
        Hash::digest_parts(&[
            HashPart::Raw(self.component_hash.as_bytes()),
            HashPart::Int(nonce),
        ])
    }

    /// Fill in the proof-of-work witness found by the miner.
    pub(crate) fn with_proof(mut self, nonce: u64, hash: Hash) -> Block {
        self.nonce = nonce;
        self.hash = hash;
        self
    }

    /// Assemble a block from explicit fields. Used to materialise the
    /// configured genesis block.
    pub(crate) fn assemble(
        height: u64,
        timestamp: u64,
        parent_hash: Hash,
        content_hash: Hash,
        component_hash: Hash,
        nonce: u64,
        hash: Hash,
    ) -> Block {
        Block {
            height,
            timestamp: Some(timestamp),
            parent_hash,
            content_hash,
            component_hash,
            nonce,
            hash,
        }
    }
}

impl Default for Block {
    /// The all-default block: nothing set, not even a timestamp.
    fn default() -> Self {
        Block {
            height: 0,
            timestamp: None,
            parent_hash: Hash::invalid(),
            content_hash: Hash::invalid(),
            component_hash: Hash::invalid(),
            nonce: 0,
            hash: Hash::invalid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::miner;
    use crate::storage::BlockStore;

    fn mined(block: Block) -> Block {
        miner::mine(block.seal())
    }

    /// Genesis plus `extra` mined descendants, all persisted; newest last.
    fn stored_chain(store: &BlockStore, extra: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis()];
        store.store(&blocks[0]).unwrap();
        for i in 0..extra {
            let parent = blocks.last().unwrap();
            let child = mined(
                Block::new(Hash::digest(format!("content-{i}").as_bytes()), 10 + i as u64)
                    .as_child_of(parent),
            );
            store.store(&child).unwrap();
            blocks.push(child);
        }
        blocks
    }

    #[test]
    fn test_new_block_starts_unset() {
        let content = Hash::digest(b"payload");
        let block = Block::new(content, 42);
        assert_eq!(block.get_height(), 0);
        assert_eq!(block.get_timestamp(), Some(42));
        assert_eq!(block.get_nonce(), 0);
        assert!(block.get_parent_hash().is_invalid());
        assert!(block.get_component_hash().is_invalid());
        assert!(block.get_hash().is_invalid());
        assert_eq!(block.get_content_hash(), &content);
    }

    #[test]
    fn test_seal_is_idempotent() {
        let once = Block::default().seal();
        let twice = once.clone().seal();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_block_seal_vector() {
        let empty = Block::default();
        assert_eq!(empty.get_timestamp(), None);

        let sealed = empty.seal();
        assert_eq!(sealed.get_component_hash().readable_short(), "e3f001a9");
        assert_eq!(
            sealed.get_component_hash().readable(),
            "e3f001a9e37821f568d5c87e9d06bff127e80592c7d1971573e4728d324ed877"
        );
    }

    #[test]
    fn test_as_child_of_links_to_parent() {
        let parent = mined(Block::new(Hash::digest(b"p"), 1));
        let child = Block::new(Hash::digest(b"c"), 2).as_child_of(&parent);
        assert_eq!(child.get_height(), parent.get_height() + 1);
        assert_eq!(child.get_parent_hash(), parent.get_hash());
        // Payload fields untouched
        assert_eq!(child.get_content_hash(), &Hash::digest(b"c"));
        assert_eq!(child.get_timestamp(), Some(2));
    }

    #[test]
    fn test_ensure_final_accepts_mined_block() {
        let block = mined(Block::new(Hash::digest(b"ok"), 5));
        assert!(block.ensure_final().is_ok());
        assert!(block
            .get_hash()
            .ensure_hardness(block.difficulty())
            .is_ok());
    }

    #[test]
    fn test_ensure_final_error_ordering() {
        let good = mined(Block::new(Hash::digest(b"x"), 5));

        // Forged seal reports the component mismatch first, even though the
        // hash no longer matches either.
        let mut forged_seal = good.clone();
        forged_seal.component_hash = Hash::digest(b"forged");
        assert_eq!(forged_seal.ensure_final(), Err(ChainError::ComponentHashMismatch));

        // Intact seal, wrong proof.
        let mut forged_hash = good.clone();
        forged_hash.hash = Hash::digest(b"wrong");
        assert_eq!(forged_hash.ensure_final(), Err(ChainError::HashMismatch));

        // Consistent fields that merely miss the difficulty target.
        let mut soft = good.clone();
        soft.nonce = good.get_nonce() + 1;
        soft.hash = soft.compute_hash(soft.nonce);
        if soft.hash.ensure_hardness(soft.difficulty()).is_err() {
            assert_eq!(soft.ensure_final(), Err(ChainError::UnmetDifficulty));
        }
    }

    #[test]
    fn test_difficulty_schedule() {
        assert_eq!(Block::difficulty_for(0), 1);
        assert_eq!(Block::difficulty_for(127), 1);
        assert_eq!(Block::difficulty_for(128), 2);
        assert_eq!(Block::difficulty_for(255), 2);
        assert_eq!(Block::difficulty_for(256), 3);
    }

    #[test]
    fn test_genesis_is_final_and_parentless() {
        let genesis = Block::genesis();
        assert_eq!(genesis.get_height(), 0);
        assert!(genesis.get_parent_hash().is_zero());
        assert!(genesis.ensure_final().is_ok());

        let store = BlockStore::memory();
        assert!(genesis.ensure_known_parent(&store).is_ok());
        assert_eq!(genesis.ancestry(&store, None).unwrap(), vec![]);
    }

    #[test]
    fn test_ensure_known_parent() {
        let store = BlockStore::memory();
        let chain = stored_chain(&store, 2);
        let head = chain.last().unwrap();
        assert!(head.ensure_known_parent(&store).is_ok());

        let orphan = mined(Block::new(Hash::digest(b"orphan"), 9).as_child_of(head));
        store.remove(head.get_hash()).unwrap();
        assert_eq!(
            orphan.ensure_known_parent(&store),
            Err(ChainError::UnknownParent)
        );
    }

    #[test]
    fn test_is_mined() {
        let store = BlockStore::memory();
        let chain = stored_chain(&store, 1);
        let head = chain.last().unwrap();

        let child = Block::new(Hash::digest(b"next"), 3).as_child_of(head);
        let sealed = child.clone().seal();
        assert!(!sealed.is_mined(&store)); // no proof yet

        let done = miner::mine(sealed);
        assert!(done.is_mined(&store));
    }

    #[test]
    fn test_ancestry_walk() {
        let store = BlockStore::memory();
        let chain = stored_chain(&store, 3);
        let head = chain.last().unwrap();

        // Full walk: everything older than head, oldest first.
        let ancestors = head.ancestry(&store, None).unwrap();
        assert_eq!(ancestors, chain[..chain.len() - 1].to_vec());

        // Bounded walk keeps the nearest two ancestors, still oldest first.
        let nearest = head.ancestry(&store, Some(2)).unwrap();
        assert_eq!(nearest, chain[chain.len() - 3..chain.len() - 1].to_vec());

        // k-block chain: head has exactly k-1 ancestors.
        assert_eq!(ancestors.len(), chain.len() - 1);
    }

    #[test]
    fn test_ancestry_propagates_store_miss() {
        let store = BlockStore::memory();
        let chain = stored_chain(&store, 2);
        let head = chain.last().unwrap();
        store.remove(chain[1].get_hash()).unwrap();
        assert_eq!(head.ancestry(&store, None), Err(ChainError::NotFound));
        assert_eq!(
            head.ancestry_contains(&store, chain[0].get_hash()),
            Err(ChainError::NotFound)
        );
    }

    #[test]
    fn test_ancestry_contains() {
        let store = BlockStore::memory();
        let chain = stored_chain(&store, 3);
        let head = chain.last().unwrap();

        assert!(head.ancestry_contains(&store, chain[0].get_hash()).unwrap());
        assert!(head.ancestry_contains(&store, chain[2].get_hash()).unwrap());
        assert!(!head
            .ancestry_contains(&store, &Hash::digest(b"elsewhere"))
            .unwrap());
        assert!(!head.ancestry_contains(&store, head.get_hash()).unwrap());
    }

    #[test]
    fn test_block_serialization_roundtrip() {
        let block = mined(Block::new(Hash::digest(b"wire"), 77));
        let bytes = block.serialize().unwrap();
        assert_eq!(Block::deserialize(&bytes).unwrap(), block);
    }
}
