//! # Lattice Chain
//!
//! A peer-to-peer proof-of-work chain node. Each node owns a local chain of
//! sealed, mined blocks, persists them in a content-addressed store, and
//! exchanges them with explicit peers over a framed TCP protocol: liveness
//! pings, block queries (genesis, highest, ancestry) and gossip announces of
//! freshly mined blocks.
//!
//! ## Layout
//! - `core/`: hash values, the block record with its sealing and validation
//!   rules, and the reference miner
//! - `storage/`: the block store (in-memory and sled backends)
//! - `network/`: wire codec, peer/listener/connector actors, the per-node
//!   coordinator, the actor registry and the child supervisor
//! - `config/`: genesis parameters and store backend selection
//! - `cli/`: the node binary's command surface
//!
//! Concurrency model: message-passing actors on plain threads. One
//! coordinator per node serializes all chain mutation through its mailbox;
//! every socket is owned by exactly one peer.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;

pub use cli::{Command, Opt};
pub use config::{Config, GenesisConfig, StoreBackend, GLOBAL_CONFIG};
pub use core::{Block, Hash, HashPart, HexCase, MinerJob};
pub use error::{ChainError, Result};
pub use network::{
    connect, start, BlockQuery, BlockResponse, Handle, Message, NodeUri, QueryError,
};
pub use storage::BlockStore;
pub use utils::{current_timestamp, deserialize, serialize};
