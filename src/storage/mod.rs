//! Block persistence
//!
//! Content-addressed storage with an in-memory backend for tests and a sled
//! backend for durable nodes.

pub mod block_store;

pub use block_store::BlockStore;
