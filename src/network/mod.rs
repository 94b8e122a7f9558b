//! Peer-to-peer networking
//!
//! The actor set of one node: a listener accepting sockets, short-lived
//! connectors dialing out, one peer per connection, and a single coordinator
//! that owns the chain and multiplexes everything. Messages travel as
//! length-prefixed bincode frames.

pub mod connector;
pub mod listener;
pub mod logic;
pub mod node;
pub mod peer;
pub mod registry;
pub mod supervisor;
pub mod wire;

pub use listener::Listener;
pub use logic::{ChainSnapshot, LogicEvent, LogicHandle};
pub use node::{connect, start, Handle, NodeUri};
pub use peer::{Direction, PeerHandle, PeerId};
pub use registry::{Registry, RegistryEntry, Role, REGISTRY};
pub use supervisor::Supervisor;
pub use wire::{BlockQuery, BlockResponse, Message, QueryError};
