//! Wire codec
//!
//! Every frame on the wire is a 4-byte big-endian length prefix followed by
//! the bincode encoding of one [`Message`]. The codec is versionless and
//! round-trips every message tag losslessly.

use crate::core::{Block, Hash};
use crate::error::{ChainError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// Sanity cap for a single frame
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Every message peers exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Message {
    /// Liveness probe; the counter is echoed back
    Ping(u64),
    Pong(u64),
    BlockQuery(BlockQuery),
    BlockResponse(BlockResponse),
    /// Gossip of a newly mined block
    Announce(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum BlockQuery {
    Genesis,
    Highest,
    Ancestry(Hash),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum BlockResponse {
    Block(Block),
    /// Oldest first
    Chain(Vec<Block>),
    Failed(QueryError),
}

/// Query failures a node answers with over the wire.
///
/// `InvalidBlockQuery` stays in the vocabulary for remote implementations
/// even though the typed decoder cannot produce an unrecognised query shape
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum QueryError {
    UnknownBlockHash,
    InvalidBlockQuery,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownBlockHash => write!(f, "unknown block hash"),
            QueryError::InvalidBlockQuery => write!(f, "invalid block query"),
        }
    }
}

impl From<QueryError> for ChainError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::UnknownBlockHash => ChainError::UnknownBlockHash,
            QueryError::InvalidBlockQuery => ChainError::InvalidBlockQuery,
        }
    }
}

pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    serialize(msg)
}

pub fn decode(bytes: &[u8]) -> Result<Message> {
    deserialize(bytes)
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = encode(msg)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ChainError::Network(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_BYTES} byte cap",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame. Blocks until a full frame arrives.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(ChainError::Network(format!("invalid frame length {len}")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    decode(&payload)
}
