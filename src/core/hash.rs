//! 32-byte hash values
//!
//! Every derived identity in the chain is a SHA-256 digest. Multi-part
//! preimages join their parts with an ASCII underscore: integers render as
//! decimal strings, hashes embed as raw bytes.

use crate::error::{ChainError, Result};
use data_encoding::{HEXLOWER, HEXUPPER};
use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HASH_LEN: usize = 32;

/// Number of hex characters in the short display form
const SHORT_LEN: usize = 8;

/// Opaque 32-byte hash value
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Hash([u8; HASH_LEN]);

/// Case selector for hex rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexCase {
    Lower,
    Upper,
}

/// One part of a multi-part digest preimage
#[derive(Debug, Clone, Copy)]
pub enum HashPart<'a> {
    /// Rendered as its decimal string form
    Int(u64),
    /// Embedded as raw bytes
    Raw(&'a [u8]),
}

impl Hash {
    /// All 0x00 bytes. Marks the parent of the genesis block.
    pub const fn zero() -> Hash {
        Hash([0x00; HASH_LEN])
    }

    /// All 0xFF bytes. The "not yet set" sentinel.
    pub const fn invalid() -> Hash {
        Hash([0xFF; HASH_LEN])
    }

    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Hash {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// SHA-256 of a single byte string.
    pub fn digest(data: &[u8]) -> Hash {
        let mut context = Context::new(&SHA256);
        context.update(data);
        let digest = context.finish();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(digest.as_ref());
        Hash(out)
    }

    /// SHA-256 of several parts joined with `_`.
    pub fn digest_parts(parts: &[HashPart<'_>]) -> Hash {
        let mut preimage = Vec::new();
        for (idx, part) in parts.iter().enumerate() {
            if idx > 0 {
                preimage.push(b'_');
            }
            match part {
                HashPart::Int(n) => preimage.extend_from_slice(n.to_string().as_bytes()),
                HashPart::Raw(bytes) => preimage.extend_from_slice(bytes),
            }
        }
        Hash::digest(&preimage)
    }

    /// Parse a 64-character hex string.
    pub fn from_string(hex: &str) -> Result<Hash> {
        if hex.len() != HASH_LEN * 2 {
            return Err(ChainError::InvalidHash(format!(
                "expected {} hex characters, got {}",
                HASH_LEN * 2,
                hex.len()
            )));
        }
        let mut out = [0u8; HASH_LEN];
        let decoded = HEXLOWER
            .decode(hex.to_lowercase().as_bytes())
            .map_err(|e| ChainError::InvalidHash(format!("bad hex in {hex:?}: {e}")))?;
        out.copy_from_slice(&decoded);
        Ok(Hash(out))
    }

    /// 64-character hex rendering, lowercase.
    pub fn readable(&self) -> String {
        self.readable_as(HexCase::Lower)
    }

    pub fn readable_as(&self, case: HexCase) -> String {
        match case {
            HexCase::Lower => HEXLOWER.encode(&self.0),
            HexCase::Upper => HEXUPPER.encode(&self.0),
        }
    }

    /// First 8 hex characters, lowercase.
    pub fn readable_short(&self) -> String {
        self.readable_short_as(HexCase::Lower)
    }

    pub fn readable_short_as(&self, case: HexCase) -> String {
        let mut s = self.readable_as(case);
        s.truncate(SHORT_LEN);
        s
    }

    /// Succeeds iff the first `n` bytes are zero.
    pub fn ensure_hardness(&self, n: u32) -> Result<()> {
        let n = n as usize;
        if n <= HASH_LEN && self.0[..n].iter().all(|b| *b == 0) {
            Ok(())
        } else {
            Err(ChainError::UnmetDifficulty)
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Hash::zero()
    }

    pub fn is_invalid(&self) -> bool {
        *self == Hash::invalid()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.readable())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.readable_short())
    }
}
