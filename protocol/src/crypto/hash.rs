//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256** is the interoperable one. It derives fallback IDs for
//!   foreign DID methods and is the proof-of-work hash, because both results
//!   must be reproducible by implementations that will never link BLAKE3.
//!
//! - **BLAKE3** is the internal one. Claim leaves and the binary merkle
//!   trees of identity state use it.
//!
//! ## Merkle trees
//!
//! [`merkle_root`] builds a plain binary tree: an odd node is paired with
//! itself, and a single leaf is hashed with itself so the root is always a
//! hash output. [`merkle_proof`] and [`verify_merkle_proof`] walk the same
//! construction, so a proof produced here verifies against a root produced
//! here and nowhere else.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte digest: merkle roots, identity states, claim leaves.
///
/// Serializes as `0x`-prefixed hex in human-readable formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse hex with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", &self.to_hex()[..18])
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash256::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                serde::de::Error::custom(format!("expected 32 bytes, got {}", bytes.len()))
            })?;
            Ok(Hash256(arr))
        }
    }
}

/// SHA-256 of `data` as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// BLAKE3 in `derive_key` mode. Two contexts never collide on the same data.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash several slices as if concatenated, without the buffer.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    Hash256(blake3_hash_multi(&[left.0.as_slice(), right.0.as_slice()]))
}

/// Merkle root over `leaves`. Empty input yields [`Hash256::ZERO`].
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }
    if leaves.len() == 1 {
        return hash_pair(&leaves[0], &leaves[0]);
    }

    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    level[0]
}

/// Inclusion proof for one leaf: its position and the sibling at each level,
/// bottom up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub index: u64,
    pub siblings: Vec<Hash256>,
}

/// Build the inclusion proof for `leaves[index]`, or `None` when the index
/// is out of range.
pub fn merkle_proof(leaves: &[Hash256], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }
    if leaves.len() == 1 {
        return Some(MerkleProof {
            index: 0,
            siblings: vec![leaves[0]],
        });
    }

    let mut siblings = Vec::new();
    let mut level: Vec<Hash256> = leaves.to_vec();
    let mut idx = index;
    while level.len() > 1 {
        let sibling = if idx % 2 == 0 {
            *level.get(idx + 1).unwrap_or(&level[idx])
        } else {
            level[idx - 1]
        };
        siblings.push(sibling);
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
        idx /= 2;
    }

    Some(MerkleProof {
        index: index as u64,
        siblings,
    })
}

/// Check that `leaf` sits at `proof.index` under `root`.
pub fn verify_merkle_proof(leaf: &Hash256, proof: &MerkleProof, root: &Hash256) -> bool {
    if proof.siblings.is_empty() || proof.siblings.len() >= 64 {
        return false;
    }
    let mut node = *leaf;
    let mut idx = proof.index;
    for sibling in &proof.siblings {
        node = if idx % 2 == 0 {
            hash_pair(&node, sibling)
        } else {
            hash_pair(sibling, &node)
        };
        idx /= 2;
    }
    // Leftover index bits mean the proof claims a position the path never reached.
    idx == 0 && &node == root
}
