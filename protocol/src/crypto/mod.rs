//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited implementations: SHA-256 and BLAKE3
//! for hashing and merkle proofs, Ed25519 for the keys identities authorize
//! to sign for them. Nothing in here knows what an identity is.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{
    domain_separated_hash, merkle_proof, merkle_root, sha256, verify_merkle_proof, Hash256,
    MerkleProof,
};
pub use keys::{KeyError, PublicKey, Signature, SigningKeypair};
pub use signatures::{sign, verify, verify_checked, SignatureError};
