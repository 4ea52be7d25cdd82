// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # idenlink: Identity Layer Core
//!
//! Compact identifiers for decentralized identities, and a way for those
//! identities to log in.
//!
//! An identity is named by a 31-byte **ID**: two type bytes (DID method,
//! blockchain, network), 27 genesis bytes fixed by the identity's first
//! state, and a 2-byte checksum. IDs render as base58 and embed in DIDs
//! such as `did:iden3:polygon:main:<id>`. The DID text and the ID bytes
//! must agree; nothing is ever silently corrected.
//!
//! On top sits a challenge/response protocol. A relying party issues a
//! single-use nonce, the client answers with a **signed packet** carrying
//! proof of work and a merkle proof that its signing key is authorized by
//! the identity's state, and the relying party verifies the lot.
//!
//! ## Architecture
//!
//! - **config**: Layout constants and [`AuthConfig`](config::AuthConfig).
//! - **crypto**: SHA-256, BLAKE3 merkle proofs, Ed25519 keys.
//! - **identity**: Type table, checksum, [`Id`](identity::Id), DID codec.
//! - **auth**: Nonces, proof of work, proof claims, packets, verification.
//!
//! ## Design Philosophy
//!
//! 1. The codec is pure. Shared state lives in the nonce store only.
//! 2. Every failure is a typed error value; library code does not panic.
//! 3. Collaborators (state backends, proof checkers, clocks) are traits.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod identity;
