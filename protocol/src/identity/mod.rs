//! # Identity Module
//!
//! Identifiers for identities of the network and their DID string form.
//!
//! The stack is layered, leaf first:
//!
//! 1. **Checksum**: 16-bit little-endian byte sum guarding every ID.
//! 2. **Network**: the `const` type table mapping method, blockchain and
//!    network to the two type bytes.
//! 3. **Id**: the 31-byte identifier, its base58 text form and its genesis
//!    derivations (from state or from a chain address).
//! 4. **Did**: syntax-only parser for generic DID strings.
//! 5. **Codec**: DID ⇄ ID conversion with cross-checks, plus the hashed
//!    fallback for DIDs of foreign methods.
//!
//! ## Design Decisions
//!
//! - Everything in here is pure. No I/O, no shared state, no panics: every
//!   failure is an [`IdentityError`] value.
//! - An [`Id`] can only be obtained through a constructor that computes or
//!   verifies its checksum.
//! - Decoding never repairs anything. If the DID text and the ID bytes
//!   disagree, the DID is rejected.

pub mod checksum;
pub mod codec;
pub mod did;
pub mod error;
pub mod id;
pub mod network;

pub use checksum::{checksum, verify_checksum};
pub use codec::{
    compose, decompose, decompose_str, did_from_genesis, did_from_id, did_genesis_from_state,
    id_from_did, id_from_unsupported_did, DidParts, UNSUPPORTED_DID_TYPE,
};
pub use did::Did;
pub use error::{DidField, IdentityError};
pub use id::{genesis_from_chain_address, Id};
pub use network::{
    build_did_type, build_did_type_on_chain, decode_type, find_network_by_byte, Blockchain,
    DidMethod, NetworkId,
};
