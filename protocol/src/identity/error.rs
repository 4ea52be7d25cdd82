//! Error types for the identity codec.
//!
//! Every codec failure is a plain value. Nothing here panics and nothing is
//! auto-corrected: a corrupted ID or a DID whose segments disagree with its
//! embedded ID is rejected, never repaired.

use std::fmt;
use thiserror::Error;

/// Which DID segment disagreed with the bytes embedded in the ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DidField {
    Method,
    Blockchain,
    Network,
}

impl fmt::Display for DidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DidField::Method => "method",
            DidField::Blockchain => "blockchain",
            DidField::Network => "network",
        })
    }
}

/// Errors raised while building, parsing or converting IDs and DIDs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Wrong byte length or undecodable text.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// The trailing two bytes don't match the checksum of the first 29.
    #[error("ID checksum mismatch")]
    ChecksumMismatch,

    /// The method is not in the type table.
    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),

    /// The method is known but the blockchain/network pair (or byte) is not.
    #[error("unsupported network for method {method}: {detail}")]
    UnsupportedNetwork {
        /// Method the lookup was made for.
        method: String,
        /// The pair or byte that had no entry.
        detail: String,
    },

    /// A DID segment disagrees with the value decoded from the ID bytes.
    #[error("{field} mismatch: found {in_id:?} in ID but {in_did:?} in DID")]
    FieldMismatch {
        /// The segment that disagreed.
        field: DidField,
        /// Value decoded from the ID.
        in_id: String,
        /// Value written in the DID string.
        in_did: String,
    },

    /// The DID string is syntactically invalid or has the wrong shape.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// The ID belongs to an unknown method and cannot be rendered as a DID.
    #[error("ID of an unsupported DID method has no canonical DID")]
    UnsupportedDid,

    /// The genesis was not built from a chain address.
    #[error("ID is not chain-address derived: high genesis bytes are not zero")]
    NotChainDerived,

    /// The identity state does not fit in 256 bits.
    #[error("identity state is {0} bytes wide, at most 32 allowed")]
    StateOutOfRange(usize),
}
