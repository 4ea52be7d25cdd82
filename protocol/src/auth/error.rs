//! Error types for the authentication protocol.
//!
//! Each collaborator has its own enum ([`NonceError`], [`ProofError`],
//! [`StateError`]) and [`AuthError`] wraps them, one variant per
//! verification step, so callers can tell "expired" from "replayed" from
//! "bad signature".

use thiserror::Error;

use crate::crypto::signatures::SignatureError;
use crate::identity::IdentityError;

/// Failures of [`NonceStore`](super::NonceStore) consumption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonceError {
    /// No challenge with this nonce was ever issued here (or it was purged).
    #[error("unknown nonce")]
    UnknownNonce,

    /// The challenge outlived its TTL before it was answered.
    #[error("challenge expired at {expires_at}")]
    Expired {
        /// Unix seconds at which the challenge stopped being valid.
        expires_at: i64,
    },

    /// The challenge was already answered once.
    #[error("challenge already consumed")]
    AlreadyConsumed,

    /// The challenge was issued to a different origin.
    #[error("challenge issued to {expected:?}, presented by {got:?}")]
    OriginMismatch {
        /// Origin the challenge was issued to.
        expected: String,
        /// Origin it was presented for.
        got: String,
    },
}

/// Failures of the identity-state backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The backend could not be queried.
    #[error("identity state unavailable: {0}")]
    Unavailable(String),

    /// A state transition would move an identity's history backwards.
    #[error("state at block {block} is older than the latest known block {latest}")]
    OutOfOrder {
        /// Latest recorded block.
        latest: u64,
        /// Block of the rejected transition.
        block: u64,
    },
}

/// Reasons a [`ProofClaim`](super::ProofClaim) does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    /// The claim leaf is not included under the claimed root.
    #[error("claim is not included under root {0}")]
    NotIncluded(String),

    /// The root was never the identity's state at the claimed date.
    #[error("root {root} is not a state of {id} at {date}")]
    UnknownState {
        /// Identity the proof is about.
        id: String,
        /// Root carried by the proof.
        root: String,
        /// Date carried by the proof.
        date: i64,
    },

    /// The claim is not of the kind this check needs.
    #[error("unexpected claim: {0}")]
    UnexpectedClaim(String),

    /// The claim authorizes a different key.
    #[error("claim authorizes a different key")]
    KeyMismatch,

    /// The proof is about another identity.
    #[error("proof is about {in_proof} but packet issuer is {issuer}")]
    IdMismatch {
        /// ID in the proof.
        in_proof: String,
        /// ID of the packet issuer.
        issuer: String,
    },

    /// The name proof comes from an identity the verifier does not trust to
    /// assign names.
    #[error("{0} is not a trusted name authority")]
    UntrustedAuthority(String),

    /// The state backend failed while checking the proof.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Errors of the signed-packet protocol, one per verification step.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The packet is past its expiry or older than the accepted age.
    #[error("packet expired")]
    Expired,

    /// The packet claims to be issued further in the future than clock skew allows.
    #[error("packet not yet valid")]
    NotYetValid,

    /// The challenge nonce was unknown, expired, replayed or issued elsewhere.
    #[error("invalid or reused challenge: {0}")]
    InvalidOrReusedChallenge(#[from] NonceError),

    /// The packet did not carry enough proof of work.
    #[error("insufficient work: required {required} leading zero bits, got {actual}")]
    InsufficientWork {
        /// Bits demanded by configuration.
        required: u32,
        /// Bits found on the packet hash.
        actual: u32,
    },

    /// A key or name proof failed.
    #[error("invalid proof: {0}")]
    InvalidProof(#[from] ProofError),

    /// The signature does not verify under the header's signing key.
    #[error("invalid signature")]
    InvalidSignature,

    /// The packet answers a challenge for a different origin.
    #[error("packet is for origin {got:?}, expected {expected:?}")]
    OriginMismatch {
        /// The verifier's origin.
        expected: String,
        /// The origin in the packet.
        got: String,
    },

    /// The packet is missing a section its type requires.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The issuer DID did not decode.
    #[error("issuer identity: {0}")]
    Identity(#[from] IdentityError),

    /// Proof-of-work search gave up.
    #[error("proof of work not found within {timeout_ms}ms")]
    WorkTimeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Proof-of-work search was cancelled by the caller.
    #[error("proof of work cancelled")]
    WorkCancelled,

    /// A packet could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic rejection returned when error redaction is enabled.
    #[error("authentication rejected")]
    Rejected,
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Serialization(e.to_string())
    }
}

impl From<SignatureError> for AuthError {
    fn from(_: SignatureError) -> Self {
        AuthError::InvalidSignature
    }
}
