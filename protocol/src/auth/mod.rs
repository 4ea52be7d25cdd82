//! # Authentication Module
//!
//! Challenge/response authentication of identities with signed packets.
//!
//! ```text
//!   ┌────────┐                                  ┌───────────────┐
//!   │ Client │                                  │ Relying party │
//!   └───┬────┘                                  └──────┬────────┘
//!       │  1. IdenAssertRequest { origin, nonce }      │  NonceStore::issue
//!       │◄─────────────────────────────────────────────┤
//!       │                                              │
//!       │  2. SignedPacket (work + KSign proof + sig)  │
//!       ├─────────────────────────────────────────────►│  PacketVerifier
//!       │                                              │
//!       │  3. IdenAssertResult { id, did, name }       │
//!       │◄─────────────────────────────────────────────┤
//! ```
//!
//! The relying party owns its [`NonceStore`] and hands it to the verifier
//! per call, so several configurations can coexist in one process.
//!
//! Identity state is reached only through the [`IdenStateReader`] and
//! [`ProofClaimVerifier`] traits. [`InMemoryStateReader`] and
//! [`StateProofVerifier`] are the implementations shipped here.

pub mod clock;
pub mod error;
pub mod nonce;
pub mod packet;
pub mod pow;
pub mod proof;
pub mod state;
pub mod verify;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, NonceError, ProofError, StateError};
pub use nonce::{Nonce, NonceEntry, NonceStore};
pub use packet::{
    IdenAssertData, IdenAssertRequest, NameAssertion, PacketHeader, PacketPayload, PacketSigner,
    PacketType, SignedPacket, UnsignedPacket,
};
pub use pow::{
    canonical_json, check_pow, compute_pow, compute_pow_cancellable, leading_zero_bits, pow_hash,
    solve_with_timeout, PowData,
};
pub use proof::{Claim, ClaimSet, ProofClaim, ProofClaimVerifier, StateProofVerifier};
pub use state::{IdenStateData, IdenStateReader, InMemoryStateReader};
pub use verify::{IdenAssertResult, PacketVerifier, VerifiedPacket};
