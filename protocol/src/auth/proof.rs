//! # Proof Claims
//!
//! A signing key speaks for an identity only if the identity's state says
//! so. A [`ProofClaim`] carries that statement: a [`Claim`], the state root
//! it is included under, the merkle path, and the date at which the root was
//! the identity's state.
//!
//! [`StateProofVerifier`] accepts a proof when
//!
//! 1. the claim's leaf hashes up to `root` along the merkle path, and
//! 2. `root` is bound to the identity: either it is the genesis state the ID
//!    was minted from, or the [`IdenStateReader`] reports it as the
//!    identity's state at `date`.
//!
//! Leaves are BLAKE3 in derive-key mode over a tagged binary encoding of the
//! claim, so a key-authorization leaf can never be read as a name leaf.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::ProofError;
use super::state::IdenStateReader;
use crate::crypto::hash::{
    domain_separated_hash, merkle_proof, merkle_root, verify_merkle_proof, Hash256, MerkleProof,
};
use crate::crypto::keys::PublicKey;
use crate::identity::Id;

const CLAIM_LEAF_CONTEXT: &str = "idenlink 2024 claim leaf v1";

const TAG_AUTHORIZE_KSIGN: u8 = 0x01;
const TAG_ASSIGN_NAME: u8 = 0x02;

/// A statement an identity makes in its claims tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Claim {
    /// `public_key` may sign on behalf of the identity.
    #[serde(rename_all = "camelCase")]
    AuthorizeKSign { public_key: PublicKey },
    /// The identity `id` is known by `name`.
    AssignName { name: String, id: Id },
}

impl Claim {
    /// Merkle leaf of this claim.
    pub fn leaf(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(64);
        match self {
            Claim::AuthorizeKSign { public_key } => {
                buf.push(TAG_AUTHORIZE_KSIGN);
                buf.extend_from_slice(public_key.as_bytes());
            }
            Claim::AssignName { name, id } => {
                buf.push(TAG_ASSIGN_NAME);
                buf.extend_from_slice(id.as_bytes());
                buf.extend_from_slice(name.as_bytes());
            }
        }
        Hash256(domain_separated_hash(CLAIM_LEAF_CONTEXT, &buf))
    }

    fn kind(&self) -> &'static str {
        match self {
            Claim::AuthorizeKSign { .. } => "authorizeKSign",
            Claim::AssignName { .. } => "assignName",
        }
    }
}

/// Proof that `claim` is included in the state `root` of identity `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaim {
    pub id: Id,
    pub claim: Claim,
    pub root: Hash256,
    pub proof: MerkleProof,
    /// Unix seconds at which `root` was the identity's state.
    pub date: i64,
}

/// The claims of one identity state, in tree order.
#[derive(Debug, Clone, Default)]
pub struct ClaimSet {
    claims: Vec<Claim>,
}

impl ClaimSet {
    pub fn new(claims: Vec<Claim>) -> Self {
        Self { claims }
    }

    pub fn push(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    fn leaves(&self) -> Vec<Hash256> {
        self.claims.iter().map(Claim::leaf).collect()
    }

    /// The state root committing to every claim.
    pub fn root(&self) -> Hash256 {
        merkle_root(&self.leaves())
    }

    /// The state as the integer an ID genesis is derived from.
    pub fn state(&self) -> BigUint {
        BigUint::from_bytes_be(self.root().as_bytes())
    }

    /// Proof for the first claim equal to `claim`, or `None` if absent.
    pub fn prove(&self, id: Id, claim: &Claim, date: i64) -> Option<ProofClaim> {
        let index = self.claims.iter().position(|c| c == claim)?;
        let leaves = self.leaves();
        let proof = merkle_proof(&leaves, index)?;
        Some(ProofClaim {
            id,
            claim: claim.clone(),
            root: merkle_root(&leaves),
            proof,
            date,
        })
    }
}

/// Checks [`ProofClaim`]s. Implemented by whatever backs identity state.
pub trait ProofClaimVerifier: Send + Sync {
    /// Accept `proof` if it holds. With `expected_key` set, the claim must
    /// also be a key authorization for exactly that key.
    fn verify_proof_claim(
        &self,
        proof: &ProofClaim,
        expected_key: Option<&PublicKey>,
    ) -> Result<(), ProofError>;
}

/// Merkle inclusion plus state binding through an [`IdenStateReader`].
pub struct StateProofVerifier<R> {
    reader: R,
}

impl<R: IdenStateReader> StateProofVerifier<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    fn is_genesis_root(id: &Id, root: &Hash256) -> bool {
        Id::genesis_from_state(id.type_bytes(), &BigUint::from_bytes_be(root.as_bytes()))
            .map_or(false, |genesis| genesis == *id)
    }
}

impl<R: IdenStateReader> ProofClaimVerifier for StateProofVerifier<R> {
    fn verify_proof_claim(
        &self,
        proof: &ProofClaim,
        expected_key: Option<&PublicKey>,
    ) -> Result<(), ProofError> {
        if let Some(expected) = expected_key {
            match &proof.claim {
                Claim::AuthorizeKSign { public_key } if public_key == expected => {}
                Claim::AuthorizeKSign { .. } => return Err(ProofError::KeyMismatch),
                other => {
                    return Err(ProofError::UnexpectedClaim(format!(
                        "expected authorizeKSign, found {}",
                        other.kind()
                    )))
                }
            }
        }

        if !verify_merkle_proof(&proof.claim.leaf(), &proof.proof, &proof.root) {
            return Err(ProofError::NotIncluded(proof.root.to_hex()));
        }

        if Self::is_genesis_root(&proof.id, &proof.root) {
            trace!(id = %proof.id, "claim proven against genesis state");
            return Ok(());
        }

        match self.reader.get_state_by_time(&proof.id, proof.date)? {
            Some(state) if state == proof.root => {
                trace!(id = %proof.id, date = proof.date, "claim proven against published state");
                Ok(())
            }
            _ => Err(ProofError::UnknownState {
                id: proof.id.to_string(),
                root: proof.root.to_hex(),
                date: proof.date,
            }),
        }
    }
}
