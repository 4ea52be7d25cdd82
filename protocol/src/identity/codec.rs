//! # DID ⇄ ID Codec
//!
//! A DID of a known method spells out its method, blockchain and network
//! twice: once as text segments and once inside the type bytes of the
//! embedded ID.
//!
//! ```text
//! did:iden3:polygon:mumbai:wyFiV4w71QgWPn6bYLsZoysFay66gKtVa9kfu6yMZ
//!     ^^^^^ ^^^^^^^ ^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
//!     method chain  network   base58 ID = [0x01 0x12 | genesis | sum]
//! ```
//!
//! [`decompose`] requires both copies to agree and reports the first
//! disagreement as [`IdentityError::FieldMismatch`]. Neither side wins.
//!
//! DIDs of methods outside the type table still get a local ID through
//! [`id_from_unsupported_did`]: the SHA-256 of the full DID string, tagged
//! with the `0xFF 0xFF` type. Those IDs are cache keys only and never render
//! back into a DID.

use num_bigint::BigUint;
use tracing::debug;

use super::did::Did;
use super::error::{DidField, IdentityError};
use super::id::Id;
use super::network::{decode_type, Blockchain, DidMethod, NetworkId};
use crate::config::{GENESIS_LENGTH, MAX_DID_SEGMENTS, TYPE_LENGTH};
use crate::crypto::hash::sha256;

/// Type bytes of fallback IDs: other method, unknown chain and network.
pub const UNSUPPORTED_DID_TYPE: [u8; TYPE_LENGTH] = [0xFF, 0xFF];

/// The semantic pieces of a known-method DID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DidParts {
    pub method: DidMethod,
    pub blockchain: Blockchain,
    pub network: NetworkId,
    pub id: Id,
}

fn mismatch(field: DidField, in_id: &str, in_did: &str) -> IdentityError {
    IdentityError::FieldMismatch {
        field,
        in_id: in_id.to_string(),
        in_did: in_did.to_string(),
    }
}

/// Compose the DID of `id`. The given fields must match the ones encoded in
/// the ID, so a composed DID always decomposes.
pub fn compose(
    method: DidMethod,
    blockchain: Blockchain,
    network: NetworkId,
    id: &Id,
) -> Result<Did, IdentityError> {
    if !method.is_known() {
        return Err(IdentityError::UnsupportedMethod(format!("{:?}", method)));
    }
    let blockchain = match blockchain {
        Blockchain::NoChain => Blockchain::ReadOnly,
        other => other,
    };

    let (id_method, id_blockchain, id_network) = decode_type(id.type_bytes())?;
    if id_method != method {
        return Err(mismatch(DidField::Method, id_method.name(), method.name()));
    }
    if id_blockchain != blockchain {
        return Err(mismatch(
            DidField::Blockchain,
            id_blockchain.as_str(),
            blockchain.as_str(),
        ));
    }
    if id_network != network {
        return Err(mismatch(DidField::Network, id_network.as_str(), network.as_str()));
    }

    let mut segments = Vec::with_capacity(MAX_DID_SEGMENTS);
    segments.push(blockchain.as_str().to_string());
    if network != NetworkId::NoNetwork {
        segments.push(network.as_str().to_string());
    }
    segments.push(id.to_base58());

    Ok(Did::from_parts(method.name(), segments))
}

/// The canonical DID of `id`, with every segment taken from its type bytes.
pub fn did_from_id(id: &Id) -> Result<Did, IdentityError> {
    let method = id.method()?;
    let blockchain = id.blockchain()?;
    let network = id.network()?;
    compose(method, blockchain, network, id)
}

/// Split a known-method DID into its parts, cross-checking every segment
/// against the embedded ID.
pub fn decompose(did: &Did) -> Result<DidParts, IdentityError> {
    let method = DidMethod::from_name(&did.method)
        .ok_or_else(|| IdentityError::UnsupportedMethod(did.method.clone()))?;

    let segments = &did.id_strings;
    if segments.is_empty() || segments.len() > MAX_DID_SEGMENTS {
        return Err(IdentityError::InvalidDid(format!(
            "expected 1 to {} method-specific segments, got {}",
            MAX_DID_SEGMENTS,
            segments.len()
        )));
    }

    let (fields, id_text) = segments.split_at(segments.len() - 1);
    let id: Id = id_text[0]
        .parse()
        .map_err(|e: IdentityError| IdentityError::InvalidDid(format!("bad ID segment: {}", e)))?;

    let (id_method, id_blockchain, id_network) = decode_type(id.type_bytes())?;

    if id_method != method {
        return Err(mismatch(DidField::Method, id_method.name(), &did.method));
    }
    if let Some(blockchain) = fields.first() {
        if blockchain != id_blockchain.as_str() {
            return Err(mismatch(DidField::Blockchain, id_blockchain.as_str(), blockchain));
        }
    }
    if let Some(network) = fields.get(1) {
        if network != id_network.as_str() {
            return Err(mismatch(DidField::Network, id_network.as_str(), network));
        }
    }

    Ok(DidParts {
        method,
        blockchain: id_blockchain,
        network: id_network,
        id,
    })
}

/// [`Did::parse`] followed by [`decompose`].
pub fn decompose_str(did: &str) -> Result<DidParts, IdentityError> {
    decompose(&Did::parse(did)?)
}

/// The ID behind any DID: decoded for known methods, hashed for the rest.
pub fn id_from_did(did: &Did) -> Result<Id, IdentityError> {
    match decompose(did) {
        Ok(parts) => Ok(parts.id),
        Err(IdentityError::UnsupportedMethod(method)) => {
            debug!(method = %method, "deriving fallback ID for foreign DID method");
            Ok(id_from_unsupported_did(did))
        }
        Err(e) => Err(e),
    }
}

/// Deterministic local ID for a DID of a method outside the type table.
pub fn id_from_unsupported_did(did: &Did) -> Id {
    let digest = sha256(did.to_string().as_bytes());
    let mut genesis = [0u8; GENESIS_LENGTH];
    genesis.copy_from_slice(&digest[digest.len() - GENESIS_LENGTH..]);
    Id::new(UNSUPPORTED_DID_TYPE, genesis)
}

/// Mint the canonical DID of a new identity from its genesis state.
pub fn did_genesis_from_state(
    typ: [u8; TYPE_LENGTH],
    state: &BigUint,
) -> Result<Did, IdentityError> {
    did_from_id(&Id::genesis_from_state(typ, state)?)
}

/// DID of the identity with the given type and genesis bytes.
pub fn did_from_genesis(
    typ: [u8; TYPE_LENGTH],
    genesis: [u8; GENESIS_LENGTH],
) -> Result<Did, IdentityError> {
    did_from_id(&Id::new(typ, genesis))
}
