//! # Identity IDs
//!
//! An ID is 31 bytes, fixed forever at identity genesis:
//!
//! ```text
//! [ type : 2 ][ genesis : 27 ][ checksum : 2 ]
//!   method      state-derived     LE sum of the
//!   network     or chain addr     29 bytes before
//! ```
//!
//! The textual form is base58 (bitcoin alphabet). Every constructor that
//! accepts bytes from outside ([`Id::from_bytes`], [`Id::from_str`], serde)
//! verifies the checksum, so a value of type [`Id`] is always well formed.
//!
//! ## Genesis
//!
//! - From state: the identity's first state commitment is encoded big-endian,
//!   left-padded to 32 bytes, and the low-order 27 bytes become the genesis.
//! - From a chain address: seven zero bytes followed by the 20-byte address.
//!   The zero prefix is what [`Id::chain_address`] checks on the way back.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::checksum::{checksum, verify_checksum};
use super::error::IdentityError;
use super::network::{decode_type, Blockchain, DidMethod, NetworkId, METHOD_ON_CHAIN_FLAG};
use crate::config::{
    CHAIN_ADDRESS_LENGTH, CHECKSUM_LENGTH, GENESIS_LENGTH, ID_LENGTH, STATE_LENGTH, TYPE_LENGTH,
};

const GENESIS_START: usize = TYPE_LENGTH;
const CHECKSUM_START: usize = TYPE_LENGTH + GENESIS_LENGTH;
const CHAIN_ADDRESS_PADDING: usize = GENESIS_LENGTH - CHAIN_ADDRESS_LENGTH;

/// A checksum-protected identity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; ID_LENGTH]);

impl Id {
    /// Build an ID from its type and genesis, appending the checksum.
    pub fn new(typ: [u8; TYPE_LENGTH], genesis: [u8; GENESIS_LENGTH]) -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        bytes[..GENESIS_START].copy_from_slice(&typ);
        bytes[GENESIS_START..CHECKSUM_START].copy_from_slice(&genesis);
        bytes[CHECKSUM_START..].copy_from_slice(&checksum(&typ, &genesis));
        Self(bytes)
    }

    /// Parse raw bytes. The length must be exact and the checksum must hold.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; ID_LENGTH] = bytes.try_into().map_err(|_| {
            IdentityError::MalformedEncoding(format!(
                "ID must be {} bytes, got {}",
                ID_LENGTH,
                bytes.len()
            ))
        })?;
        let id = Self(bytes);
        if !verify_checksum(&id.type_bytes(), &id.genesis(), &id.checksum()) {
            return Err(IdentityError::ChecksumMismatch);
        }
        Ok(id)
    }

    /// Derive the ID minted from an identity's genesis state.
    pub fn genesis_from_state(
        typ: [u8; TYPE_LENGTH],
        state: &BigUint,
    ) -> Result<Self, IdentityError> {
        let be = state.to_bytes_be();
        if be.len() > STATE_LENGTH {
            return Err(IdentityError::StateOutOfRange(be.len()));
        }
        let mut padded = [0u8; STATE_LENGTH];
        padded[STATE_LENGTH - be.len()..].copy_from_slice(&be);

        let mut genesis = [0u8; GENESIS_LENGTH];
        genesis.copy_from_slice(&padded[STATE_LENGTH - GENESIS_LENGTH..]);
        Ok(Self::new(typ, genesis))
    }

    /// ID of an identity whose genesis is a chain account.
    pub fn from_chain_address(typ: [u8; TYPE_LENGTH], address: [u8; CHAIN_ADDRESS_LENGTH]) -> Self {
        Self::new(typ, genesis_from_chain_address(address))
    }

    /// Recover the chain address this ID was derived from.
    pub fn chain_address(&self) -> Result<[u8; CHAIN_ADDRESS_LENGTH], IdentityError> {
        let genesis = self.genesis();
        let (padding, address) = genesis.split_at(CHAIN_ADDRESS_PADDING);
        if padding.iter().any(|b| *b != 0) {
            return Err(IdentityError::NotChainDerived);
        }
        let mut out = [0u8; CHAIN_ADDRESS_LENGTH];
        out.copy_from_slice(address);
        Ok(out)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    pub fn type_bytes(&self) -> [u8; TYPE_LENGTH] {
        [self.0[0], self.0[1]]
    }

    pub fn method_byte(&self) -> u8 {
        self.0[0]
    }

    pub fn network_byte(&self) -> u8 {
        self.0[1]
    }

    pub fn genesis(&self) -> [u8; GENESIS_LENGTH] {
        let mut out = [0u8; GENESIS_LENGTH];
        out.copy_from_slice(&self.0[GENESIS_START..CHECKSUM_START]);
        out
    }

    pub fn checksum(&self) -> [u8; CHECKSUM_LENGTH] {
        [self.0[CHECKSUM_START], self.0[CHECKSUM_START + 1]]
    }

    /// True for fallback IDs of foreign DID methods.
    pub fn is_unsupported(&self) -> bool {
        self.method_byte() == DidMethod::Other.byte()
    }

    /// True when the identity's state is managed by an on-chain contract.
    pub fn is_on_chain(&self) -> bool {
        !self.is_unsupported() && self.method_byte() & METHOD_ON_CHAIN_FLAG != 0
    }

    fn decode_known(&self) -> Result<(DidMethod, Blockchain, NetworkId), IdentityError> {
        if self.is_unsupported() {
            return Err(IdentityError::UnsupportedDid);
        }
        decode_type(self.type_bytes())
    }

    pub fn method(&self) -> Result<DidMethod, IdentityError> {
        self.decode_known().map(|(m, _, _)| m)
    }

    pub fn blockchain(&self) -> Result<Blockchain, IdentityError> {
        self.decode_known().map(|(_, b, _)| b)
    }

    pub fn network(&self) -> Result<NetworkId, IdentityError> {
        self.decode_known().map(|(_, _, n)| n)
    }

    /// Base58 text form.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

/// Genesis of a chain-address identity: seven zero bytes, then the address.
pub fn genesis_from_chain_address(address: [u8; CHAIN_ADDRESS_LENGTH]) -> [u8; GENESIS_LENGTH] {
    let mut genesis = [0u8; GENESIS_LENGTH];
    genesis[CHAIN_ADDRESS_PADDING..].copy_from_slice(&address);
    genesis
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_base58())
    }
}

impl FromStr for Id {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| IdentityError::MalformedEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl TryFrom<&[u8]> for Id {
    type Error = IdentityError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_base58())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Id::from_bytes(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
