//! # DID Methods, Blockchains and Networks
//!
//! The two type bytes at the front of every ID say which DID method the
//! identity belongs to and which chain/network anchors its state:
//!
//! ```text
//! byte 0: method            0b0000_0001 iden3, 0b0000_0010 polygonid
//!                           high bit = on-chain identity flag
//!                           0b1111_1111 = any other (foreign) method
//! byte 1: chain | network   high nibble: 0001 polygon, 0010 eth
//!                           low nibble:  0001 main,    0010 test net
//!                           0x00 = read-only (no chain)
//! ```
//!
//! The table is a `const` array scanned linearly: it has a handful of
//! entries per method and never changes at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::IdentityError;

/// Set on the method byte of identities whose state lives in an on-chain
/// contract.
pub const METHOD_ON_CHAIN_FLAG: u8 = 0b1000_0000;

// ---------------------------------------------------------------------------
// DidMethod
// ---------------------------------------------------------------------------

/// DID method of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DidMethod {
    Iden3,
    PolygonId,
    /// Any method outside the table. IDs of this method are local keys for
    /// foreign DIDs and never turn back into a method name.
    Other,
}

impl DidMethod {
    /// Methods that round-trip through the DID string form.
    pub const KNOWN: [DidMethod; 2] = [DidMethod::Iden3, DidMethod::PolygonId];

    pub fn byte(self) -> u8 {
        match self {
            DidMethod::Iden3 => 0b0000_0001,
            DidMethod::PolygonId => 0b0000_0010,
            DidMethod::Other => 0b1111_1111,
        }
    }

    /// Method name as it appears in a DID. Empty for [`DidMethod::Other`].
    pub fn name(self) -> &'static str {
        match self {
            DidMethod::Iden3 => "iden3",
            DidMethod::PolygonId => "polygonid",
            DidMethod::Other => "",
        }
    }

    /// Decode a method byte, ignoring the on-chain flag.
    pub fn from_byte(b: u8) -> Option<DidMethod> {
        if b == DidMethod::Other.byte() {
            return Some(DidMethod::Other);
        }
        DidMethod::KNOWN
            .into_iter()
            .find(|m| m.byte() == b & !METHOD_ON_CHAIN_FLAG)
    }

    /// Look up a known method by its DID name.
    pub fn from_name(name: &str) -> Option<DidMethod> {
        DidMethod::KNOWN.into_iter().find(|m| m.name() == name)
    }

    pub fn is_known(self) -> bool {
        self != DidMethod::Other
    }
}

impl fmt::Display for DidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Blockchain / NetworkId
// ---------------------------------------------------------------------------

/// Chain anchoring an identity's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Blockchain {
    Ethereum,
    Polygon,
    /// Used when the chain cannot be recovered from an identifier.
    Unknown,
    /// Identity not anchored to any chain.
    ReadOnly,
    /// Empty token; normalized to [`Blockchain::ReadOnly`] when building types.
    NoChain,
}

impl Blockchain {
    pub fn as_str(self) -> &'static str {
        match self {
            Blockchain::Ethereum => "eth",
            Blockchain::Polygon => "polygon",
            Blockchain::Unknown => "unknown",
            Blockchain::ReadOnly => "readonly",
            Blockchain::NoChain => "",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eth" => Ok(Blockchain::Ethereum),
            "polygon" => Ok(Blockchain::Polygon),
            "unknown" => Ok(Blockchain::Unknown),
            "readonly" => Ok(Blockchain::ReadOnly),
            "" => Ok(Blockchain::NoChain),
            other => Err(IdentityError::UnsupportedNetwork {
                method: String::new(),
                detail: format!("unknown blockchain {:?}", other),
            }),
        }
    }
}

/// Method-specific network of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkId {
    Main,
    Mumbai,
    Goerli,
    Unknown,
    /// No network: read-only identities.
    NoNetwork,
}

impl NetworkId {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkId::Main => "main",
            NetworkId::Mumbai => "mumbai",
            NetworkId::Goerli => "goerli",
            NetworkId::Unknown => "unknown",
            NetworkId::NoNetwork => "",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(NetworkId::Main),
            "mumbai" => Ok(NetworkId::Mumbai),
            "goerli" => Ok(NetworkId::Goerli),
            "unknown" => Ok(NetworkId::Unknown),
            "" => Ok(NetworkId::NoNetwork),
            other => Err(IdentityError::UnsupportedNetwork {
                method: String::new(),
                detail: format!("unknown network {:?}", other),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Type table
// ---------------------------------------------------------------------------

/// One row of the type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkEntry {
    pub blockchain: Blockchain,
    pub network: NetworkId,
    pub byte: u8,
}

const fn entry(blockchain: Blockchain, network: NetworkId, byte: u8) -> NetworkEntry {
    NetworkEntry {
        blockchain,
        network,
        byte,
    }
}

const POLYGON: u8 = 0b0001_0000;
const ETHEREUM: u8 = 0b0010_0000;
const MAIN: u8 = 0b0000_0001;
const TEST: u8 = 0b0000_0010;

/// Networks shared by every known method.
const KNOWN_METHOD_NETWORKS: &[NetworkEntry] = &[
    entry(Blockchain::ReadOnly, NetworkId::NoNetwork, 0b0000_0000),
    entry(Blockchain::Polygon, NetworkId::Main, POLYGON | MAIN),
    entry(Blockchain::Polygon, NetworkId::Mumbai, POLYGON | TEST),
    entry(Blockchain::Ethereum, NetworkId::Main, ETHEREUM | MAIN),
    entry(Blockchain::Ethereum, NetworkId::Goerli, ETHEREUM | TEST),
];

const OTHER_METHOD_NETWORKS: &[NetworkEntry] =
    &[entry(Blockchain::Unknown, NetworkId::Unknown, 0b1111_1111)];

/// The type table of `method`.
pub fn networks_for(method: DidMethod) -> &'static [NetworkEntry] {
    match method {
        DidMethod::Iden3 | DidMethod::PolygonId => KNOWN_METHOD_NETWORKS,
        DidMethod::Other => OTHER_METHOD_NETWORKS,
    }
}

fn unsupported_network(method: DidMethod, detail: String) -> IdentityError {
    IdentityError::UnsupportedNetwork {
        method: method.name().to_string(),
        detail,
    }
}

/// Build the two type bytes for a known method and a blockchain/network pair.
pub fn build_did_type(
    method: DidMethod,
    blockchain: Blockchain,
    network: NetworkId,
) -> Result<[u8; 2], IdentityError> {
    if !method.is_known() {
        return Err(IdentityError::UnsupportedMethod(format!("{:?}", method)));
    }

    let blockchain = match blockchain {
        Blockchain::NoChain => Blockchain::ReadOnly,
        other => other,
    };

    networks_for(method)
        .iter()
        .find(|e| e.blockchain == blockchain && e.network == network)
        .map(|e| [method.byte(), e.byte])
        .ok_or_else(|| {
            unsupported_network(method, format!("{}:{}", blockchain, network))
        })
}

/// [`build_did_type`] with the on-chain identity flag set.
pub fn build_did_type_on_chain(
    method: DidMethod,
    blockchain: Blockchain,
    network: NetworkId,
) -> Result<[u8; 2], IdentityError> {
    let mut typ = build_did_type(method, blockchain, network)?;
    typ[0] |= METHOD_ON_CHAIN_FLAG;
    Ok(typ)
}

/// Reverse lookup of a blockchain/network byte within a method's table.
pub fn find_network_by_byte(
    method: DidMethod,
    byte: u8,
) -> Result<(Blockchain, NetworkId), IdentityError> {
    networks_for(method)
        .iter()
        .find(|e| e.byte == byte)
        .map(|e| (e.blockchain, e.network))
        .ok_or_else(|| unsupported_network(method, format!("byte 0x{:02x}", byte)))
}

/// Decode both type bytes.
pub fn decode_type(typ: [u8; 2]) -> Result<(DidMethod, Blockchain, NetworkId), IdentityError> {
    let method = DidMethod::from_byte(typ[0])
        .ok_or_else(|| IdentityError::UnsupportedMethod(format!("unknown<{}>", typ[0])))?;
    let (blockchain, network) = find_network_by_byte(method, typ[1])?;
    Ok((method, blockchain, network))
}
