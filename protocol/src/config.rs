//! # Protocol Configuration & Constants
//!
//! Every fixed layout size and every tunable default of the identity layer
//! lives here. The layout constants are part of the wire format: changing
//! them invalidates every ID that has ever been minted, so they are not
//! configuration, they are law.
//!
//! The tunables (challenge lifetime, packet validity window, proof-of-work
//! difficulty, trusted name authorities) are collected in [`AuthConfig`],
//! which relying parties load from TOML or build in code.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::identity::Id;

// ---------------------------------------------------------------------------
// Identifier Layout
// ---------------------------------------------------------------------------

/// Length of the type prefix: one method byte plus one blockchain/network byte.
pub const TYPE_LENGTH: usize = 2;

/// Length of the genesis payload embedded in every ID.
pub const GENESIS_LENGTH: usize = 27;

/// Length of the trailing checksum.
pub const CHECKSUM_LENGTH: usize = 2;

/// Total ID length. `2 + 27 + 2`, and nothing else is an ID.
pub const ID_LENGTH: usize = TYPE_LENGTH + GENESIS_LENGTH + CHECKSUM_LENGTH;

/// Chain addresses are 20 bytes (Ethereum-style accounts).
pub const CHAIN_ADDRESS_LENGTH: usize = 20;

/// Identity states are 256-bit commitments. Anything wider is not a state.
pub const STATE_LENGTH: usize = 32;

/// Scheme literal at the front of every DID string.
pub const DID_SCHEMA: &str = "did";

/// A DID of a known method carries between one and three method-specific
/// segments: `[blockchain[:network]:]id`.
pub const MAX_DID_SEGMENTS: usize = 3;

// ---------------------------------------------------------------------------
// Authentication Defaults
// ---------------------------------------------------------------------------

/// How long an issued challenge stays redeemable.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(60);

/// Validity window a client puts on the packets it signs.
pub const DEFAULT_PACKET_TTL: Duration = Duration::from_secs(600);

/// Oldest `issued_at` a relying party accepts, regardless of the window the
/// signer declared.
pub const DEFAULT_MAX_PACKET_AGE: Duration = Duration::from_secs(600);

/// Tolerated drift between signer and verifier clocks.
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Leading zero bits required on identity-assertion packets. 8 bits costs
/// ~256 hashes on average: enough to make spam cost something, cheap enough
/// for a phone.
pub const DEFAULT_POW_DIFFICULTY_BITS: u32 = 8;

/// A nonce store sweeps expired challenges after this many issuances.
pub const DEFAULT_NONCE_PURGE_INTERVAL: u64 = 256;

/// Hard ceiling on difficulty. The search is unbounded by construction, so a
/// misconfigured relying party must not be able to demand 200 bits.
pub const MAX_POW_DIFFICULTY_BITS: u32 = 32;

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Errors produced while loading or validating an [`AuthConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),

    /// A field holds a value outside its allowed range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Per-deployment tunables of the authentication protocol.
///
/// All durations are whole seconds so the struct maps one-to-one onto a
/// TOML table:
///
/// ```toml
/// challenge_ttl_secs = 60
/// pow_difficulty_bits = 12
/// ```
///
/// Missing keys fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of an issued challenge nonce.
    pub challenge_ttl_secs: u64,

    /// Validity window clients put on packets they build.
    pub packet_ttl_secs: u64,

    /// Maximum accepted age of a packet's `issued_at`.
    pub max_packet_age_secs: u64,

    /// Maximum accepted amount by which `issued_at` may lie in the future.
    pub max_clock_skew_secs: u64,

    /// Leading zero bits required on packet types that demand work.
    pub pow_difficulty_bits: u32,

    /// Identities whose published states may assign names to other
    /// identities. A name proof from any other identity is rejected; with
    /// the list empty no name assertion is accepted.
    pub trusted_name_authorities: Vec<Id>,

    /// When set, every verification failure is reported to the caller as
    /// [`AuthError::Rejected`](crate::auth::AuthError::Rejected). The
    /// detailed reason is still logged.
    pub redact_errors: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL.as_secs(),
            packet_ttl_secs: DEFAULT_PACKET_TTL.as_secs(),
            max_packet_age_secs: DEFAULT_MAX_PACKET_AGE.as_secs(),
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW.as_secs(),
            pow_difficulty_bits: DEFAULT_POW_DIFFICULTY_BITS,
            trusted_name_authorities: Vec::new(),
            redact_errors: false,
        }
    }
}

impl AuthConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AuthConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the protocol unusable or unbounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.challenge_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "challenge_ttl_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.packet_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "packet_ttl_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_packet_age_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "max_packet_age_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.pow_difficulty_bits > MAX_POW_DIFFICULTY_BITS {
            return Err(ConfigError::Invalid {
                field: "pow_difficulty_bits",
                reason: format!(
                    "{} exceeds the maximum of {}",
                    self.pow_difficulty_bits, MAX_POW_DIFFICULTY_BITS
                ),
            });
        }
        Ok(())
    }

    /// Challenge lifetime as a [`Duration`].
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }

    /// Packet validity window as a [`Duration`].
    pub fn packet_ttl(&self) -> Duration {
        Duration::from_secs(self.packet_ttl_secs)
    }

    pub fn max_packet_age(&self) -> Duration {
        Duration::from_secs(self.max_packet_age_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }
}
