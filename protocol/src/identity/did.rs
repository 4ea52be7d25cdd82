//! # Generic DID Syntax
//!
//! A syntax-only parser for the subset of the W3C DID grammar this crate
//! needs:
//!
//! ```text
//! did                = "did:" method-name ":" method-specific-id
//! method-name        = 1*( %x61-7A / DIGIT )
//! method-specific-id = *( *idchar ":" ) 1*idchar
//! idchar             = ALPHA / DIGIT / "." / "-" / "_" / pct-encoded
//! ```
//!
//! Paths, queries and fragments are not accepted. The parser has no idea
//! what any method means; interpreting the segments is the job of
//! [`super::codec`].
//!
//! ## Standards References
//!
//! - [DID Core v1.0, DID Syntax](https://www.w3.org/TR/did-core/#did-syntax)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::IdentityError;
use crate::config::DID_SCHEMA;

/// A syntactically valid DID, split into method and method-specific segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    /// Method name, e.g. `iden3`.
    pub method: String,
    /// Colon-separated segments of the method-specific identifier.
    pub id_strings: Vec<String>,
}

impl Did {
    /// Assemble a DID from already-validated parts.
    pub(crate) fn from_parts(method: &str, id_strings: Vec<String>) -> Self {
        Self {
            method: method.to_string(),
            id_strings,
        }
    }

    /// Parse `did:<method>:<segment>[:<segment>...]`.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let invalid = |reason: &str| IdentityError::InvalidDid(format!("{:?}: {}", input, reason));

        let rest = input
            .strip_prefix(DID_SCHEMA)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| invalid("missing did: scheme"))?;

        let (method, msid) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing method-specific id"))?;

        if method.is_empty()
            || !method
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(invalid("method must be lowercase letters and digits"));
        }

        let id_strings: Vec<String> = msid.split(':').map(str::to_string).collect();
        for segment in &id_strings {
            if !is_idchar_segment(segment) {
                return Err(invalid("illegal character in method-specific id"));
            }
        }
        if id_strings.last().map_or(true, |s| s.is_empty()) {
            return Err(invalid("method-specific id must not end with ':'"));
        }

        Ok(Self {
            method: method.to_string(),
            id_strings,
        })
    }
}

fn is_idchar_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                if !hex.map_or(false, |h| h.iter().all(u8::is_ascii_hexdigit)) {
                    return false;
                }
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_') => i += 1,
            _ => return false,
        }
    }
    true
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", DID_SCHEMA, self.method, self.id_strings.join(":"))
    }
}

impl FromStr for Did {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Did::parse(&s).map_err(serde::de::Error::custom)
    }
}
