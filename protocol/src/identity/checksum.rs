//! ID checksum.
//!
//! The checksum is the 16-bit wrapping sum of the 29 type and genesis bytes,
//! stored little-endian. It is the algorithm already deployed for iden3 IDs,
//! so IDs minted here and elsewhere agree byte for byte.
//!
//! Changing any single input byte by `d` (with `d` in `1..=255`) moves the
//! sum by `d`, which is never `0 mod 2^16`, so every single-byte corruption
//! of the payload is caught. A flipped bit in the checksum itself is caught
//! trivially.

use crate::config::{CHECKSUM_LENGTH, GENESIS_LENGTH, TYPE_LENGTH};

/// Checksum over `type ++ genesis`.
pub fn checksum(
    typ: &[u8; TYPE_LENGTH],
    genesis: &[u8; GENESIS_LENGTH],
) -> [u8; CHECKSUM_LENGTH] {
    let sum = typ
        .iter()
        .chain(genesis.iter())
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
    sum.to_le_bytes()
}

/// Recompute and compare. Pure: no allocation, no side effects.
pub fn verify_checksum(
    typ: &[u8; TYPE_LENGTH],
    genesis: &[u8; GENESIS_LENGTH],
    check: &[u8; CHECKSUM_LENGTH],
) -> bool {
    checksum(typ, genesis) == *check
}
