//! # Proof of Work
//!
//! A cost gate against cheap challenge spam. The client bumps a nonce field
//! inside the payload until
//!
//! ```text
//! leading_zero_bits( SHA-256( canonical_json(payload) ) ) >= difficulty
//! ```
//!
//! and the verifier repeats the hash once. Expected cost doubles with every
//! bit of difficulty; the search itself has no iteration cap, so callers
//! bound it with [`compute_pow_cancellable`] or [`solve_with_timeout`].
//!
//! Canonical JSON is `serde_json` output after a round trip through
//! [`serde_json::Value`], whose maps are ordered. Object keys therefore come
//! out sorted at every level no matter how the type declares its fields.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::error::AuthError;
use crate::crypto::hash::{sha256, Hash256};

/// Payloads that carry a proof-of-work nonce.
pub trait PowData {
    /// Move to the next candidate.
    fn increment_nonce(&mut self);
}

/// Deterministic JSON encoding used for hashing and signing.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, AuthError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// The hash the difficulty is measured on.
pub fn pow_hash<T: Serialize + ?Sized>(data: &T) -> Result<Hash256, AuthError> {
    Ok(Hash256(sha256(&canonical_json(data)?)))
}

/// Number of leading zero bits of `hash`, most significant bit first.
pub fn leading_zero_bits(hash: &Hash256) -> u32 {
    let mut bits = 0;
    for byte in hash.as_bytes() {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// Whether `hash` meets `difficulty_bits`.
pub fn check_pow(hash: &Hash256, difficulty_bits: u32) -> bool {
    leading_zero_bits(hash) >= difficulty_bits
}

/// Search for a nonce that meets `difficulty_bits`. Unbounded.
pub fn compute_pow<T: PowData + Serialize>(data: T, difficulty_bits: u32) -> Result<T, AuthError> {
    compute_pow_cancellable(data, difficulty_bits, &AtomicBool::new(false))
}

/// [`compute_pow`] that gives up with [`AuthError::WorkCancelled`] once
/// `cancel` is set.
pub fn compute_pow_cancellable<T: PowData + Serialize>(
    mut data: T,
    difficulty_bits: u32,
    cancel: &AtomicBool,
) -> Result<T, AuthError> {
    let mut attempts: u64 = 0;
    loop {
        if check_pow(&pow_hash(&data)?, difficulty_bits) {
            debug!(difficulty_bits, attempts, "proof of work found");
            return Ok(data);
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(AuthError::WorkCancelled);
        }
        data.increment_nonce();
        attempts += 1;
    }
}

/// Run the search on a blocking thread and abandon it after `timeout`.
pub async fn solve_with_timeout<T>(
    data: T,
    difficulty_bits: u32,
    timeout: Duration,
) -> Result<T, AuthError>
where
    T: PowData + Serialize + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let search =
        tokio::task::spawn_blocking(move || compute_pow_cancellable(data, difficulty_bits, &flag));

    match tokio::time::timeout(timeout, search).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            warn!(error = %join_error, "proof-of-work worker failed");
            Err(AuthError::WorkCancelled)
        }
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            Err(AuthError::WorkTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}
