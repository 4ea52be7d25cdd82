//! # Challenge Nonces
//!
//! A relying party hands every client a fresh 256-bit nonce bound to the
//! client's origin and a short TTL. An identity-assertion packet must echo
//! it back, and the verifier consumes it: each nonce is good for exactly one
//! successful verification.
//!
//! ```text
//! issue ──► Live ──consume──► Consumed (tombstone until expires_at)
//!             │
//!             └── now > expires_at ──► Expired
//! ```
//!
//! Consumed nonces stay in the map as tombstones until their expiry so a
//! replay reports [`NonceError::AlreadyConsumed`] instead of
//! [`NonceError::UnknownNonce`]. Expiry is evaluated lazily on consumption.
//! Every [`DEFAULT_NONCE_PURGE_INTERVAL`] issuances the store sweeps out
//! expired entries itself; [`NonceStore::purge_expired`] runs the same sweep
//! on demand.
//!
//! ## Concurrency
//!
//! The store is a `DashMap`. Consumption holds the shard write lock of the
//! nonce for the whole check-and-mark, so concurrent consumers of one nonce
//! see exactly one success.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, trace};

use super::clock::{secs, Clock};
use super::error::NonceError;
use crate::config::DEFAULT_NONCE_PURGE_INTERVAL;

/// A 256-bit challenge value. Hex in human-readable formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(pub [u8; 32]);

impl Nonce {
    /// 32 bytes from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({}…)", &self.to_hex()[..12])
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(serde::de::Error::custom)?
        } else {
            <Vec<u8>>::deserialize(deserializer)?
        };
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!("nonce must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Nonce(arr))
    }
}

/// An outstanding challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceEntry {
    pub nonce: Nonce,
    /// Party the challenge was issued to.
    pub origin: String,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds. The challenge is valid up to and including this second.
    pub expires_at: i64,
}

#[derive(Debug)]
struct Slot {
    entry: NonceEntry,
    consumed: bool,
}

/// Registry of issued challenges, shared by `Arc` between request handlers.
pub struct NonceStore {
    entries: DashMap<Nonce, Slot>,
    clock: Arc<dyn Clock>,
    issued: AtomicU64,
    purge_every: u64,
}

impl NonceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_purge_interval(clock, DEFAULT_NONCE_PURGE_INTERVAL)
    }

    /// Store that sweeps expired entries after every `purge_every`
    /// issuances. Zero is treated as one.
    pub fn with_purge_interval(clock: Arc<dyn Clock>, purge_every: u64) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            issued: AtomicU64::new(0),
            purge_every: purge_every.max(1),
        }
    }

    /// Issue a fresh challenge for `origin`, valid for `ttl`.
    pub fn issue(&self, origin: &str, ttl: Duration) -> NonceEntry {
        let issued_at = self.clock.now();
        let expires_at = issued_at.saturating_add(secs(ttl));
        let entry = loop {
            let nonce = Nonce::random();
            if let Entry::Vacant(vacant) = self.entries.entry(nonce) {
                let entry = NonceEntry {
                    nonce,
                    origin: origin.to_string(),
                    issued_at,
                    expires_at,
                };
                vacant.insert(Slot {
                    entry: entry.clone(),
                    consumed: false,
                });
                break entry;
            }
        };
        debug!(origin, expires_at, "issued challenge");

        // The shard lock of the new entry is released here; the sweep locks
        // every shard.
        let issued = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        if issued % self.purge_every == 0 {
            self.purge_expired();
        }
        entry
    }

    /// Consume a challenge regardless of origin.
    pub fn consume(&self, nonce: &Nonce) -> Result<NonceEntry, NonceError> {
        self.consume_checked(nonce, None)
    }

    /// Consume a challenge presented for `origin`. An origin mismatch leaves
    /// the challenge live for its rightful owner.
    pub fn consume_for(&self, nonce: &Nonce, origin: &str) -> Result<NonceEntry, NonceError> {
        self.consume_checked(nonce, Some(origin))
    }

    fn consume_checked(
        &self,
        nonce: &Nonce,
        origin: Option<&str>,
    ) -> Result<NonceEntry, NonceError> {
        let now = self.clock.now();
        let mut slot = self.entries.get_mut(nonce).ok_or(NonceError::UnknownNonce)?;

        if slot.consumed {
            return Err(NonceError::AlreadyConsumed);
        }
        if now > slot.entry.expires_at {
            return Err(NonceError::Expired {
                expires_at: slot.entry.expires_at,
            });
        }
        if let Some(origin) = origin {
            if origin != slot.entry.origin {
                return Err(NonceError::OriginMismatch {
                    expected: slot.entry.origin.clone(),
                    got: origin.to_string(),
                });
            }
        }

        slot.consumed = true;
        trace!(nonce = %nonce, "challenge consumed");
        Ok(slot.entry.clone())
    }

    /// Drop every entry past its expiry, live or consumed. Returns how many
    /// were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| now <= slot.entry.expires_at);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired challenges");
        }
        removed
    }

    /// Entries currently held, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use std::sync::Barrier;
    use std::thread;

    const ORIGIN: &str = "https://rp.example.com";

    fn store() -> (Arc<ManualClock>, NonceStore) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = NonceStore::new(clock.clone());
        (clock, store)
    }

    #[test]
    fn issue_then_consume_once() {
        let (_, store) = store();
        let entry = store.issue(ORIGIN, Duration::from_secs(60));
        assert_eq!(entry.expires_at, 1_700_000_060);

        let consumed = store.consume(&entry.nonce).unwrap();
        assert_eq!(consumed, entry);
        assert_eq!(store.consume(&entry.nonce), Err(NonceError::AlreadyConsumed));
    }

    #[test]
    fn ttl_60_consumed_after_61_seconds_is_expired() {
        let (clock, store) = store();
        let entry = store.issue(ORIGIN, Duration::from_secs(60));
        clock.advance(Duration::from_secs(61));
        assert_eq!(
            store.consume(&entry.nonce),
            Err(NonceError::Expired {
                expires_at: entry.expires_at
            })
        );
    }

    #[test]
    fn valid_through_last_second() {
        let (clock, store) = store();
        let entry = store.issue(ORIGIN, Duration::from_secs(60));
        clock.advance(Duration::from_secs(60));
        assert!(store.consume(&entry.nonce).is_ok());
    }

    #[test]
    fn unknown_nonce() {
        let (_, store) = store();
        assert_eq!(
            store.consume(&Nonce([9u8; 32])),
            Err(NonceError::UnknownNonce)
        );
    }

    #[test]
    fn origin_mismatch_does_not_burn_the_nonce() {
        let (_, store) = store();
        let entry = store.issue(ORIGIN, Duration::from_secs(60));
        assert!(matches!(
            store.consume_for(&entry.nonce, "https://evil.example.com"),
            Err(NonceError::OriginMismatch { .. })
        ));
        assert!(store.consume_for(&entry.nonce, ORIGIN).is_ok());
    }

    #[test]
    fn issued_nonces_are_distinct() {
        let (_, store) = store();
        let a = store.issue(ORIGIN, Duration::from_secs(60));
        let b = store.issue(ORIGIN, Duration::from_secs(60));
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn purge_drops_expired_entries_and_tombstones() {
        let (clock, store) = store();
        let short = store.issue(ORIGIN, Duration::from_secs(10));
        store.consume(&short.nonce).unwrap();
        store.issue(ORIGIN, Duration::from_secs(10));
        let long = store.issue(ORIGIN, Duration::from_secs(100));

        clock.advance(Duration::from_secs(11));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.consume(&short.nonce), Err(NonceError::UnknownNonce));
        assert!(store.consume(&long.nonce).is_ok());
    }

    #[test]
    fn issuing_sweeps_expired_entries_periodically() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = NonceStore::with_purge_interval(clock.clone(), 3);
        let stale = store.issue(ORIGIN, Duration::from_secs(10));
        store.consume(&stale.nonce).unwrap();

        clock.advance(Duration::from_secs(11));
        store.issue(ORIGIN, Duration::from_secs(60));
        assert_eq!(store.len(), 2);

        // Third issuance triggers the sweep.
        store.issue(ORIGIN, Duration::from_secs(60));
        assert_eq!(store.len(), 2);
        assert_eq!(store.consume(&stale.nonce), Err(NonceError::UnknownNonce));
    }

    #[test]
    fn default_store_bounds_growth() {
        let (clock, store) = store();
        for _ in 0..DEFAULT_NONCE_PURGE_INTERVAL {
            store.issue(ORIGIN, Duration::from_secs(1));
            clock.advance(Duration::from_secs(2));
        }
        // The sweep on the last issuance removed everything already expired.
        assert!(store.len() <= 1);
    }

    #[test]
    fn concurrent_consumers_see_one_success() {
        let (_, store) = store();
        let store = Arc::new(store);
        let entry = store.issue(ORIGIN, Duration::from_secs(60));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let nonce = entry.nonce;
                thread::spawn(move || {
                    barrier.wait();
                    store.consume(&nonce)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == NonceError::AlreadyConsumed));
    }

    #[test]
    fn nonce_serializes_as_hex() {
        let nonce = Nonce([0xAB; 32]);
        let json = serde_json::to_string(&nonce).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        assert_eq!(serde_json::from_str::<Nonce>(&json).unwrap(), nonce);
        assert!(serde_json::from_str::<Nonce>("\"abcd\"").is_err());
    }
}
