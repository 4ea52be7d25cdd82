//! # Signed Packets
//!
//! The document a client presents to prove it acts for an identity:
//!
//! ```text
//! SignedPacket {
//!   header      { type, issuer DID, signer key, issuedAt, expiresAt, workNonce }
//!   payload     { data: IdenAssertData?, form: { .. } }
//!   proofKSign  ProofClaim: issuer's state authorizes `signer`
//!   signature   Ed25519( canonical_json({ header, payload, proofKSign }) )
//! }
//! ```
//!
//! Two packet types exist:
//!
//! - `GENERICSIGV01` signs an arbitrary string form. No challenge, no work.
//! - `IDENASSERTV01` answers a relying party's [`IdenAssertRequest`]. It
//!   echoes the challenge, may assert a name with a second proof, and must
//!   carry proof of work over its signed content.
//!
//! ## Lifecycle
//!
//! ```text
//! Requested ──build──► Unsigned ──work + sign──► Signed ──verify──► Verified | Rejected
//! ```
//!
//! Packets are never edited after signing; any change breaks the signature.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock::secs;
use super::error::AuthError;
use super::nonce::{Nonce, NonceStore};
use super::pow::{canonical_json, compute_pow, solve_with_timeout, PowData};
use super::proof::ProofClaim;
use crate::config::AuthConfig;
use crate::crypto::keys::{PublicKey, Signature, SigningKeypair};
use crate::crypto::signatures::sign;
use crate::identity::Did;

// ---------------------------------------------------------------------------
// Packet types
// ---------------------------------------------------------------------------

/// Kind of a signed packet. Unknown wire names fail to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    #[serde(rename = "GENERICSIGV01")]
    GenericSig,
    #[serde(rename = "IDENASSERTV01")]
    IdenAssert,
}

impl PacketType {
    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::GenericSig => "GENERICSIGV01",
            PacketType::IdenAssert => "IDENASSERTV01",
        }
    }

    /// Whether packets of this type must carry proof of work.
    pub fn requires_work(self) -> bool {
        matches!(self, PacketType::IdenAssert)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Packet sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketHeader {
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    /// DID of the identity the packet speaks for.
    pub issuer: Did,
    /// Key that signed the packet.
    pub signer: PublicKey,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Bumped by the proof-of-work search.
    pub work_nonce: u64,
}

/// A relying party's challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdenAssertRequest {
    pub origin: String,
    pub nonce: Nonce,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl IdenAssertRequest {
    /// Issue a challenge for `origin` from `store`.
    pub fn issue(store: &NonceStore, origin: &str, ttl: Duration) -> Self {
        let entry = store.issue(origin, ttl);
        Self {
            origin: entry.origin,
            nonce: entry.nonce,
            issued_at: entry.issued_at,
            expires_at: entry.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdenAssertData {
    pub request: IdenAssertRequest,
    /// Human-readable name the client claims for its identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Proof that a name authority assigned `name` to the issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_assign_name: Option<ProofClaim>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<IdenAssertData>,
    #[serde(default)]
    pub form: BTreeMap<String, String>,
}

/// Who signs: the key, the identity it speaks for, and the proof tying them.
#[derive(Debug, Clone)]
pub struct PacketSigner {
    pub keypair: SigningKeypair,
    pub issuer: Did,
    pub proof_ksign: ProofClaim,
}

/// A name assertion: the name and the authority's proof of it.
#[derive(Debug, Clone)]
pub struct NameAssertion {
    pub name: String,
    pub proof: ProofClaim,
}

// ---------------------------------------------------------------------------
// Unsigned packet
// ---------------------------------------------------------------------------

/// A packet before work and signature. Its canonical JSON is exactly the
/// signed content of the resulting [`SignedPacket`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedPacket {
    pub header: PacketHeader,
    pub payload: PacketPayload,
    #[serde(rename = "proofKSign")]
    pub proof_ksign: ProofClaim,
}

impl PowData for UnsignedPacket {
    fn increment_nonce(&mut self) {
        self.header.work_nonce = self.header.work_nonce.wrapping_add(1);
    }
}

impl UnsignedPacket {
    fn new(
        signer: &PacketSigner,
        packet_type: PacketType,
        payload: PacketPayload,
        now: i64,
        ttl: Duration,
    ) -> Self {
        Self {
            header: PacketHeader {
                packet_type,
                issuer: signer.issuer.clone(),
                signer: signer.keypair.public_key(),
                issued_at: now,
                expires_at: now.saturating_add(secs(ttl)),
                work_nonce: 0,
            },
            payload,
            proof_ksign: signer.proof_ksign.clone(),
        }
    }

    /// Draft of a `GENERICSIGV01` packet signing `form`.
    pub fn generic_sig(
        signer: &PacketSigner,
        form: BTreeMap<String, String>,
        now: i64,
        ttl: Duration,
    ) -> Self {
        let payload = PacketPayload { data: None, form };
        Self::new(signer, PacketType::GenericSig, payload, now, ttl)
    }

    /// Draft of an `IDENASSERTV01` packet answering `request`.
    pub fn iden_assert(
        signer: &PacketSigner,
        request: IdenAssertRequest,
        name: Option<NameAssertion>,
        now: i64,
        ttl: Duration,
    ) -> Self {
        let (name, proof_assign_name) = match name {
            Some(n) => (Some(n.name), Some(n.proof)),
            None => (None, None),
        };
        let payload = PacketPayload {
            data: Some(IdenAssertData {
                request,
                name,
                proof_assign_name,
            }),
            form: BTreeMap::new(),
        };
        Self::new(signer, PacketType::IdenAssert, payload, now, ttl)
    }

    /// Sign with `keypair`, which must be the header's signer.
    pub fn sign(self, keypair: &SigningKeypair) -> Result<SignedPacket, AuthError> {
        if keypair.public_key() != self.header.signer {
            return Err(AuthError::MalformedPacket(
                "signing key does not match header signer".into(),
            ));
        }
        let signature = sign(keypair, &canonical_json(&self)?);
        debug!(
            packet_type = %self.header.packet_type,
            issuer = %self.header.issuer,
            work_nonce = self.header.work_nonce,
            "packet signed"
        );
        Ok(SignedPacket {
            header: self.header,
            payload: self.payload,
            proof_ksign: self.proof_ksign,
            signature,
        })
    }
}

// ---------------------------------------------------------------------------
// Signed packet
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedContent<'a> {
    header: &'a PacketHeader,
    payload: &'a PacketPayload,
    #[serde(rename = "proofKSign")]
    proof_ksign: &'a ProofClaim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPacket {
    pub header: PacketHeader,
    pub payload: PacketPayload,
    #[serde(rename = "proofKSign")]
    pub proof_ksign: ProofClaim,
    pub signature: Signature,
}

impl SignedPacket {
    /// Build and sign a `GENERICSIGV01` packet.
    pub fn generic_sig(
        signer: &PacketSigner,
        form: BTreeMap<String, String>,
        now: i64,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        UnsignedPacket::generic_sig(signer, form, now, ttl).sign(&signer.keypair)
    }

    /// Build an `IDENASSERTV01` packet, search its proof of work inline, sign.
    pub fn iden_assert(
        signer: &PacketSigner,
        request: IdenAssertRequest,
        name: Option<NameAssertion>,
        now: i64,
        ttl: Duration,
        difficulty_bits: u32,
    ) -> Result<Self, AuthError> {
        let draft = UnsignedPacket::iden_assert(signer, request, name, now, ttl);
        compute_pow(draft, difficulty_bits)?.sign(&signer.keypair)
    }

    /// [`SignedPacket::generic_sig`] valid for the configured packet TTL.
    pub fn generic_sig_with_config(
        signer: &PacketSigner,
        form: BTreeMap<String, String>,
        now: i64,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        Self::generic_sig(signer, form, now, config.packet_ttl())
    }

    /// [`SignedPacket::iden_assert`] with the configured packet TTL and
    /// difficulty.
    pub fn iden_assert_with_config(
        signer: &PacketSigner,
        request: IdenAssertRequest,
        name: Option<NameAssertion>,
        now: i64,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        Self::iden_assert(
            signer,
            request,
            name,
            now,
            config.packet_ttl(),
            config.pow_difficulty_bits,
        )
    }

    /// [`SignedPacket::iden_assert`] with the work search bounded by `timeout`.
    #[allow(clippy::too_many_arguments)]
    pub async fn iden_assert_with_timeout(
        signer: &PacketSigner,
        request: IdenAssertRequest,
        name: Option<NameAssertion>,
        now: i64,
        ttl: Duration,
        difficulty_bits: u32,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let draft = UnsignedPacket::iden_assert(signer, request, name, now, ttl);
        solve_with_timeout(draft, difficulty_bits, timeout)
            .await?
            .sign(&signer.keypair)
    }

    /// Bytes covered by the signature and the proof of work.
    pub fn signed_content(&self) -> Result<Vec<u8>, AuthError> {
        canonical_json(&SignedContent {
            header: &self.header,
            payload: &self.payload,
            proof_ksign: &self.proof_ksign,
        })
    }

    pub fn to_json(&self) -> Result<String, AuthError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::pow::{leading_zero_bits, pow_hash};
    use crate::auth::proof::{Claim, ClaimSet};
    use crate::crypto::hash::{sha256, Hash256};
    use crate::identity::{did_from_id, Id};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    fn signer() -> PacketSigner {
        let keypair = SigningKeypair::from_seed(&[0x42; 32]);
        let claim = Claim::AuthorizeKSign {
            public_key: keypair.public_key(),
        };
        let claims = ClaimSet::new(vec![claim.clone()]);
        let id = Id::genesis_from_state([0x01, 0x12], &claims.state()).unwrap();
        PacketSigner {
            issuer: did_from_id(&id).unwrap(),
            proof_ksign: claims.prove(id, &claim, NOW).unwrap(),
            keypair,
        }
    }

    fn request() -> IdenAssertRequest {
        let store = NonceStore::new(Arc::new(ManualClock::new(NOW)));
        IdenAssertRequest::issue(&store, "https://rp.example.com", Duration::from_secs(60))
    }

    #[test]
    fn generic_sig_signature_covers_content() {
        let signer = signer();
        let mut form = BTreeMap::new();
        form.insert("action".to_string(), "login".to_string());
        let packet = SignedPacket::generic_sig(&signer, form, NOW, Duration::from_secs(600))
            .unwrap();

        assert_eq!(packet.header.packet_type, PacketType::GenericSig);
        assert_eq!(packet.header.expires_at, NOW + 600);
        assert!(packet.payload.data.is_none());
        let content = packet.signed_content().unwrap();
        assert!(packet.header.signer.verify(&content, &packet.signature));
    }

    #[test]
    fn iden_assert_carries_work() {
        let signer = signer();
        let packet = SignedPacket::iden_assert(
            &signer,
            request(),
            None,
            NOW,
            Duration::from_secs(600),
            8,
        )
        .unwrap();
        let hash = Hash256(sha256(&packet.signed_content().unwrap()));
        assert!(leading_zero_bits(&hash) >= 8);
    }

    #[test]
    fn unsigned_draft_hashes_like_signed_content() {
        let signer = signer();
        let draft = UnsignedPacket::iden_assert(&signer, request(), None, NOW, Duration::from_secs(60));
        let hash = pow_hash(&draft).unwrap();
        let packet = draft.sign(&signer.keypair).unwrap();
        assert_eq!(hash, Hash256(sha256(&packet.signed_content().unwrap())));
    }

    #[test]
    fn sign_rejects_foreign_key() {
        let signer = signer();
        let draft = UnsignedPacket::generic_sig(&signer, BTreeMap::new(), NOW, Duration::from_secs(60));
        let stranger = SigningKeypair::from_seed(&[0x01; 32]);
        assert!(matches!(
            draft.sign(&stranger),
            Err(AuthError::MalformedPacket(_))
        ));
    }

    #[test]
    fn json_transport_roundtrip() {
        let signer = signer();
        let packet = SignedPacket::iden_assert(
            &signer,
            request(),
            None,
            NOW,
            Duration::from_secs(600),
            4,
        )
        .unwrap();
        let json = packet.to_json().unwrap();
        assert!(json.contains("\"IDENASSERTV01\""));
        assert!(json.contains("\"proofKSign\""));
        assert_eq!(SignedPacket::from_json(&json).unwrap(), packet);
    }

    #[test]
    fn proof_ksign_wire_name_matches_in_every_form() {
        let signer = signer();
        let draft = UnsignedPacket::iden_assert(&signer, request(), None, NOW, Duration::from_secs(60));
        let draft_json = String::from_utf8(canonical_json(&draft).unwrap()).unwrap();
        let packet = draft.sign(&signer.keypair).unwrap();
        let content = String::from_utf8(packet.signed_content().unwrap()).unwrap();
        let wire = packet.to_json().unwrap();

        for json in [&draft_json, &content, &wire] {
            assert!(json.contains("\"proofKSign\""), "{}", json);
            assert!(!json.contains("\"proofKsign\""), "{}", json);
        }
        assert_eq!(draft_json, content);
    }

    #[test]
    fn config_builders_use_configured_ttl_and_difficulty() {
        let config = AuthConfig::from_toml_str(
            r#"
            packet_ttl_secs = 90
            pow_difficulty_bits = 5
            "#,
        )
        .unwrap();
        let signer = signer();

        let generic =
            SignedPacket::generic_sig_with_config(&signer, BTreeMap::new(), NOW, &config).unwrap();
        assert_eq!(generic.header.expires_at, NOW + 90);

        let assertion =
            SignedPacket::iden_assert_with_config(&signer, request(), None, NOW, &config).unwrap();
        assert_eq!(assertion.header.expires_at, NOW + 90);
        let hash = Hash256(sha256(&assertion.signed_content().unwrap()));
        assert!(leading_zero_bits(&hash) >= 5);
    }

    #[test]
    fn unknown_packet_type_fails_to_parse() {
        let signer = signer();
        let packet = SignedPacket::generic_sig(&signer, BTreeMap::new(), NOW, Duration::from_secs(60))
            .unwrap();
        let json = packet.to_json().unwrap().replace("GENERICSIGV01", "GENERICSIGV99");
        assert!(matches!(
            SignedPacket::from_json(&json),
            Err(AuthError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn iden_assert_with_timeout_signs() {
        let signer = signer();
        let packet = SignedPacket::iden_assert_with_timeout(
            &signer,
            request(),
            None,
            NOW,
            Duration::from_secs(600),
            6,
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        assert_eq!(packet.header.packet_type, PacketType::IdenAssert);
    }
}
