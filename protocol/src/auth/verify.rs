//! # Packet Verification
//!
//! The relying party's side. [`PacketVerifier`] runs the checks in a fixed
//! order and stops at the first failure:
//!
//! | Step | Check | Error |
//! |------|-------|-------|
//! | 1 | `issued_at`/`expires_at` against the clock | `Expired`, `NotYetValid` |
//! | 2 | challenge origin and single-use nonce (assertions) | `OriginMismatch`, `InvalidOrReusedChallenge` |
//! | 3 | proof of work (assertions) | `InsufficientWork` |
//! | 4 | issuer DID decodes, KSign proof binds `signer` to it | `Identity`, `InvalidProof` |
//! | 5 | signature over the canonical content | `InvalidSignature` |
//! | 6 | name proof from a trusted authority, when a name is asserted | `InvalidProof` |
//!
//! Every rejection is logged at `warn` with its detailed reason. With
//! [`AuthConfig::redact_errors`] set the caller only sees
//! [`AuthError::Rejected`].

use std::sync::Arc;

use tracing::{info, warn};

use super::clock::{secs, Clock, SystemClock};
use super::error::{AuthError, ProofError};
use super::nonce::{Nonce, NonceStore};
use super::packet::{IdenAssertData, IdenAssertRequest, PacketType, SignedPacket};
use super::pow::leading_zero_bits;
use super::proof::{Claim, ProofClaimVerifier};
use crate::config::AuthConfig;
use crate::crypto::hash::{sha256, Hash256};
use crate::crypto::keys::PublicKey;
use crate::crypto::signatures::verify_checked;
use crate::identity::{decompose, Did, Id};

/// A packet that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPacket {
    pub id: Id,
    pub did: Did,
    pub signer: PublicKey,
    pub packet_type: PacketType,
}

/// An accepted identity assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdenAssertResult {
    pub id: Id,
    pub did: Did,
    /// The asserted name, when the packet proved one.
    pub name: Option<String>,
    pub origin: String,
    pub nonce: Nonce,
}

/// Verifies signed packets against a configuration, a proof backend and a
/// clock.
pub struct PacketVerifier<V> {
    config: AuthConfig,
    proofs: V,
    clock: Arc<dyn Clock>,
}

impl<V: ProofClaimVerifier> PacketVerifier<V> {
    pub fn new(config: AuthConfig, proofs: V, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            proofs,
            clock,
        }
    }

    /// Verifier reading wall-clock time.
    pub fn with_system_clock(config: AuthConfig, proofs: V) -> Self {
        Self::new(config, proofs, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issue a challenge for `origin` that lives for the configured
    /// challenge TTL.
    pub fn issue_challenge(&self, nonces: &NonceStore, origin: &str) -> IdenAssertRequest {
        IdenAssertRequest::issue(nonces, origin, self.config.challenge_ttl())
    }

    /// Verify a `GENERICSIGV01` packet.
    pub fn verify_generic_sig(&self, packet: &SignedPacket) -> Result<VerifiedPacket, AuthError> {
        let result = self.expect_type(packet, PacketType::GenericSig).and_then(|_| {
            self.check_timestamps(packet)?;
            self.check_signed_identity(packet)
        });
        self.finish(packet, result)
    }

    /// Verify an `IDENASSERTV01` packet answering a challenge that `nonces`
    /// issued to `origin`. The challenge is consumed on the way.
    pub fn verify_iden_assert(
        &self,
        packet: &SignedPacket,
        nonces: &NonceStore,
        origin: &str,
    ) -> Result<IdenAssertResult, AuthError> {
        let result = self
            .expect_type(packet, PacketType::IdenAssert)
            .and_then(|_| self.iden_assert_steps(packet, nonces, origin));
        self.finish(packet, result)
    }

    fn iden_assert_steps(
        &self,
        packet: &SignedPacket,
        nonces: &NonceStore,
        origin: &str,
    ) -> Result<IdenAssertResult, AuthError> {
        self.check_timestamps(packet)?;

        let data = assertion_data(packet)?;
        if data.request.origin != origin {
            return Err(AuthError::OriginMismatch {
                expected: origin.to_string(),
                got: data.request.origin.clone(),
            });
        }
        nonces.consume_for(&data.request.nonce, origin)?;

        self.check_work(packet)?;
        let verified = self.check_signed_identity(packet)?;
        let name = self.check_name(data, &verified.id)?;

        Ok(IdenAssertResult {
            id: verified.id,
            did: verified.did,
            name,
            origin: data.request.origin.clone(),
            nonce: data.request.nonce,
        })
    }

    fn expect_type(&self, packet: &SignedPacket, expected: PacketType) -> Result<(), AuthError> {
        if packet.header.packet_type != expected {
            return Err(AuthError::MalformedPacket(format!(
                "expected {} packet, got {}",
                expected, packet.header.packet_type
            )));
        }
        Ok(())
    }

    /// Step 1.
    fn check_timestamps(&self, packet: &SignedPacket) -> Result<(), AuthError> {
        let now = self.clock.now();
        let header = &packet.header;
        let max_age = secs(self.config.max_packet_age());
        let max_skew = secs(self.config.max_clock_skew());

        if header.issued_at > now.saturating_add(max_skew) {
            return Err(AuthError::NotYetValid);
        }
        if now > header.expires_at || now.saturating_sub(header.issued_at) > max_age {
            return Err(AuthError::Expired);
        }
        Ok(())
    }

    /// Step 3.
    fn check_work(&self, packet: &SignedPacket) -> Result<(), AuthError> {
        if !packet.header.packet_type.requires_work() {
            return Ok(());
        }
        let required = self.config.pow_difficulty_bits;
        let hash = Hash256(sha256(&packet.signed_content()?));
        let actual = leading_zero_bits(&hash);
        if actual < required {
            return Err(AuthError::InsufficientWork { required, actual });
        }
        Ok(())
    }

    /// Steps 4 and 5.
    fn check_signed_identity(&self, packet: &SignedPacket) -> Result<VerifiedPacket, AuthError> {
        let header = &packet.header;
        let parts = decompose(&header.issuer)?;

        let proof = &packet.proof_ksign;
        if proof.id != parts.id {
            return Err(ProofError::IdMismatch {
                in_proof: proof.id.to_string(),
                issuer: parts.id.to_string(),
            }
            .into());
        }
        self.proofs.verify_proof_claim(proof, Some(&header.signer))?;

        verify_checked(&header.signer, &packet.signed_content()?, &packet.signature)?;

        Ok(VerifiedPacket {
            id: parts.id,
            did: header.issuer.clone(),
            signer: header.signer,
            packet_type: header.packet_type,
        })
    }

    /// Step 6.
    fn check_name(&self, data: &IdenAssertData, issuer: &Id) -> Result<Option<String>, AuthError> {
        let (name, proof) = match (&data.name, &data.proof_assign_name) {
            (None, None) => return Ok(None),
            (Some(name), Some(proof)) => (name, proof),
            _ => {
                return Err(AuthError::MalformedPacket(
                    "name and name proof must come together".into(),
                ))
            }
        };

        if !self.config.trusted_name_authorities.contains(&proof.id) {
            return Err(ProofError::UntrustedAuthority(proof.id.to_string()).into());
        }
        match &proof.claim {
            Claim::AssignName {
                name: assigned,
                id,
            } if assigned == name && id == issuer => {}
            Claim::AssignName { .. } => {
                return Err(ProofError::UnexpectedClaim(format!(
                    "name proof does not assign {:?} to {}",
                    name, issuer
                ))
                .into())
            }
            Claim::AuthorizeKSign { .. } => {
                return Err(ProofError::UnexpectedClaim(
                    "expected assignName, found authorizeKSign".into(),
                )
                .into())
            }
        }
        self.proofs.verify_proof_claim(proof, None)?;
        Ok(Some(name.clone()))
    }

    fn finish<T>(&self, packet: &SignedPacket, result: Result<T, AuthError>) -> Result<T, AuthError> {
        match result {
            Ok(accepted) => {
                info!(
                    packet_type = %packet.header.packet_type,
                    issuer = %packet.header.issuer,
                    "packet accepted"
                );
                Ok(accepted)
            }
            Err(e) => {
                warn!(
                    packet_type = %packet.header.packet_type,
                    issuer = %packet.header.issuer,
                    reason = %e,
                    "packet rejected"
                );
                if self.config.redact_errors {
                    Err(AuthError::Rejected)
                } else {
                    Err(e)
                }
            }
        }
    }
}

fn assertion_data(packet: &SignedPacket) -> Result<&IdenAssertData, AuthError> {
    packet
        .payload
        .data
        .as_ref()
        .ok_or_else(|| AuthError::MalformedPacket("assertion packet without data".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::error::NonceError;
    use crate::auth::packet::{NameAssertion, PacketSigner, UnsignedPacket};
    use crate::auth::pow::{compute_pow, pow_hash};
    use crate::auth::proof::{ClaimSet, StateProofVerifier};
    use crate::auth::state::InMemoryStateReader;
    use crate::crypto::keys::SigningKeypair;
    use crate::identity::did_from_id;
    use std::collections::BTreeMap;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;
    const ORIGIN: &str = "https://rp.example.com";
    const DIFFICULTY: u32 = 6;

    struct Fixture {
        clock: Arc<ManualClock>,
        nonces: NonceStore,
        states: Arc<InMemoryStateReader>,
        verifier: PacketVerifier<StateProofVerifier<Arc<InMemoryStateReader>>>,
        signer: PacketSigner,
        authority: Authority,
    }

    /// The name authority the verifier trusts.
    struct Authority {
        id: Id,
        claims: ClaimSet,
    }

    fn authority() -> Authority {
        let claims = ClaimSet::new(vec![Claim::AuthorizeKSign {
            public_key: SigningKeypair::from_seed(&[0xA0; 32]).public_key(),
        }]);
        Authority {
            id: Id::genesis_from_state([0x01, 0x11], &claims.state()).unwrap(),
            claims,
        }
    }

    fn fixture_with(config: AuthConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let keypair = SigningKeypair::from_seed(&[0x11; 32]);
        let claim = Claim::AuthorizeKSign {
            public_key: keypair.public_key(),
        };
        let claims = ClaimSet::new(vec![claim.clone()]);
        let id = Id::genesis_from_state([0x01, 0x12], &claims.state()).unwrap();
        let signer = PacketSigner {
            issuer: did_from_id(&id).unwrap(),
            proof_ksign: claims.prove(id, &claim, NOW).unwrap(),
            keypair,
        };
        let authority = authority();
        let config = AuthConfig {
            trusted_name_authorities: vec![authority.id],
            ..config
        };
        let states = Arc::new(InMemoryStateReader::new());
        Fixture {
            nonces: NonceStore::new(clock.clone()),
            verifier: PacketVerifier::new(
                config,
                StateProofVerifier::new(Arc::clone(&states)),
                clock.clone(),
            ),
            states,
            clock,
            signer,
            authority,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AuthConfig {
            pow_difficulty_bits: DIFFICULTY,
            ..AuthConfig::default()
        })
    }

    impl Fixture {
        fn request(&self) -> IdenAssertRequest {
            IdenAssertRequest::issue(&self.nonces, ORIGIN, Duration::from_secs(60))
        }

        fn assertion(&self, name: Option<NameAssertion>) -> SignedPacket {
            SignedPacket::iden_assert(
                &self.signer,
                self.request(),
                name,
                NOW,
                Duration::from_secs(600),
                DIFFICULTY,
            )
            .unwrap()
        }

        /// The trusted authority publishes a state assigning `name` to `to`
        /// and hands out the proof.
        fn assign_name(&self, name: &str, to: Id) -> NameAssertion {
            let claim = Claim::AssignName {
                name: name.to_string(),
                id: to,
            };
            let mut claims = self.authority.claims.clone();
            claims.push(claim.clone());
            self.states
                .set_state(&self.authority.id, claims.root(), 10, NOW - 60)
                .unwrap();
            NameAssertion {
                name: name.to_string(),
                proof: claims.prove(self.authority.id, &claim, NOW).unwrap(),
            }
        }
    }

    /// A name authority minted on the spot whose genesis state assigns
    /// `name`. Its proof is internally consistent but nobody trusts it.
    fn self_minted_name(name: &str, to: Id) -> NameAssertion {
        let claim = Claim::AssignName {
            name: name.to_string(),
            id: to,
        };
        let claims = ClaimSet::new(vec![claim.clone()]);
        let minted = Id::genesis_from_state([0x01, 0x11], &claims.state()).unwrap();
        NameAssertion {
            name: name.to_string(),
            proof: claims.prove(minted, &claim, NOW).unwrap(),
        }
    }

    #[test]
    fn accepts_valid_assertion() {
        let f = fixture();
        let packet = f.assertion(None);
        let result = f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN).unwrap();
        assert_eq!(result.did, f.signer.issuer);
        assert_eq!(result.id, f.signer.proof_ksign.id);
        assert_eq!(result.origin, ORIGIN);
        assert_eq!(result.name, None);
    }

    #[test]
    fn replay_is_rejected() {
        let f = fixture();
        let packet = f.assertion(None);
        f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN).unwrap();
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidOrReusedChallenge(NonceError::AlreadyConsumed))
        ));
    }

    #[test]
    fn challenge_from_another_store_is_unknown() {
        let f = fixture();
        let other = fixture();
        let packet = other.assertion(None);
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidOrReusedChallenge(NonceError::UnknownNonce))
        ));
    }

    #[test]
    fn wrong_origin_is_rejected() {
        let f = fixture();
        let packet = f.assertion(None);
        assert!(matches!(
            f.verifier
                .verify_iden_assert(&packet, &f.nonces, "https://other.example.com"),
            Err(AuthError::OriginMismatch { .. })
        ));
    }

    #[test]
    fn expired_packet_is_rejected_before_anything_else() {
        let f = fixture();
        let mut packet = f.assertion(None);
        // Tampered too: the timestamp check still wins.
        packet.payload.form.insert("x".into(), "y".into());
        f.clock.advance(Duration::from_secs(601));
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn stale_challenge_is_rejected() {
        let f = fixture();
        let packet = f.assertion(None);
        f.clock.advance(Duration::from_secs(61));
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidOrReusedChallenge(NonceError::Expired { .. }))
        ));
    }

    #[test]
    fn future_packet_is_not_yet_valid() {
        let f = fixture();
        let packet = SignedPacket::generic_sig(
            &f.signer,
            BTreeMap::new(),
            NOW + 3_600,
            Duration::from_secs(600),
        )
        .unwrap();
        assert!(matches!(
            f.verifier.verify_generic_sig(&packet),
            Err(AuthError::NotYetValid)
        ));
    }

    #[test]
    fn insufficient_work_is_rejected() {
        let f = fixture_with(AuthConfig {
            pow_difficulty_bits: 20,
            ..AuthConfig::default()
        });
        let draft = UnsignedPacket::iden_assert(
            &f.signer,
            f.request(),
            None,
            NOW,
            Duration::from_secs(600),
        );
        // Find a nonce that is just short of the requirement.
        let mut draft = compute_pow(draft, 0).unwrap();
        while leading_zero_bits(&pow_hash(&draft).unwrap()) >= 20 {
            draft.header.work_nonce += 1;
        }
        let packet = draft.sign(&f.signer.keypair).unwrap();
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InsufficientWork { required: 20, .. })
        ));
    }

    #[test]
    fn tampered_payload_breaks_signature() {
        let f = fixture_with(AuthConfig {
            pow_difficulty_bits: 0,
            ..AuthConfig::default()
        });
        let mut packet = SignedPacket::iden_assert(
            &f.signer,
            f.request(),
            None,
            NOW,
            Duration::from_secs(600),
            0,
        )
        .unwrap();
        packet.payload.form.insert("admin".into(), "true".into());
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn generic_sig_accepts_and_rejects_bad_signature() {
        let f = fixture();
        let mut form = BTreeMap::new();
        form.insert("ethName".to_string(), "alice@example.com".to_string());
        let packet = SignedPacket::generic_sig(&f.signer, form, NOW, Duration::from_secs(600))
            .unwrap();
        let verified = f.verifier.verify_generic_sig(&packet).unwrap();
        assert_eq!(verified.packet_type, PacketType::GenericSig);
        assert_eq!(verified.signer, f.signer.keypair.public_key());

        let mut forged = packet.clone();
        forged.signature = SigningKeypair::from_seed(&[0x99; 32]).sign(b"something else");
        assert!(matches!(
            f.verifier.verify_generic_sig(&forged),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn key_not_authorized_by_issuer_is_invalid_proof() {
        let f = fixture();
        let intruder = SigningKeypair::from_seed(&[0x66; 32]);
        let signer = PacketSigner {
            keypair: intruder,
            ..f.signer.clone()
        };
        let packet = SignedPacket::generic_sig(&signer, BTreeMap::new(), NOW, Duration::from_secs(600))
            .unwrap();
        assert!(matches!(
            f.verifier.verify_generic_sig(&packet),
            Err(AuthError::InvalidProof(ProofError::KeyMismatch))
        ));
    }

    #[test]
    fn proof_about_another_identity_is_invalid() {
        let f = fixture();
        let mut signer = f.signer.clone();
        signer.issuer = did_from_id(&Id::new([0x01, 0x12], [0x55; 27])).unwrap();
        let packet = SignedPacket::generic_sig(&signer, BTreeMap::new(), NOW, Duration::from_secs(600))
            .unwrap();
        assert!(matches!(
            f.verifier.verify_generic_sig(&packet),
            Err(AuthError::InvalidProof(ProofError::IdMismatch { .. }))
        ));
    }

    #[test]
    fn name_assertion_is_checked() {
        let f = fixture();
        let id = f.signer.proof_ksign.id;

        let packet = f.assertion(Some(f.assign_name("alice@example.com", id)));
        let result = f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN).unwrap();
        assert_eq!(result.name.as_deref(), Some("alice@example.com"));

        let mut wrong = f.assign_name("alice@example.com", id);
        wrong.name = "mallory@example.com".into();
        let packet = f.assertion(Some(wrong));
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidProof(ProofError::UnexpectedClaim(_)))
        ));
    }

    #[test]
    fn name_from_untrusted_authority_is_rejected() {
        let f = fixture();
        let id = f.signer.proof_ksign.id;
        let packet = f.assertion(Some(self_minted_name("admin@example.com", id)));
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidProof(ProofError::UntrustedAuthority(_)))
        ));
    }

    #[test]
    fn unpublished_name_assignment_is_rejected() {
        let f = fixture();
        let id = f.signer.proof_ksign.id;
        // Signed off-state by the trusted authority: the root was never its state.
        let claim = Claim::AssignName {
            name: "alice@example.com".into(),
            id,
        };
        let mut claims = f.authority.claims.clone();
        claims.push(claim.clone());
        let proof = claims.prove(f.authority.id, &claim, NOW).unwrap();
        let packet = f.assertion(Some(NameAssertion {
            name: "alice@example.com".into(),
            proof,
        }));
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidProof(ProofError::UnknownState { .. }))
        ));
    }

    #[test]
    fn names_are_refused_without_trusted_authorities() {
        let f = fixture();
        let verifier = PacketVerifier::new(
            AuthConfig {
                pow_difficulty_bits: DIFFICULTY,
                ..AuthConfig::default()
            },
            StateProofVerifier::new(Arc::clone(&f.states)),
            f.clock.clone(),
        );
        let id = f.signer.proof_ksign.id;
        let packet = f.assertion(Some(f.assign_name("alice@example.com", id)));
        assert!(matches!(
            verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidProof(ProofError::UntrustedAuthority(_)))
        ));
    }

    #[test]
    fn configured_challenge_ttl_governs_expiry() {
        let f = fixture();
        let verifier = PacketVerifier::new(
            AuthConfig::from_toml_str(
                r#"
                challenge_ttl_secs = 5
                pow_difficulty_bits = 6
                "#,
            )
            .unwrap(),
            StateProofVerifier::new(Arc::clone(&f.states)),
            f.clock.clone(),
        );
        let request = verifier.issue_challenge(&f.nonces, ORIGIN);
        assert_eq!(request.expires_at, NOW + 5);
        let packet = SignedPacket::iden_assert_with_config(
            &f.signer,
            request,
            None,
            NOW,
            verifier.config(),
        )
        .unwrap();

        // Well inside the default 60s TTL, past the configured 5s.
        f.clock.advance(Duration::from_secs(6));
        assert!(matches!(
            verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::InvalidOrReusedChallenge(NonceError::Expired { .. }))
        ));

        let fresh = verifier.issue_challenge(&f.nonces, ORIGIN);
        let packet = SignedPacket::iden_assert_with_config(
            &f.signer,
            fresh,
            None,
            NOW + 6,
            verifier.config(),
        )
        .unwrap();
        assert!(verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN).is_ok());
    }

    #[test]
    fn wrong_packet_type_is_malformed() {
        let f = fixture();
        let packet = f.assertion(None);
        assert!(matches!(
            f.verifier.verify_generic_sig(&packet),
            Err(AuthError::MalformedPacket(_))
        ));
    }

    #[test]
    fn redaction_hides_the_reason() {
        let f = fixture_with(AuthConfig {
            pow_difficulty_bits: DIFFICULTY,
            redact_errors: true,
            ..AuthConfig::default()
        });
        let packet = f.assertion(None);
        f.clock.advance(Duration::from_secs(3_600));
        assert!(matches!(
            f.verifier.verify_iden_assert(&packet, &f.nonces, ORIGIN),
            Err(AuthError::Rejected)
        ));
    }
}
