//! # Digital Signatures
//!
//! The signature primitive the signed-packet protocol calls into. Packets
//! are signed over their canonical JSON bytes; these helpers keep every
//! sign/verify call site going through one audited path.

use thiserror::Error;

use super::keys::{PublicKey, Signature, SigningKeypair};

/// Errors during signature operations.
///
/// Intentionally vague: we don't tell attackers why verification failed.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Sign `message` with `keypair`.
pub fn sign(keypair: &SigningKeypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a signature. Returns `false` for a bad signature and for a
/// malformed key alike.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// [`verify`] in `Result` form, for `?` chains.
pub fn verify_checked(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    if verify(public_key, message, signature) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}
