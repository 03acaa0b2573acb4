use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};
use rounddrop_core::types::{DilithiumPublicKey, DilithiumSignature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("invalid public key length: expected {expected}, got {got}")]
    InvalidPublicKeyLength { expected: usize, got: usize },
}

/// Sign `message` with a Dilithium2 secret key.
/// Returns a detached signature.
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<DilithiumSignature, SignatureError> {
    let sk = dilithium2::SecretKey::from_bytes(secret_key_bytes)
        .map_err(|_| SignatureError::InvalidSecretKey)?;
    let sig = dilithium2::detached_sign(message, &sk);
    Ok(DilithiumSignature(sig.as_bytes().to_vec()))
}

/// Verify a detached Dilithium2 signature.
pub fn verify_signature(
    public_key: &DilithiumPublicKey,
    message: &[u8],
    signature: &DilithiumSignature,
) -> Result<(), SignatureError> {
    let pk = dilithium2::PublicKey::from_bytes(&public_key.0).map_err(|_| {
        SignatureError::InvalidPublicKeyLength {
            expected: dilithium2::public_key_bytes(),
            got: public_key.0.len(),
        }
    })?;
    let sig = dilithium2::DetachedSignature::from_bytes(&signature.0)
        .map_err(|_| SignatureError::InvalidSignature)?;
    dilithium2::verify_detached_signature(&sig, message, &pk)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// Byte length of a well-formed Dilithium2 public key.
pub fn public_key_len() -> usize {
    dilithium2::public_key_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tampered_message_fails() {
        let (pk, sk) = dilithium2::keypair();
        let pk_bytes = DilithiumPublicKey(pk.as_bytes().to_vec());
        let sig = sign(sk.as_bytes(), b"round 0 for alice").unwrap();
        assert!(verify_signature(&pk_bytes, b"round 0 for alice", &sig).is_ok());
        assert!(verify_signature(&pk_bytes, b"round 1 for alice", &sig).is_err());
    }

    #[test]
    fn truncated_signature_is_invalid() {
        let (pk, sk) = dilithium2::keypair();
        let pk_bytes = DilithiumPublicKey(pk.as_bytes().to_vec());
        let mut sig = sign(sk.as_bytes(), b"msg").unwrap();
        sig.0.truncate(100);
        assert!(matches!(
            verify_signature(&pk_bytes, b"msg", &sig),
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[test]
    fn malformed_public_key_reports_length() {
        let (_, sk) = dilithium2::keypair();
        let sig = sign(sk.as_bytes(), b"msg").unwrap();
        let err = verify_signature(&DilithiumPublicKey(vec![0u8; 10]), b"msg", &sig).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidPublicKeyLength { got: 10, .. }));
    }
}
