use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use rounddrop_core::types::{AccountId, DilithiumPublicKey, DilithiumSignature};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::dilithium::SignatureError;
use crate::domain::DomainSeparator;
use crate::hash::account_id_from_pubkey;

/// A Dilithium2 public + secret key pair with its derived AccountId.
///
/// The secret key is wiped from memory on drop.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub account_id: AccountId,
    pub public_key: DilithiumPublicKey,
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        let pk_bytes = pk.as_bytes().to_vec();
        let account_id = account_id_from_pubkey(&pk_bytes);
        Self {
            account_id,
            public_key: DilithiumPublicKey(pk_bytes),
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// Sign `message` using this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> Result<DilithiumSignature, SignatureError> {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::dilithium::sign(&sk, message)
    }

    /// Sign the claim digest for `(user, round, amount)` under `domain`.
    pub fn sign_claim(
        &self,
        domain: &DomainSeparator,
        user: &AccountId,
        round: u64,
        amount: u128,
    ) -> Result<DilithiumSignature, SignatureError> {
        self.sign(domain.claim_digest(user, round, amount).as_bytes())
    }

    /// Restore a KeyPair from raw bytes (e.g. loaded from a keyfile).
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        let account_id = account_id_from_pubkey(&pk_bytes);
        Self {
            account_id,
            public_key: DilithiumPublicKey(pk_bytes),
            secret_key: sk_bytes,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ account_id: {:?} }}", self.account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dilithium::verify_signature;

    #[test]
    fn account_id_matches_public_key() {
        let kp = KeyPair::generate();
        assert_eq!(kp.account_id, account_id_from_pubkey(&kp.public_key.0));
    }

    #[test]
    fn restored_keypair_signs_verifiably() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_raw(kp.public_key.0.clone(), kp.secret_key.clone());
        let sig = restored.sign(b"hello").unwrap();
        assert!(verify_signature(&kp.public_key, b"hello", &sig).is_ok());
    }
}
