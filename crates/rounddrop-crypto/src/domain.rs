//! Domain-separated claim digests.
//!
//! A certificate is only valid for the ledger deployment it was issued for:
//! the digest commits to the domain name, version, chain id and the ledger's
//! own custody id before committing to the `(user, round, amount)` tuple.
//!
//!   domain_separator = keccak256(keccak256(DOMAIN_SCHEMA) ‖ keccak256(name)
//!                                ‖ keccak256(version) ‖ word(chain_id) ‖ ledger_id)
//!   struct_hash      = keccak256(keccak256(CLAIM_SCHEMA) ‖ user ‖ word(round) ‖ word(amount))
//!   digest           = keccak256(0x19 ‖ 0x01 ‖ domain_separator ‖ struct_hash)
//!
//! Integers are encoded as 32-byte big-endian words.

use rounddrop_core::constants::{CLAIM_SCHEMA, DOMAIN_SCHEMA};
use rounddrop_core::round::LedgerConfig;
use rounddrop_core::types::{AccountId, Amount, ClaimDigest, RoundIndex};
use sha3::{Digest, Keccak256};

/// Precomputed domain separator for one ledger deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DomainSeparator([u8; 32]);

impl DomainSeparator {
    pub fn new(name: &str, version: &str, chain_id: u64, ledger_id: &AccountId) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(keccak(DOMAIN_SCHEMA.as_bytes()));
        hasher.update(keccak(name.as_bytes()));
        hasher.update(keccak(version.as_bytes()));
        hasher.update(word(chain_id as u128));
        hasher.update(ledger_id.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn for_ledger(config: &LedgerConfig) -> Self {
        Self::new(&config.name, &config.version, config.chain_id, &config.ledger_id)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The message a claim certificate for `(user, round, amount)` signs.
    pub fn claim_digest(&self, user: &AccountId, round: RoundIndex, amount: Amount) -> ClaimDigest {
        let mut hasher = Keccak256::new();
        hasher.update([0x19, 0x01]);
        hasher.update(self.0);
        hasher.update(claim_struct_hash(user, round, amount));
        ClaimDigest(hasher.finalize().into())
    }
}

fn claim_struct_hash(user: &AccountId, round: RoundIndex, amount: Amount) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(keccak(CLAIM_SCHEMA.as_bytes()));
    hasher.update(user.as_bytes());
    hasher.update(word(round as u128));
    hasher.update(word(amount));
    hasher.finalize().into()
}

fn keccak(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn word(value: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> AccountId {
        AccountId::from_bytes([0xAB; 32])
    }

    #[test]
    fn word_is_big_endian_right_aligned() {
        let w = word(0x0102);
        assert!(w[..30].iter().all(|b| *b == 0));
        assert_eq!(&w[30..], &[0x01, 0x02]);
    }

    #[test]
    fn digest_binds_every_claim_field() {
        let domain = DomainSeparator::new("RoundDrop", "1", 1, &ledger());
        let alice = AccountId::from_bytes([1; 32]);
        let bob = AccountId::from_bytes([2; 32]);
        let base = domain.claim_digest(&alice, 0, 10);
        assert_ne!(base, domain.claim_digest(&bob, 0, 10));
        assert_ne!(base, domain.claim_digest(&alice, 1, 10));
        assert_ne!(base, domain.claim_digest(&alice, 0, 11));
        assert_eq!(base, domain.claim_digest(&alice, 0, 10));
    }

    #[test]
    fn digest_binds_deployment() {
        let alice = AccountId::from_bytes([1; 32]);
        let a = DomainSeparator::new("RoundDrop", "1", 1, &ledger());
        let other_chain = DomainSeparator::new("RoundDrop", "1", 2, &ledger());
        let other_ledger = DomainSeparator::new("RoundDrop", "1", 1, &AccountId::from_bytes([0xCD; 32]));
        let other_version = DomainSeparator::new("RoundDrop", "2", 1, &ledger());
        let d = a.claim_digest(&alice, 0, 10);
        assert_ne!(d, other_chain.claim_digest(&alice, 0, 10));
        assert_ne!(d, other_ledger.claim_digest(&alice, 0, 10));
        assert_ne!(d, other_version.claim_digest(&alice, 0, 10));
    }

    #[test]
    fn keccak_matches_known_empty_vector() {
        assert_eq!(
            hex::encode(keccak(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
