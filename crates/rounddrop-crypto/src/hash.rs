use rounddrop_core::types::AccountId;

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive an AccountId from a raw public key bytes using BLAKE3.
pub fn account_id_from_pubkey(pubkey_bytes: &[u8]) -> AccountId {
    AccountId::from_bytes(blake3_hash(pubkey_bytes))
}

/// Derive a ledger custody id from its owner and chain: BLAKE3("rounddrop_ledger" || owner || chain_id LE).
pub fn derive_ledger_id(owner: &AccountId, chain_id: u64) -> AccountId {
    let mut input = b"rounddrop_ledger".to_vec();
    input.extend_from_slice(owner.as_bytes());
    input.extend_from_slice(&chain_id.to_le_bytes());
    AccountId::from_bytes(blake3_hash(&input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_id_depends_on_chain() {
        let owner = AccountId::from_bytes([3u8; 32]);
        assert_ne!(derive_ledger_id(&owner, 1), derive_ledger_id(&owner, 2));
        assert_eq!(derive_ledger_id(&owner, 1), derive_ledger_id(&owner, 1));
    }
}
