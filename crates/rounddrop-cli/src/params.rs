use std::path::Path;

use anyhow::{bail, Context};
use rounddrop_core::constants::{BPS_DENOMINATOR, DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION};
use rounddrop_core::types::{AccountId, DilithiumPublicKey};
use rounddrop_crypto::dilithium::public_key_len;
use rounddrop_crypto::hash::derive_ledger_id;
use rounddrop_state::DeployParams;
use serde::{Deserialize, Serialize};

/// Deployment parameters as written by hand in a JSON file.
///
/// Accounts are base-58, the signer key is hex. When `ledger_id` is omitted
/// it is derived from the owner and chain id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerParams {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub chain_id: u64,
    #[serde(default)]
    pub ledger_id: Option<String>,
    pub owner: String,
    pub operator: String,
    /// Dilithium2 public key of the certificate signer (hex).
    pub signer_public_key: String,
    /// Transfer tax of the reference token, in basis points.
    #[serde(default)]
    pub token_fee_bps: u16,
}

fn default_name() -> String {
    DEFAULT_DOMAIN_NAME.to_string()
}

fn default_version() -> String {
    DEFAULT_DOMAIN_VERSION.to_string()
}

impl LedgerParams {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading params file {}", path.display()))?;
        serde_json::from_str(&json).context("parsing params file")
    }

    pub fn into_deploy(self) -> anyhow::Result<DeployParams> {
        if self.token_fee_bps as u128 > BPS_DENOMINATOR {
            bail!("token_fee_bps {} exceeds {}", self.token_fee_bps, BPS_DENOMINATOR);
        }
        let owner = parse_account(&self.owner).context("owner")?;
        let operator = parse_account(&self.operator).context("operator")?;
        let signer_key = DilithiumPublicKey::from_hex(&self.signer_public_key)
            .map_err(|e| anyhow::anyhow!("signer_public_key: {e}"))?;
        if signer_key.0.len() != public_key_len() {
            bail!(
                "signer_public_key is {} bytes, expected a {}-byte Dilithium2 key",
                signer_key.0.len(),
                public_key_len()
            );
        }
        let ledger_id = match &self.ledger_id {
            Some(id) => parse_account(id).context("ledger_id")?,
            None => derive_ledger_id(&owner, self.chain_id),
        };
        Ok(DeployParams {
            name: self.name,
            version: self.version,
            chain_id: self.chain_id,
            ledger_id,
            owner,
            operator,
            signer_key,
        })
    }
}

pub fn parse_account(s: &str) -> anyhow::Result<AccountId> {
    AccountId::from_b58(s).map_err(|e| anyhow::anyhow!("invalid account {s}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rounddrop_crypto::KeyPair;

    fn params(signer: &KeyPair) -> LedgerParams {
        serde_json::from_value(serde_json::json!({
            "chain_id": 7,
            "owner": AccountId::from_bytes([1; 32]).to_b58(),
            "operator": AccountId::from_bytes([2; 32]).to_b58(),
            "signer_public_key": signer.public_key.to_hex(),
        }))
        .unwrap()
    }

    #[test]
    fn defaults_and_derived_ledger_id() {
        let signer = KeyPair::generate();
        let p = params(&signer);
        assert_eq!(p.name, DEFAULT_DOMAIN_NAME);
        assert_eq!(p.token_fee_bps, 0);

        let deploy = p.into_deploy().unwrap();
        assert_eq!(deploy.ledger_id, derive_ledger_id(&AccountId::from_bytes([1; 32]), 7));
        assert_eq!(deploy.signer_key, signer.public_key);
    }

    #[test]
    fn rejects_truncated_signer_key() {
        let signer = KeyPair::generate();
        let mut p = params(&signer);
        p.signer_public_key.truncate(64);
        assert!(p.into_deploy().is_err());
    }

    #[test]
    fn rejects_excessive_fee() {
        let signer = KeyPair::generate();
        let mut p = params(&signer);
        p.token_fee_bps = 10_001;
        assert!(p.into_deploy().is_err());
    }
}
