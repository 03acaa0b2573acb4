use rounddrop_core::constants::{DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION};
use rounddrop_core::types::{AccountId, DilithiumPublicKey};
use serde::{Deserialize, Serialize};

/// Everything fixed at deployment.
///
/// `ledger_id` is the ledger's custody account on the token ledger and is
/// bound into every claim digest together with the domain name, version and
/// chain id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployParams {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub ledger_id: AccountId,
    pub owner: AccountId,
    pub operator: AccountId,
    /// Dilithium2 public key of the trusted certificate signer.
    pub signer_key: DilithiumPublicKey,
}

impl DeployParams {
    /// Params with the default domain name and version.
    pub fn new(
        chain_id: u64,
        ledger_id: AccountId,
        owner: AccountId,
        operator: AccountId,
        signer_key: DilithiumPublicKey,
    ) -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_string(),
            version: DEFAULT_DOMAIN_VERSION.to_string(),
            chain_id,
            ledger_id,
            owner,
            operator,
            signer_key,
        }
    }
}
