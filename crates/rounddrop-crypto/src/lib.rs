pub mod dilithium;
pub mod domain;
pub mod hash;
pub mod keypair;

pub use dilithium::{verify_signature, SignatureError};
pub use domain::DomainSeparator;
pub use hash::{account_id_from_pubkey, blake3_hash};
pub use keypair::KeyPair;
