//! rounddrop-state
//!
//! Persistent ledger storage and the distribution state machine: round
//! registry, certificate verification, claim settlement, operator treasury
//! and the pause/freeze lifecycle guard.

pub mod db;
pub mod engine;
pub mod params;
pub mod token;

pub use db::{ChangeSet, LedgerDb};
pub use engine::{CallContext, DistributionEngine};
pub use params::DeployParams;
pub use token::{DbToken, TokenLedger};
