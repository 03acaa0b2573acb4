//! rounddrop-query
//!
//! Read-only views over a deployed distribution ledger.
//! All mutation lives in rounddrop-state's DistributionEngine; this crate
//! answers "what is open, what is left, what happened" for operators,
//! claimants and the CLI.

pub mod query;
pub mod schedule;

pub use query::{LedgerSummary, RoundQuery};
pub use schedule::{round_status, RoundStatus, ScheduleEntry};
