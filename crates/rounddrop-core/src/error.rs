use thiserror::Error;

use crate::types::{Amount, RoundIndex, Timestamp};

/// Every way a ledger entry point can refuse a call.
///
/// A returned error means the call left no effect on ledger state.
#[derive(Debug, Error)]
pub enum DistributionError {
    // ── Authorization ────────────────────────────────────────────────────────
    #[error("caller is not the operator")]
    IncorrectCaller,

    #[error("caller is not the owner")]
    NotOwner,

    #[error("caller is not the pending owner")]
    NotPendingOwner,

    #[error("invalid signature")]
    InvalidSignature,

    // ── Replay / state ───────────────────────────────────────────────────────
    #[error("user has already claimed round {round}")]
    UserHasClaimed { round: RoundIndex },

    #[error("round {round} is already financed")]
    RoundAlreadyFinanced { round: RoundIndex },

    #[error("rounds are already set up")]
    AlreadySetup,

    #[error("rounds are not set up")]
    NotSetup,

    // ── Temporal ─────────────────────────────────────────────────────────────
    #[error("round {round} has not started (starts at {start_time})")]
    RoundNotStarted { round: RoundIndex, start_time: Timestamp },

    #[error("claim deadline exceeded (deadline {deadline})")]
    DeadlineExceeded { deadline: Timestamp },

    #[error("withdrawal not allowed before the deadline ({deadline})")]
    PrematureWithdrawal { deadline: Timestamp },

    #[error("deadline must be at least {min_deadline}")]
    InvalidNewDeadline { min_deadline: Timestamp },

    // ── Financing ────────────────────────────────────────────────────────────
    #[error("round {round} is not financed")]
    RoundNotFinanced { round: RoundIndex },

    #[error("round {round} is not set up")]
    RoundNotSetup { round: RoundIndex },

    #[error("round {round} is fully claimed")]
    RoundFullyClaimed { round: RoundIndex },

    #[error("withdrawal is disabled: no deadline set")]
    WithdrawDisabled,

    #[error("token transfer tax detected: expected {expected}, received {received}")]
    TaxTokenCheckFailed { expected: Amount, received: Amount },

    #[error("a deposit is pulling tokens; ledger calls are refused until it settles")]
    DepositInProgress,

    // ── Input validation ─────────────────────────────────────────────────────
    #[error("empty array")]
    EmptyArray,

    #[error("array lengths do not match")]
    IncorrectLengths,

    #[error("start time of round {index} must be after {previous}")]
    IncorrectStartTime { index: usize, previous: Timestamp },

    #[error("allocation of round {index} must be greater than zero")]
    IncorrectAllocation { index: usize },

    // ── Lifecycle ────────────────────────────────────────────────────────────
    #[error("ledger is frozen")]
    IsFrozen,

    #[error("ledger is not frozen")]
    NotFrozen,

    #[error("ledger is paused")]
    IsPaused,

    #[error("ledger is not paused")]
    NotPaused,

    // ── Deployment ───────────────────────────────────────────────────────────
    #[error("ledger already deployed in this database")]
    AlreadyDeployed,

    #[error("no ledger deployed in this database")]
    NotDeployed,

    // ── Arithmetic / collaborators / storage ─────────────────────────────────
    #[error("math overflow")]
    MathOverflow,

    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Failures reported by a token ledger collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: Amount, have: Amount },

    #[error("insufficient allowance: need {need}, have {have}")]
    InsufficientAllowance { need: Amount, have: Amount },

    #[error("transfer tax of {bps} bps exceeds 100%")]
    InvalidFee { bps: u16 },

    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("token storage error: {0}")]
    Storage(String),
}

/// Failures decoding identifiers and keys from their text forms.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid base-58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid length: expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}
