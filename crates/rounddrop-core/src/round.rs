use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Amount, DilithiumPublicKey, Timestamp};

// ── RoundRecord ──────────────────────────────────────────────────────────────

/// One tranche of the distribution.
///
/// `start_time` and `allocation` never change after setup. `deposited` jumps
/// from 0 to `allocation` when the operator finances the round, and `claimed`
/// only grows. At all times `claimed <= deposited <= allocation`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Claims are accepted at or after this instant.
    pub start_time: Timestamp,
    /// Tokens earmarked for the round. Non-zero for every configured round.
    pub allocation: Amount,
    /// Tokens the operator has moved into custody for this round.
    pub deposited: Amount,
    /// Tokens paid out to claimants.
    pub claimed: Amount,
}

impl RoundRecord {
    pub fn new(start_time: Timestamp, allocation: Amount) -> Self {
        Self {
            start_time,
            allocation,
            deposited: 0,
            claimed: 0,
        }
    }

    /// A round that was never configured reads as the zero record.
    pub fn is_setup(&self) -> bool {
        self.allocation != 0
    }

    pub fn is_financed(&self) -> bool {
        self.deposited != 0
    }

    pub fn has_started(&self, now: Timestamp) -> bool {
        self.start_time <= now
    }

    /// Financed tokens not yet paid out.
    pub fn remaining(&self) -> Amount {
        self.deposited.saturating_sub(self.claimed)
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// Safety valve state. `Frozen` is terminal and implies paused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Active,
    Paused,
    Frozen,
}

impl LifecycleState {
    pub fn is_paused(&self) -> bool {
        !matches!(self, LifecycleState::Active)
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, LifecycleState::Frozen)
    }
}

// ── Ledger configuration and state ───────────────────────────────────────────

/// Written once at deployment, immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Domain name bound into every claim digest.
    pub name: String,
    /// Domain version bound into every claim digest.
    pub version: String,
    pub chain_id: u64,
    /// The ledger's own custody account on the token ledger.
    pub ledger_id: AccountId,
    /// Trusted entitlement-signing key.
    pub signer_key: DilithiumPublicKey,
    pub deployed_at: Timestamp,
}

/// Process-wide mutable state: roles, schedule summary, global accounting
/// and lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// `None` once ownership is renounced.
    pub owner: Option<AccountId>,
    pub pending_owner: Option<AccountId>,
    pub operator: AccountId,
    pub number_of_rounds: u64,
    pub last_claim_start_time: Timestamp,
    pub setup_complete: bool,
    /// `None` means claims never expire and withdrawal is disabled.
    pub deadline: Option<Timestamp>,
    pub total_deposited: Amount,
    pub total_claimed: Amount,
    pub total_withdrawn: Amount,
    pub lifecycle: LifecycleState,
}

impl LedgerState {
    pub fn new(owner: AccountId, operator: AccountId) -> Self {
        Self {
            owner: Some(owner),
            pending_owner: None,
            operator,
            number_of_rounds: 0,
            last_claim_start_time: 0,
            setup_complete: false,
            deadline: None,
            total_deposited: 0,
            total_claimed: 0,
            total_withdrawn: 0,
            lifecycle: LifecycleState::Active,
        }
    }

    pub fn is_owner(&self, account: &AccountId) -> bool {
        self.owner.as_ref() == Some(account)
    }

    /// Financed tokens neither claimed nor already withdrawn.
    pub fn available_for_withdrawal(&self) -> Amount {
        self.total_deposited
            .saturating_sub(self.total_claimed)
            .saturating_sub(self.total_withdrawn)
    }
}
