use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AccountId, Amount, RoundIndex, Timestamp};

/// Observable record of a committed ledger call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Claimed {
        user: AccountId,
        round: RoundIndex,
        amount: Amount,
    },
    ClaimedMultiple {
        user: AccountId,
        rounds: Vec<RoundIndex>,
        total_amount: Amount,
    },
    SetupRounds {
        count: u64,
        first_start: Timestamp,
        last_start: Timestamp,
        total_allocation: Amount,
    },
    DeadlineUpdated {
        deadline: Timestamp,
    },
    Deposited {
        operator: AccountId,
        amount: Amount,
    },
    Withdrawn {
        operator: AccountId,
        amount: Amount,
    },
    OperatorUpdated {
        old: AccountId,
        new: AccountId,
    },
    Paused {
        account: AccountId,
    },
    Unpaused {
        account: AccountId,
    },
    Frozen {
        timestamp: Timestamp,
    },
    EmergencyExit {
        receiver: AccountId,
        balance: Amount,
    },
    OwnershipTransferStarted {
        previous: AccountId,
        pending: AccountId,
    },
    OwnershipTransferred {
        previous: Option<AccountId>,
        new: Option<AccountId>,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Claimed { .. } => "Claimed",
            LedgerEvent::ClaimedMultiple { .. } => "ClaimedMultiple",
            LedgerEvent::SetupRounds { .. } => "SetupRounds",
            LedgerEvent::DeadlineUpdated { .. } => "DeadlineUpdated",
            LedgerEvent::Deposited { .. } => "Deposited",
            LedgerEvent::Withdrawn { .. } => "Withdrawn",
            LedgerEvent::OperatorUpdated { .. } => "OperatorUpdated",
            LedgerEvent::Paused { .. } => "Paused",
            LedgerEvent::Unpaused { .. } => "Unpaused",
            LedgerEvent::Frozen { .. } => "Frozen",
            LedgerEvent::EmergencyExit { .. } => "EmergencyExit",
            LedgerEvent::OwnershipTransferStarted { .. } => "OwnershipTransferStarted",
            LedgerEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEvent::Claimed { user, round, amount } => {
                write!(f, "Claimed(user={user}, round={round}, amount={amount})")
            }
            LedgerEvent::ClaimedMultiple { user, rounds, total_amount } => {
                write!(f, "ClaimedMultiple(user={user}, rounds={rounds:?}, total={total_amount})")
            }
            LedgerEvent::SetupRounds { count, first_start, last_start, total_allocation } => write!(
                f,
                "SetupRounds(count={count}, first={first_start}, last={last_start}, allocation={total_allocation})"
            ),
            LedgerEvent::DeadlineUpdated { deadline } => write!(f, "DeadlineUpdated({deadline})"),
            LedgerEvent::Deposited { operator, amount } => {
                write!(f, "Deposited(operator={operator}, amount={amount})")
            }
            LedgerEvent::Withdrawn { operator, amount } => {
                write!(f, "Withdrawn(operator={operator}, amount={amount})")
            }
            LedgerEvent::OperatorUpdated { old, new } => {
                write!(f, "OperatorUpdated(old={old}, new={new})")
            }
            LedgerEvent::Paused { account } => write!(f, "Paused({account})"),
            LedgerEvent::Unpaused { account } => write!(f, "Unpaused({account})"),
            LedgerEvent::Frozen { timestamp } => write!(f, "Frozen({timestamp})"),
            LedgerEvent::EmergencyExit { receiver, balance } => {
                write!(f, "EmergencyExit(receiver={receiver}, balance={balance})")
            }
            LedgerEvent::OwnershipTransferStarted { previous, pending } => {
                write!(f, "OwnershipTransferStarted(previous={previous}, pending={pending})")
            }
            LedgerEvent::OwnershipTransferred { previous, new } => {
                let show = |a: &Option<AccountId>| a.as_ref().map(|a| a.to_string()).unwrap_or_else(|| "none".into());
                write!(f, "OwnershipTransferred(previous={}, new={})", show(previous), show(new))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_variant_name() {
        let ev = LedgerEvent::Frozen { timestamp: 42 };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"Frozen":{"timestamp":42}}"#);
        assert_eq!(ev.name(), "Frozen");
    }
}
