use rounddrop_core::error::DistributionError;
use rounddrop_core::round::{LedgerState, LifecycleState, RoundRecord};
use rounddrop_core::types::{AccountId, Amount, RoundIndex, Timestamp};
use rounddrop_state::LedgerDb;
use serde::Serialize;
use std::fmt;

use crate::schedule::{RoundStatus, ScheduleEntry};

/// Query helpers for a deployed ledger.
pub struct RoundQuery<'a> {
    db: &'a LedgerDb,
}

/// Snapshot of ledger-wide accounting and roles.
#[derive(Clone, Debug, Serialize)]
pub struct LedgerSummary {
    pub ledger_id: AccountId,
    pub owner: Option<AccountId>,
    pub pending_owner: Option<AccountId>,
    pub operator: AccountId,
    pub lifecycle: LifecycleState,
    pub number_of_rounds: u64,
    pub setup_complete: bool,
    pub deadline: Option<Timestamp>,
    pub total_deposited: Amount,
    pub total_claimed: Amount,
    pub total_withdrawn: Amount,
    pub available_for_withdrawal: Amount,
    pub open_rounds: Vec<RoundIndex>,
}

impl<'a> RoundQuery<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    fn state(&self) -> Result<LedgerState, DistributionError> {
        self.db.get_state()?.ok_or(DistributionError::NotDeployed)
    }

    fn configured(&self, index: RoundIndex) -> Result<RoundRecord, DistributionError> {
        let record = self.db.get_round(index)?;
        if !record.is_setup() {
            return Err(DistributionError::RoundNotSetup { round: index });
        }
        Ok(record)
    }

    /// Fetch a round; `None` when the index was never configured.
    pub fn get(&self, index: RoundIndex) -> Result<Option<RoundRecord>, DistributionError> {
        let record = self.db.get_round(index)?;
        Ok(record.is_setup().then_some(record))
    }

    pub fn status(&self, index: RoundIndex, now: Timestamp) -> Result<RoundStatus, DistributionError> {
        let state = self.state()?;
        Ok(ScheduleEntry::new(index, &self.db.get_round(index)?, state.deadline, now).status)
    }

    /// True when a valid certificate for the round would be honoured at `now`.
    pub fn is_open(&self, index: RoundIndex, now: Timestamp) -> Result<bool, DistributionError> {
        let state = self.state()?;
        let record = self.configured(index)?;
        let entry = ScheduleEntry::new(index, &record, state.deadline, now);
        Ok(entry.status == RoundStatus::Open && !state.lifecycle.is_paused())
    }

    /// Financed tokens still claimable from the round.
    pub fn remaining(&self, index: RoundIndex) -> Result<Amount, DistributionError> {
        Ok(self.configured(index)?.remaining())
    }

    /// Every configured round in index order.
    pub fn schedule(&self, now: Timestamp) -> Result<Vec<ScheduleEntry>, DistributionError> {
        let deadline = self.state()?.deadline;
        Ok(self
            .db
            .iter_rounds()?
            .iter()
            .map(|(index, record)| ScheduleEntry::new(*index, record, deadline, now))
            .collect())
    }

    /// Rounds `user` has already redeemed.
    pub fn claimed_rounds(&self, user: &AccountId) -> Result<Vec<RoundIndex>, DistributionError> {
        let mut out = Vec::new();
        for index in 0..self.state()?.number_of_rounds {
            if self.db.has_claimed(user, index)? {
                out.push(index);
            }
        }
        Ok(out)
    }

    pub fn summary(&self, now: Timestamp) -> Result<LedgerSummary, DistributionError> {
        let state = self.state()?;
        let config = self.db.get_config()?.ok_or(DistributionError::NotDeployed)?;
        let open_rounds = if state.lifecycle.is_paused() {
            Vec::new()
        } else {
            self.schedule(now)?
                .into_iter()
                .filter(|e| e.status == RoundStatus::Open)
                .map(|e| e.index)
                .collect()
        };
        Ok(LedgerSummary {
            ledger_id: config.ledger_id,
            available_for_withdrawal: state.available_for_withdrawal(),
            owner: state.owner,
            pending_owner: state.pending_owner,
            operator: state.operator,
            lifecycle: state.lifecycle,
            number_of_rounds: state.number_of_rounds,
            setup_complete: state.setup_complete,
            deadline: state.deadline,
            total_deposited: state.total_deposited,
            total_claimed: state.total_claimed,
            total_withdrawn: state.total_withdrawn,
            open_rounds,
        })
    }

    /// Human-readable one-line summary of a round's state.
    pub fn describe(&self, index: RoundIndex, now: Timestamp) -> Result<String, DistributionError> {
        let state = self.state()?;
        let record = self.configured(index)?;
        let entry = ScheduleEntry::new(index, &record, state.deadline, now);
        let status = if state.lifecycle.is_paused() && entry.status == RoundStatus::Open {
            "open (ledger paused)".to_string()
        } else {
            entry.status.to_string()
        };
        Ok(format!(
            "Round {} | starts {} | allocation {} | deposited {} | claimed {} | remaining {} | {}",
            index,
            record.start_time,
            record.allocation,
            record.deposited,
            record.claimed,
            record.remaining(),
            status
        ))
    }
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |a: &Option<AccountId>| a.as_ref().map_or("none".to_string(), |a| a.to_string());
        writeln!(f, "Ledger:            {}", self.ledger_id)?;
        writeln!(f, "Owner:             {}", show(&self.owner))?;
        if self.pending_owner.is_some() {
            writeln!(f, "Pending owner:     {}", show(&self.pending_owner))?;
        }
        writeln!(f, "Operator:          {}", self.operator)?;
        writeln!(f, "Lifecycle:         {:?}", self.lifecycle)?;
        writeln!(
            f,
            "Rounds:            {}{}",
            self.number_of_rounds,
            if self.setup_complete { "" } else { " (not set up)" }
        )?;
        match self.deadline {
            Some(d) => writeln!(f, "Deadline:          {}", d)?,
            None => writeln!(f, "Deadline:          unset (withdrawal disabled)")?,
        }
        writeln!(f, "Total deposited:   {}", self.total_deposited)?;
        writeln!(f, "Total claimed:     {}", self.total_claimed)?;
        writeln!(f, "Total withdrawn:   {}", self.total_withdrawn)?;
        writeln!(f, "Withdrawable:      {}", self.available_for_withdrawal)?;
        write!(f, "Open rounds:       {:?}", self.open_rounds)
    }
}
