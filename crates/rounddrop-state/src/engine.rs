use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rounddrop_core::constants::DEADLINE_BUFFER_SECS;
use rounddrop_core::error::{DistributionError, TokenError};
use rounddrop_core::event::LedgerEvent;
use rounddrop_core::round::{LedgerConfig, LedgerState, LifecycleState, RoundRecord};
use rounddrop_core::types::{
    AccountId, Amount, ClaimDigest, DilithiumPublicKey, DilithiumSignature, RoundIndex, Timestamp,
};
use rounddrop_crypto::domain::DomainSeparator;
use rounddrop_crypto::hash::account_id_from_pubkey;
use rounddrop_crypto::verify_signature;
use tracing::{debug, info, warn};

use crate::db::{ChangeSet, LedgerDb};
use crate::params::DeployParams;
use crate::token::TokenLedger;

// ── Call context ──────────────────────────────────────────────────────────────

/// Who is calling and when. The host authenticates `caller`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: AccountId,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: AccountId, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

// ── Staged mutations ──────────────────────────────────────────────────────────

/// All state changes staged by an entry point before atomic commit.
#[derive(Default)]
struct StagedMutations {
    state: Option<LedgerState>,
    rounds: BTreeMap<RoundIndex, RoundRecord>,
    latches: Vec<(AccountId, RoundIndex)>,
    events: Vec<LedgerEvent>,
}

/// Inverse of a committed call, applied when its outbound token call fails.
///
/// Counters are reverted by delta so that writes committed by a reentrant
/// nested call survive.
#[derive(Default)]
struct Undo {
    event_ids: Vec<u64>,
    latches: Vec<(AccountId, RoundIndex)>,
    claimed: Vec<(RoundIndex, Amount)>,
    financed: Vec<(RoundIndex, Amount)>,
    total_claimed: Amount,
    total_deposited: Amount,
    total_withdrawn: Amount,
}

// ── DistributionEngine ────────────────────────────────────────────────────────

/// The distribution state machine.
///
/// Every entry point validates completely, commits its ledger writes in one
/// transaction, and only then calls out to the token ledger. A failed token
/// call is compensated, so each call either fully commits or leaves no trace.
///
/// Entry points take `&self` so a token may call back into the engine during
/// a payout. While a deposit is pulling tokens from the operator every entry
/// point refuses with `DepositInProgress`, since the rounds being financed are
/// already committed but not yet backed. Outside of such callbacks the host
/// must issue one call at a time per ledger.
pub struct DistributionEngine {
    pub db: Arc<LedgerDb>,
    token: Arc<dyn TokenLedger>,
    config: LedgerConfig,
    domain: DomainSeparator,
    pulling: AtomicBool,
}

impl DistributionEngine {
    /// Write a fresh ledger into `db`.
    pub fn deploy(
        db: Arc<LedgerDb>,
        token: Arc<dyn TokenLedger>,
        params: DeployParams,
        now: Timestamp,
    ) -> Result<Self, DistributionError> {
        if db.get_config()?.is_some() {
            return Err(DistributionError::AlreadyDeployed);
        }
        let config = LedgerConfig {
            name: params.name,
            version: params.version,
            chain_id: params.chain_id,
            ledger_id: params.ledger_id,
            signer_key: params.signer_key,
            deployed_at: now,
        };
        let state = LedgerState::new(params.owner, params.operator);
        db.commit(&ChangeSet {
            config: Some(config.clone()),
            state: Some(state),
            ..Default::default()
        })?;
        info!(
            ledger = %config.ledger_id,
            chain_id = config.chain_id,
            signer = %account_id_from_pubkey(&config.signer_key.0),
            "distribution ledger deployed"
        );
        Ok(Self::with_config(db, token, config))
    }

    /// Load a previously deployed ledger from `db`.
    pub fn open(db: Arc<LedgerDb>, token: Arc<dyn TokenLedger>) -> Result<Self, DistributionError> {
        let config = db.get_config()?.ok_or(DistributionError::NotDeployed)?;
        Ok(Self::with_config(db, token, config))
    }

    fn with_config(db: Arc<LedgerDb>, token: Arc<dyn TokenLedger>, config: LedgerConfig) -> Self {
        let domain = DomainSeparator::for_ledger(&config);
        Self {
            db,
            token,
            config,
            domain,
            pulling: AtomicBool::new(false),
        }
    }

    // ── Views ─────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn ledger_id(&self) -> &AccountId {
        &self.config.ledger_id
    }

    pub fn signer_key(&self) -> &DilithiumPublicKey {
        &self.config.signer_key
    }

    pub fn domain(&self) -> &DomainSeparator {
        &self.domain
    }

    pub fn state(&self) -> Result<LedgerState, DistributionError> {
        self.db.get_state()?.ok_or(DistributionError::NotDeployed)
    }

    pub fn round(&self, index: RoundIndex) -> Result<RoundRecord, DistributionError> {
        self.db.get_round(index)
    }

    pub fn has_claimed(&self, user: &AccountId, round: RoundIndex) -> Result<bool, DistributionError> {
        self.db.has_claimed(user, round)
    }

    pub fn deadline(&self) -> Result<Option<Timestamp>, DistributionError> {
        Ok(self.state()?.deadline)
    }

    pub fn number_of_rounds(&self) -> Result<u64, DistributionError> {
        Ok(self.state()?.number_of_rounds)
    }

    pub fn total_deposited(&self) -> Result<Amount, DistributionError> {
        Ok(self.state()?.total_deposited)
    }

    pub fn total_claimed(&self) -> Result<Amount, DistributionError> {
        Ok(self.state()?.total_claimed)
    }

    pub fn is_paused(&self) -> Result<bool, DistributionError> {
        Ok(self.state()?.lifecycle.is_paused())
    }

    pub fn is_frozen(&self) -> Result<bool, DistributionError> {
        Ok(self.state()?.lifecycle.is_frozen())
    }

    pub fn owner(&self) -> Result<Option<AccountId>, DistributionError> {
        Ok(self.state()?.owner)
    }

    pub fn pending_owner(&self) -> Result<Option<AccountId>, DistributionError> {
        Ok(self.state()?.pending_owner)
    }

    pub fn operator(&self) -> Result<AccountId, DistributionError> {
        Ok(self.state()?.operator)
    }

    /// Tokens currently held in the ledger's custody account.
    pub fn custody_balance(&self) -> Result<Amount, DistributionError> {
        Ok(self.token.balance_of(&self.config.ledger_id)?)
    }

    /// The digest a certificate for `(user, round, amount)` must sign.
    pub fn claim_digest(&self, user: &AccountId, round: RoundIndex, amount: Amount) -> ClaimDigest {
        self.domain.claim_digest(user, round, amount)
    }

    pub fn events(&self) -> Result<Vec<LedgerEvent>, DistributionError> {
        Ok(self.db.events()?.into_iter().map(|(_, e)| e).collect())
    }

    // ── Entitlement verification ──────────────────────────────────────────────

    /// Check `certificate` against the trusted signer; returns the signer's id.
    pub fn verify(
        &self,
        claimant: &AccountId,
        round: RoundIndex,
        amount: Amount,
        certificate: &DilithiumSignature,
    ) -> Result<AccountId, DistributionError> {
        let digest = self.claim_digest(claimant, round, amount);
        verify_signature(&self.config.signer_key, digest.as_bytes(), certificate)
            .map_err(|_| DistributionError::InvalidSignature)?;
        Ok(account_id_from_pubkey(&self.config.signer_key.0))
    }

    // ── Round registry ────────────────────────────────────────────────────────

    /// One-shot configuration of the whole schedule.
    pub fn setup_rounds(
        &self,
        ctx: &CallContext,
        start_times: &[Timestamp],
        allocations: &[Amount],
    ) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        if state.setup_complete {
            return Err(DistributionError::AlreadySetup);
        }
        if start_times.is_empty() {
            return Err(DistributionError::EmptyArray);
        }
        if start_times.len() != allocations.len() {
            return Err(DistributionError::IncorrectLengths);
        }

        let mut staged = StagedMutations::default();
        let mut previous = ctx.now;
        let mut total_allocation: Amount = 0;
        for (index, (&start_time, &allocation)) in start_times.iter().zip(allocations).enumerate() {
            if start_time <= previous {
                return Err(DistributionError::IncorrectStartTime { index, previous });
            }
            if allocation == 0 {
                return Err(DistributionError::IncorrectAllocation { index });
            }
            total_allocation = total_allocation
                .checked_add(allocation)
                .ok_or(DistributionError::MathOverflow)?;
            staged.rounds.insert(index as RoundIndex, RoundRecord::new(start_time, allocation));
            previous = start_time;
        }

        let count = start_times.len() as u64;
        let first_start = start_times[0];
        let last_start = start_times[start_times.len() - 1];
        state.number_of_rounds = count;
        state.last_claim_start_time = last_start;
        state.setup_complete = true;
        staged.state = Some(state);
        staged.events.push(LedgerEvent::SetupRounds {
            count,
            first_start,
            last_start,
            total_allocation,
        });
        self.commit(staged)?;
        Ok(())
    }

    // ── Administration ────────────────────────────────────────────────────────

    /// Set the instant at which claiming closes and withdrawal opens.
    ///
    /// May be called repeatedly, including to move the deadline earlier, as
    /// long as it stays at least `DEADLINE_BUFFER_SECS` after the last round start.
    pub fn update_deadline(&self, ctx: &CallContext, new_deadline: Timestamp) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        if !state.setup_complete {
            return Err(DistributionError::NotSetup);
        }
        let min_deadline = state
            .last_claim_start_time
            .checked_add(DEADLINE_BUFFER_SECS)
            .ok_or(DistributionError::MathOverflow)?;
        if new_deadline < min_deadline {
            return Err(DistributionError::InvalidNewDeadline { min_deadline });
        }
        state.deadline = Some(new_deadline);
        self.commit_state(state, LedgerEvent::DeadlineUpdated { deadline: new_deadline })
    }

    pub fn update_operator(&self, ctx: &CallContext, new_operator: AccountId) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        let old = std::mem::replace(&mut state.operator, new_operator.clone());
        self.commit_state(state, LedgerEvent::OperatorUpdated { old, new: new_operator })
    }

    /// First step of an ownership handover; the new owner must accept.
    pub fn transfer_ownership(&self, ctx: &CallContext, new_owner: AccountId) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        state.pending_owner = Some(new_owner.clone());
        self.commit_state(
            state,
            LedgerEvent::OwnershipTransferStarted {
                previous: ctx.caller.clone(),
                pending: new_owner,
            },
        )
    }

    pub fn accept_ownership(&self, ctx: &CallContext) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        if state.pending_owner.as_ref() != Some(&ctx.caller) {
            return Err(DistributionError::NotPendingOwner);
        }
        let previous = state.owner.replace(ctx.caller.clone());
        state.pending_owner = None;
        self.commit_state(
            state,
            LedgerEvent::OwnershipTransferred {
                previous,
                new: Some(ctx.caller.clone()),
            },
        )
    }

    /// Give up ownership for good. Owner-only calls become impossible.
    pub fn renounce_ownership(&self, ctx: &CallContext) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        let previous = state.owner.take();
        state.pending_owner = None;
        self.commit_state(state, LedgerEvent::OwnershipTransferred { previous, new: None })
    }

    // ── Lifecycle guard ───────────────────────────────────────────────────────

    pub fn pause(&self, ctx: &CallContext) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        if state.lifecycle.is_paused() {
            return Err(DistributionError::IsPaused);
        }
        state.lifecycle = LifecycleState::Paused;
        self.commit_state(state, LedgerEvent::Paused { account: ctx.caller.clone() })
    }

    pub fn unpause(&self, ctx: &CallContext) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        match state.lifecycle {
            LifecycleState::Frozen => return Err(DistributionError::IsFrozen),
            LifecycleState::Active => return Err(DistributionError::NotPaused),
            LifecycleState::Paused => {}
        }
        state.lifecycle = LifecycleState::Active;
        self.commit_state(state, LedgerEvent::Unpaused { account: ctx.caller.clone() })
    }

    /// Irreversibly abandon the distribution. Requires a paused ledger.
    pub fn freeze(&self, ctx: &CallContext) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        match state.lifecycle {
            LifecycleState::Frozen => return Err(DistributionError::IsFrozen),
            LifecycleState::Active => return Err(DistributionError::NotPaused),
            LifecycleState::Paused => {}
        }
        state.lifecycle = LifecycleState::Frozen;
        warn!(timestamp = ctx.now, "distribution ledger frozen");
        self.commit_state(state, LedgerEvent::Frozen { timestamp: ctx.now })
    }

    /// Sweep the entire custody balance to `receiver`, ignoring all accounting.
    pub fn emergency_exit(&self, ctx: &CallContext, receiver: AccountId) -> Result<(), DistributionError> {
        let state = self.state_for_call()?;
        require_owner(&state, &ctx.caller)?;
        if !state.lifecycle.is_paused() {
            return Err(DistributionError::NotPaused);
        }
        if !state.lifecycle.is_frozen() {
            return Err(DistributionError::NotFrozen);
        }
        let balance = self.custody_balance()?;

        let mut staged = StagedMutations::default();
        staged.events.push(LedgerEvent::EmergencyExit {
            receiver: receiver.clone(),
            balance,
        });
        let event_ids = self.commit(staged)?;
        warn!(receiver = %receiver, balance, "emergency exit");

        self.send(&receiver, balance, Undo { event_ids, ..Default::default() })
    }

    // ── Operator treasury ─────────────────────────────────────────────────────

    /// Finance each listed round with its full allocation, pulled from the operator.
    pub fn deposit(&self, ctx: &CallContext, rounds: &[RoundIndex]) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_operator(&state, &ctx.caller)?;
        if rounds.is_empty() {
            return Err(DistributionError::EmptyArray);
        }

        let mut staged = StagedMutations::default();
        let mut undo = Undo::default();
        let mut total: Amount = 0;
        for &round in rounds {
            let mut record = self.staged_round(&staged, round)?;
            if !record.is_setup() {
                return Err(DistributionError::RoundNotSetup { round });
            }
            if record.deposited == record.allocation {
                return Err(DistributionError::RoundAlreadyFinanced { round });
            }
            let needed = record.allocation - record.deposited;
            total = total.checked_add(needed).ok_or(DistributionError::MathOverflow)?;
            record.deposited = record.allocation;
            staged.rounds.insert(round, record);
            undo.financed.push((round, needed));
        }

        state.total_deposited = state
            .total_deposited
            .checked_add(total)
            .ok_or(DistributionError::MathOverflow)?;
        staged.state = Some(state);
        staged.events.push(LedgerEvent::Deposited {
            operator: ctx.caller.clone(),
            amount: total,
        });
        undo.total_deposited = total;
        undo.event_ids = self.commit(staged)?;

        let pulled = {
            let _guard = PullGuard::engage(&self.pulling);
            self.pull(&ctx.caller, total)
        };
        let received = match pulled {
            Ok(received) => received,
            Err(e) => {
                warn!(operator = %ctx.caller, amount = total, error = %e, "deposit pull failed");
                return self.abort(undo, e.into());
            }
        };

        let ledger = &self.config.ledger_id;
        if received != total {
            warn!(expected = total, received, "deposit received less than requested; refunding");
            self.revert(&undo)?;
            if received > 0 {
                if let Err(e) = self.token.transfer(ledger, &ctx.caller, received) {
                    warn!(operator = %ctx.caller, amount = received, error = %e, "deposit refund failed");
                }
            }
            return Err(DistributionError::TaxTokenCheckFailed { expected: total, received });
        }

        info!(operator = %ctx.caller, rounds = rounds.len(), amount = total, "rounds financed");
        Ok(())
    }

    /// Sweep every financed but unclaimed token back to the operator after the deadline.
    ///
    /// Withdrawn tokens are counted, so only the first call moves
    /// `total_deposited - total_claimed`. Later calls record and move zero.
    pub fn withdraw(&self, ctx: &CallContext) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_operator(&state, &ctx.caller)?;
        let deadline = state.deadline.ok_or(DistributionError::WithdrawDisabled)?;
        if ctx.now <= deadline {
            return Err(DistributionError::PrematureWithdrawal { deadline });
        }

        let available = state.available_for_withdrawal();
        state.total_withdrawn = state
            .total_withdrawn
            .checked_add(available)
            .ok_or(DistributionError::MathOverflow)?;

        let mut staged = StagedMutations::default();
        staged.state = Some(state);
        staged.events.push(LedgerEvent::Withdrawn {
            operator: ctx.caller.clone(),
            amount: available,
        });
        let event_ids = self.commit(staged)?;

        if available == 0 {
            debug!(operator = %ctx.caller, "nothing left to withdraw");
            return Ok(());
        }
        self.send(
            &ctx.caller,
            available,
            Undo {
                event_ids,
                total_withdrawn: available,
                ..Default::default()
            },
        )
    }

    // ── Claim settlement ──────────────────────────────────────────────────────

    /// Redeem one certificate for the caller.
    pub fn claim(
        &self,
        ctx: &CallContext,
        round: RoundIndex,
        amount: Amount,
        certificate: &DilithiumSignature,
    ) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_not_paused(&state)?;
        require_before_deadline(&state, ctx.now)?;

        let mut staged = StagedMutations::default();
        self.settle_entry(ctx, &mut staged, round, amount, certificate)?;

        state.total_claimed = state
            .total_claimed
            .checked_add(amount)
            .ok_or(DistributionError::MathOverflow)?;
        staged.state = Some(state);
        staged.events.push(LedgerEvent::Claimed {
            user: ctx.caller.clone(),
            round,
            amount,
        });
        let event_ids = self.commit(staged)?;
        info!(user = %ctx.caller, round, amount, "claimed");

        self.send(
            &ctx.caller,
            amount,
            Undo {
                event_ids,
                latches: vec![(ctx.caller.clone(), round)],
                claimed: vec![(round, amount)],
                total_claimed: amount,
                ..Default::default()
            },
        )
    }

    /// Redeem several certificates in one all-or-nothing call with a single payout.
    pub fn claim_multiple(
        &self,
        ctx: &CallContext,
        rounds: &[RoundIndex],
        amounts: &[Amount],
        certificates: &[DilithiumSignature],
    ) -> Result<(), DistributionError> {
        let mut state = self.state_for_call()?;
        require_not_paused(&state)?;
        if rounds.is_empty() {
            return Err(DistributionError::EmptyArray);
        }
        if rounds.len() != amounts.len() || rounds.len() != certificates.len() {
            return Err(DistributionError::IncorrectLengths);
        }
        require_before_deadline(&state, ctx.now)?;

        let mut staged = StagedMutations::default();
        let mut total: Amount = 0;
        for ((&round, &amount), certificate) in rounds.iter().zip(amounts).zip(certificates) {
            self.settle_entry(ctx, &mut staged, round, amount, certificate)?;
            total = total.checked_add(amount).ok_or(DistributionError::MathOverflow)?;
        }

        state.total_claimed = state
            .total_claimed
            .checked_add(total)
            .ok_or(DistributionError::MathOverflow)?;
        staged.state = Some(state);
        staged.events.push(LedgerEvent::ClaimedMultiple {
            user: ctx.caller.clone(),
            rounds: rounds.to_vec(),
            total_amount: total,
        });
        let undo_latches = staged.latches.clone();
        let event_ids = self.commit(staged)?;
        info!(user = %ctx.caller, rounds = rounds.len(), amount = total, "claimed multiple rounds");

        self.send(
            &ctx.caller,
            total,
            Undo {
                event_ids,
                latches: undo_latches,
                claimed: rounds.iter().copied().zip(amounts.iter().copied()).collect(),
                total_claimed: total,
                ..Default::default()
            },
        )
    }

    /// Per-round claim checks, in order: replay latch, certificate, financing,
    /// start time, over-claim. Stages the updated round and the latch.
    fn settle_entry(
        &self,
        ctx: &CallContext,
        staged: &mut StagedMutations,
        round: RoundIndex,
        amount: Amount,
        certificate: &DilithiumSignature,
    ) -> Result<(), DistributionError> {
        if self.staged_latch(staged, &ctx.caller, round)? {
            return Err(DistributionError::UserHasClaimed { round });
        }
        self.verify(&ctx.caller, round, amount, certificate)?;

        let mut record = self.staged_round(staged, round)?;
        if !record.is_financed() {
            return Err(DistributionError::RoundNotFinanced { round });
        }
        if !record.has_started(ctx.now) {
            return Err(DistributionError::RoundNotStarted {
                round,
                start_time: record.start_time,
            });
        }
        // An overflowing sum is necessarily above `deposited`.
        let claimed = record
            .claimed
            .checked_add(amount)
            .filter(|c| *c <= record.deposited)
            .ok_or(DistributionError::RoundFullyClaimed { round })?;
        record.claimed = claimed;

        staged.rounds.insert(round, record);
        staged.latches.push((ctx.caller.clone(), round));
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Ledger state for a mutating entry point.
    fn state_for_call(&self) -> Result<LedgerState, DistributionError> {
        if self.pulling.load(Ordering::SeqCst) {
            return Err(DistributionError::DepositInProgress);
        }
        self.state()
    }

    /// Pull `amount` from `operator` into custody; returns what actually arrived.
    fn pull(&self, operator: &AccountId, amount: Amount) -> Result<Amount, TokenError> {
        let ledger = &self.config.ledger_id;
        let before = self.token.balance_of(ledger)?;
        self.token.transfer_from(ledger, operator, ledger, amount)?;
        let after = self.token.balance_of(ledger)?;
        Ok(after.saturating_sub(before))
    }

    fn staged_round(&self, staged: &StagedMutations, round: RoundIndex) -> Result<RoundRecord, DistributionError> {
        match staged.rounds.get(&round) {
            Some(record) => Ok(*record),
            None => self.db.get_round(round),
        }
    }

    fn staged_latch(
        &self,
        staged: &StagedMutations,
        user: &AccountId,
        round: RoundIndex,
    ) -> Result<bool, DistributionError> {
        if staged.latches.iter().any(|(u, r)| u == user && *r == round) {
            return Ok(true);
        }
        self.db.has_claimed(user, round)
    }

    fn commit_state(&self, state: LedgerState, event: LedgerEvent) -> Result<(), DistributionError> {
        self.commit(StagedMutations {
            state: Some(state),
            events: vec![event],
            ..Default::default()
        })?;
        Ok(())
    }

    /// Write staged mutations atomically; returns the ids of the events written.
    fn commit(&self, staged: StagedMutations) -> Result<Vec<u64>, DistributionError> {
        let mut events = Vec::with_capacity(staged.events.len());
        for event in staged.events {
            events.push((self.db.next_event_id()?, event));
        }
        self.db.commit(&ChangeSet {
            state: staged.state,
            rounds: staged.rounds.into_iter().collect(),
            latch: staged.latches,
            events: events.clone(),
            ..Default::default()
        })?;
        for (id, event) in &events {
            info!(id, kind = event.name(), detail = %event, "ledger event");
        }
        Ok(events.into_iter().map(|(id, _)| id).collect())
    }

    /// Pay `amount` out of custody, compensating the committed call on failure.
    fn send(&self, to: &AccountId, amount: Amount, undo: Undo) -> Result<(), DistributionError> {
        match self.token.transfer(&self.config.ledger_id, to, amount) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(to = %to, amount, error = %e, "payout failed; reverting call");
                self.abort(undo, e.into())
            }
        }
    }

    fn abort(&self, undo: Undo, err: DistributionError) -> Result<(), DistributionError> {
        self.revert(&undo)?;
        Err(err)
    }

    fn revert(&self, undo: &Undo) -> Result<(), DistributionError> {
        let mut state = self.state()?;
        state.total_claimed = state.total_claimed.saturating_sub(undo.total_claimed);
        state.total_deposited = state.total_deposited.saturating_sub(undo.total_deposited);
        state.total_withdrawn = state.total_withdrawn.saturating_sub(undo.total_withdrawn);

        let mut rounds: BTreeMap<RoundIndex, RoundRecord> = BTreeMap::new();
        for (round, amount) in &undo.claimed {
            let record = self.reverted_round(&mut rounds, *round)?;
            record.claimed = record.claimed.saturating_sub(*amount);
        }
        for (round, amount) in &undo.financed {
            let record = self.reverted_round(&mut rounds, *round)?;
            record.deposited = record.deposited.saturating_sub(*amount);
        }

        self.db.commit(&ChangeSet {
            state: Some(state),
            rounds: rounds.into_iter().collect(),
            unlatch: undo.latches.clone(),
            drop_events: undo.event_ids.clone(),
            ..Default::default()
        })?;
        debug!(events = undo.event_ids.len(), "call reverted");
        Ok(())
    }

    fn reverted_round<'m>(
        &self,
        rounds: &'m mut BTreeMap<RoundIndex, RoundRecord>,
        round: RoundIndex,
    ) -> Result<&'m mut RoundRecord, DistributionError> {
        Ok(match rounds.entry(round) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.db.get_round(round)?),
        })
    }
}

// ── Guards ────────────────────────────────────────────────────────────────────

/// Marks a deposit pull as in flight until dropped.
struct PullGuard<'a>(&'a AtomicBool);

impl<'a> PullGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn require_owner(state: &LedgerState, caller: &AccountId) -> Result<(), DistributionError> {
    if state.is_owner(caller) {
        Ok(())
    } else {
        Err(DistributionError::NotOwner)
    }
}

fn require_operator(state: &LedgerState, caller: &AccountId) -> Result<(), DistributionError> {
    if state.operator == *caller {
        Ok(())
    } else {
        Err(DistributionError::IncorrectCaller)
    }
}

fn require_not_paused(state: &LedgerState) -> Result<(), DistributionError> {
    if state.lifecycle.is_paused() {
        Err(DistributionError::IsPaused)
    } else {
        Ok(())
    }
}

fn require_before_deadline(state: &LedgerState, now: Timestamp) -> Result<(), DistributionError> {
    match state.deadline {
        Some(deadline) if now >= deadline => Err(DistributionError::DeadlineExceeded { deadline }),
        _ => Ok(()),
    }
}
