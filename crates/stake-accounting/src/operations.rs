//! Account operations: the engine's mutating surface
//!
//! Every operation follows the same shape: load the owner's account,
//! validate the request against a freshly computed balance summary,
//! build the candidate state, re-check conservation, then persist via
//! compare-and-swap. A lost CAS race restarts the whole cycle, which
//! is what serializes concurrent mutations per account; operations on
//! different owners never contend. Nothing is persisted and custody is
//! never touched for a request that fails validation, so failed calls
//! leave all state exactly as it was.

use solana_sdk::pubkey::Pubkey;
use std::sync::Mutex;

use crate::accounts::{self, BalanceSummary, StakeAccount};
use crate::aggregate::LockedAggregate;
use crate::custody::CustodyLedger;
use crate::epochs::{Epoch, EpochClock, Timestamp};
use crate::error::{Result, StakeError};
use crate::positions::{LockState, Position};
use crate::store::AccountStore;
use crate::vesting::VestingSchedule;

/// Identifies the account and position a deposit landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRef {
    pub owner: Pubkey,
    /// Index into the account's position list at deposit time
    pub index: usize,
}

/// The accounting engine over a store and a custody ledger
pub struct StakeEngine<S, L> {
    clock: EpochClock,
    store: S,
    custody: L,
    /// Best-effort pool-wide locked tally, fed on deposit and unlock
    aggregate: Mutex<LockedAggregate>,
}

impl<S: AccountStore, L: CustodyLedger> StakeEngine<S, L> {
    pub fn new(clock: EpochClock, store: S, custody: L) -> Self {
        Self {
            clock,
            store,
            custody,
            aggregate: Mutex::new(LockedAggregate::default()),
        }
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn custody(&self) -> &L {
        &self.custody
    }

    /// Snapshot of the pool-wide locked tally
    pub fn locked_aggregate(&self) -> LockedAggregate {
        *self.aggregate.lock().expect("aggregate poisoned")
    }

    /// Deposit `amount` and lock it as a fresh position
    ///
    /// Creates the account on first deposit. Each call appends one new
    /// position with the current epoch as its activation epoch;
    /// existing positions are never merged.
    pub async fn deposit_and_lock(&self, owner: &Pubkey, amount: u64, now: Timestamp) -> Result<PositionRef> {
        if amount == 0 {
            return Err(StakeError::InvalidAmount);
        }
        let current_epoch = self.clock.epoch_of(now);

        loop {
            match self.store.load(owner).await? {
                None => {
                    let mut account = StakeAccount::new(*owner);
                    account.positions.push(Position::new(amount, current_epoch));
                    account.token_balance = amount;
                    self.ensure_conserved(&account, now)?;

                    if self.store.insert(&account).await? {
                        self.custody.credit(owner, amount)?;
                        self.record_locking(amount, current_epoch);
                        return Ok(PositionRef { owner: *owner, index: 0 });
                    }
                    // A concurrent creator won; retry as an update
                }
                Some(versioned) => {
                    let mut account = versioned.account;
                    self.ensure_conserved(&account, now)?;

                    account.token_balance = account
                        .token_balance
                        .checked_add(amount)
                        .ok_or_else(|| StakeError::invariant(owner, "token balance overflow on deposit"))?;
                    account.positions.push(Position::new(amount, current_epoch));
                    let index = account.positions.len() - 1;
                    self.ensure_conserved(&account, now)?;

                    if self.store.update(&account, versioned.version).await? {
                        self.custody.credit(owner, amount)?;
                        self.record_locking(amount, current_epoch);
                        return Ok(PositionRef { owner: *owner, index });
                    }
                    // Lost the CAS race; reload and revalidate
                }
            }
        }
    }

    /// Deposit `amount` into the account's vesting pool under `schedule`
    ///
    /// Vesting tokens carry no position; they surface as `unvested` in
    /// summaries until the schedule releases them, then count as
    /// withdrawable.
    pub async fn deposit_with_vesting(
        &self,
        owner: &Pubkey,
        amount: u64,
        schedule: VestingSchedule,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(StakeError::InvalidAmount);
        }

        loop {
            match self.store.load(owner).await? {
                None => {
                    let mut account = StakeAccount::new(*owner);
                    account.token_balance = amount;
                    account.vesting_schedule = schedule;
                    self.ensure_conserved(&account, now)?;

                    if self.store.insert(&account).await? {
                        self.custody.credit(owner, amount)?;
                        return Ok(());
                    }
                }
                Some(versioned) => {
                    if !versioned.account.vesting_schedule.is_none() {
                        return Err(StakeError::VestingAlreadyConfigured);
                    }
                    let mut account = versioned.account;
                    self.ensure_conserved(&account, now)?;

                    account.token_balance = account
                        .token_balance
                        .checked_add(amount)
                        .ok_or_else(|| StakeError::invariant(owner, "token balance overflow on vesting deposit"))?;
                    account.vesting_schedule = schedule;
                    self.ensure_conserved(&account, now)?;

                    if self.store.update(&account, versioned.version).await? {
                        self.custody.credit(owner, amount)?;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Request an unlock of `amount` from locking/locked positions
    ///
    /// Selection policy (stable): walk positions oldest-first in
    /// insertion order, consume whole positions, and split the last one
    /// when only part of it is needed. The split-off portion starts
    /// unlocking at the current epoch; the remainder keeps its fields.
    pub async fn unlock_tokens(&self, owner: &Pubkey, amount: u64, now: Timestamp) -> Result<()> {
        if amount == 0 {
            return Err(StakeError::InvalidAmount);
        }
        let current_epoch = self.clock.epoch_of(now);

        loop {
            let versioned = self
                .store
                .load(owner)
                .await?
                .ok_or(StakeError::AccountNotFound(*owner))?;
            let mut account = versioned.account;
            self.ensure_conserved(&account, now)?;

            let summary = accounts::summarize(&account, &self.clock, now);
            if amount > summary.lockable() {
                return Err(StakeError::InsufficientLockedBalance);
            }

            mark_unlocking(&mut account.positions, amount, current_epoch)
                .map_err(|detail| StakeError::invariant(owner, detail))?;
            self.ensure_conserved(&account, now)?;

            if self.store.update(&account, versioned.version).await? {
                self.record_unlocking(amount, current_epoch);
                return Ok(());
            }
        }
    }

    /// Withdraw `amount` from the withdrawable bucket
    ///
    /// Drains the vested free pool first, then unlocked positions
    /// oldest-first; positions drained to zero are removed. Releases
    /// the amount from custody back to the owner.
    pub async fn withdraw_tokens(&self, owner: &Pubkey, amount: u64, now: Timestamp) -> Result<()> {
        if amount == 0 {
            return Err(StakeError::InvalidAmount);
        }
        let current_epoch = self.clock.epoch_of(now);

        loop {
            let versioned = self
                .store
                .load(owner)
                .await?
                .ok_or(StakeError::AccountNotFound(*owner))?;
            let mut account = versioned.account;
            self.ensure_conserved(&account, now)?;

            let summary = accounts::summarize(&account, &self.clock, now);
            if amount > summary.withdrawable {
                return Err(StakeError::ExceedsWithdrawable);
            }

            // Vested free pool first, so position history survives as
            // long as possible
            let free_vested = account.free_balance().saturating_sub(summary.unvested);
            let mut remaining = amount.saturating_sub(free_vested.min(amount));

            for position in account.positions.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if position.state(current_epoch) != LockState::Unlocked {
                    continue;
                }
                let take = position.amount.min(remaining);
                position.amount -= take;
                remaining -= take;
            }
            if remaining > 0 {
                return Err(StakeError::invariant(owner, "withdrawable bucket undercovered the request"));
            }
            account.positions.retain(|p| p.amount > 0);

            account.token_balance = account
                .token_balance
                .checked_sub(amount)
                .ok_or_else(|| StakeError::invariant(owner, "token balance underflow on withdraw"))?;
            self.ensure_conserved(&account, now)?;

            if self.store.update(&account, versioned.version).await? {
                self.custody.release(owner, amount)?;
                return Ok(());
            }
        }
    }

    /// All stake accounts for `owner` (zero or one by design)
    pub async fn get_stake_accounts(&self, owner: &Pubkey) -> Result<Vec<StakeAccount>> {
        self.store.accounts_for(owner).await
    }

    /// Balance summary for `owner` as of `now`
    pub async fn summarize_owner(&self, owner: &Pubkey, now: Timestamp) -> Result<BalanceSummary> {
        let versioned = self
            .store
            .load(owner)
            .await?
            .ok_or(StakeError::AccountNotFound(*owner))?;
        Ok(accounts::summarize(&versioned.account, &self.clock, now))
    }

    // The pool tally is observability, not a gate: per-account
    // validation already ran, and a tally rebuilt from an older store
    // must not fail user operations. Log and move on.
    fn record_locking(&self, amount: u64, current_epoch: Epoch) {
        let result = self
            .aggregate
            .lock()
            .expect("aggregate poisoned")
            .add_locking(amount, current_epoch);
        if let Err(err) = result {
            eprintln!("Warning: pool locked tally out of step: {}", err);
        }
    }

    fn record_unlocking(&self, amount: u64, current_epoch: Epoch) {
        let result = self
            .aggregate
            .lock()
            .expect("aggregate poisoned")
            .add_unlocking(amount, current_epoch);
        if let Err(err) = result {
            eprintln!("Warning: pool locked tally out of step: {}", err);
        }
    }

    /// Refuse to mutate an account whose buckets no longer sum to its
    /// custody balance
    fn ensure_conserved(&self, account: &StakeAccount, now: Timestamp) -> Result<()> {
        if account.positions.iter().any(|p| p.amount == 0) {
            return Err(StakeError::invariant(&account.owner, "zero-amount position present"));
        }
        if !accounts::check_conservation(account, &self.clock, now) {
            return Err(StakeError::invariant(
                &account.owner,
                "bucket sum does not match token balance",
            ));
        }
        Ok(())
    }
}

/// Mark positions covering exactly `amount` as unlocking, oldest-first
///
/// Splits the last touched position when only part of its amount is
/// needed; the split preserves totals exactly. Returns an error string
/// when eligible positions cannot cover the amount, which the caller
/// treats as an invariant violation because it validated first.
fn mark_unlocking(positions: &mut Vec<Position>, amount: u64, current_epoch: Epoch) -> std::result::Result<(), String> {
    let mut remaining = amount;
    let mut split_off: Option<Position> = None;

    for position in positions.iter_mut() {
        if remaining == 0 {
            break;
        }
        if !position.state(current_epoch).is_lockable() {
            continue;
        }

        if position.amount <= remaining {
            remaining -= position.amount;
            position.unlocking_start = Some(current_epoch);
        } else {
            // Partial: remainder stays locked, split-off begins unlocking
            position.amount -= remaining;
            split_off = Some(Position {
                amount: remaining,
                activation_epoch: position.activation_epoch,
                unlocking_start: Some(current_epoch),
            });
            remaining = 0;
        }
    }

    if remaining > 0 {
        return Err("locked positions undercovered the unlock request".to_string());
    }
    if let Some(position) = split_off {
        positions.push(position);
    }
    Ok(())
}
