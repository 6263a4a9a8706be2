//! Stake accounts and balance summaries
//!
//! Tracks the current state of an owner's staked tokens ("where is the
//! money NOW?") as a list of positions plus an optional vesting pool.
//!
//! Key design decisions:
//! - All amounts stored as u64 smallest-token-units, no floats
//! - Lock state is derived on every query, never cached; correctness
//!   depends on the wall-clock-derived epoch, so memoizing by account
//!   identity alone would be wrong
//! - Positions are owned exclusively by their account; nothing outside
//!   this module hands out references to individual positions
//! - Conservation: every summary's buckets sum exactly to token_balance

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::epochs::{EpochClock, Timestamp};
use crate::positions::{LockState, Position};
use crate::vesting::VestingSchedule;

/// An owner's stake account: positions, custody balance, vesting
///
/// There is exactly zero or one account per owner. `token_balance` is
/// everything held in custody for the owner: the sum of position
/// amounts plus the vesting pool (tokens deposited under a schedule
/// that have no position yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAccount {
    pub owner: Pubkey,
    /// Insertion order is creation order; unlock and withdraw select
    /// positions oldest-first by this order
    pub positions: Vec<Position>,
    pub token_balance: u64,
    pub vesting_schedule: VestingSchedule,
}

impl StakeAccount {
    pub fn new(owner: Pubkey) -> Self {
        Self {
            owner,
            positions: Vec::new(),
            token_balance: 0,
            vesting_schedule: VestingSchedule::None,
        }
    }

    /// Sum of all position amounts (saturating; u64 custody totals are
    /// far below the saturation point in practice)
    pub fn positions_total(&self) -> u64 {
        self.positions.iter().fold(0u64, |acc, p| acc.saturating_add(p.amount))
    }

    /// Custody balance not assigned to any position (the vesting pool)
    pub fn free_balance(&self) -> u64 {
        self.token_balance.saturating_sub(self.positions_total())
    }
}

/// Lock-state portion of a balance summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSummary {
    /// Positions deposited this epoch or the previous one
    pub locking: u64,
    /// Fully locked positions
    pub locked: u64,
    /// Preunlocking and unlocking positions combined
    pub unlocking: u64,
}

impl LockedSummary {
    pub fn total(&self) -> u64 {
        self.locking
            .saturating_add(self.locked)
            .saturating_add(self.unlocking)
    }
}

/// Point-in-time breakdown of an account's custody balance
///
/// Buckets are mutually exclusive and sum to `token_balance`; derived
/// on every query, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Still subject to the vesting schedule
    pub unvested: u64,
    pub locked: LockedSummary,
    /// Completed unlocking (or vested free balance), not yet withdrawn
    pub withdrawable: u64,
}

impl BalanceSummary {
    pub fn total(&self) -> u64 {
        self.unvested
            .saturating_add(self.locked.total())
            .saturating_add(self.withdrawable)
    }

    /// Amount an unlock request may draw from
    pub fn lockable(&self) -> u64 {
        self.locked.locking.saturating_add(self.locked.locked)
    }
}

/// Compute the balance summary for `account` as of `time`
///
/// Walks every position, buckets its amount by derived lock state,
/// then splits the free balance between `unvested` (what the schedule
/// still withholds, capped at the free balance) and `withdrawable`.
/// Pure; safe to call concurrently with any read.
pub fn summarize(account: &StakeAccount, clock: &EpochClock, time: Timestamp) -> BalanceSummary {
    let current_epoch = clock.epoch_of(time);

    let mut locked = LockedSummary::default();
    let mut unlocked = 0u64;

    for position in &account.positions {
        match position.state(current_epoch) {
            LockState::Locking => locked.locking = locked.locking.saturating_add(position.amount),
            LockState::Locked => locked.locked = locked.locked.saturating_add(position.amount),
            LockState::Preunlocking | LockState::Unlocking => {
                locked.unlocking = locked.unlocking.saturating_add(position.amount)
            }
            LockState::Unlocked => unlocked = unlocked.saturating_add(position.amount),
        }
    }

    let free = account.free_balance();
    let unvested = account.vesting_schedule.unvested_amount(time).min(free);

    BalanceSummary {
        unvested,
        locked,
        withdrawable: unlocked.saturating_add(free.saturating_sub(unvested)),
    }
}

/// Check the conservation invariant: bucket sum equals custody balance
///
/// Holds by construction for any account whose positions fit inside
/// `token_balance`; a failure means corrupted state and the caller
/// must stop mutating the account.
pub fn check_conservation(account: &StakeAccount, clock: &EpochClock, time: Timestamp) -> bool {
    account.positions_total() <= account.token_balance
        && summarize(account, clock, time).total() == account.token_balance
}
