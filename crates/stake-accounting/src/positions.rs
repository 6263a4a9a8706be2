//! Position records and the lock state machine
//!
//! A position is one deposit's lock-lifecycle record. State is never
//! stored; it is derived from the position's epochs and the current
//! epoch, so "time passing" needs no background bookkeeping.
//!
//! Per-position lifecycle:
//!
//! ```text
//! Locking -> Locked              (epoch advances past activation+1)
//! Locking -> Preunlocking        (unlock requested early)
//! Locked  -> Preunlocking        (unlock requested)
//! Preunlocking -> Unlocking      (epoch advances past unlocking_start)
//! Unlocking -> Unlocked          (epoch advances past unlocking_start+1)
//! Unlocked -> (removed)          (withdrawal consumes the amount)
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants;
use crate::epochs::Epoch;

/// Derived lock state of a position at some epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    /// Deposited this epoch or the previous one; counts as locked
    Locking,
    /// Fully locked, no unlock requested
    Locked,
    /// Unlock requested, start boundary not yet passed
    Preunlocking,
    /// Cooldown epoch after the start boundary
    Unlocking,
    /// Cooldown complete, amount is withdrawable
    Unlocked,
}

impl LockState {
    /// Locking and Locked both count toward the locked balance an
    /// unlock request may draw from
    pub fn is_lockable(self) -> bool {
        matches!(self, LockState::Locking | LockState::Locked)
    }

    /// Preunlocking and Unlocking share the `locked.unlocking` bucket
    pub fn is_unlocking(self) -> bool {
        matches!(self, LockState::Preunlocking | LockState::Unlocking)
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockState::Locking => write!(f, "locking"),
            LockState::Locked => write!(f, "locked"),
            LockState::Preunlocking => write!(f, "preunlocking"),
            LockState::Unlocking => write!(f, "unlocking"),
            LockState::Unlocked => write!(f, "unlocked"),
        }
    }
}

impl FromStr for LockState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "locking" => Ok(LockState::Locking),
            "locked" => Ok(LockState::Locked),
            "preunlocking" => Ok(LockState::Preunlocking),
            "unlocking" => Ok(LockState::Unlocking),
            "unlocked" => Ok(LockState::Unlocked),
            _ => anyhow::bail!("Invalid lock state: {}", s),
        }
    }
}

/// One deposit's lock record
///
/// `amount` is in the smallest token unit and is always > 0 for a
/// position that exists; withdrawal removes positions instead of
/// leaving zero-amount husks behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub amount: u64,
    pub activation_epoch: Epoch,
    /// Set exactly once, by the unlock request that targets this position
    pub unlocking_start: Option<Epoch>,
}

impl Position {
    pub fn new(amount: u64, activation_epoch: Epoch) -> Self {
        Self {
            amount,
            activation_epoch,
            unlocking_start: None,
        }
    }

    /// Classify this position's lock state at `current_epoch`
    pub fn state(&self, current_epoch: Epoch) -> LockState {
        match self.unlocking_start {
            None => {
                if current_epoch <= self.activation_epoch.saturating_add(constants::LOCKUP_WARMUP_EPOCHS) {
                    LockState::Locking
                } else {
                    LockState::Locked
                }
            }
            Some(start) => {
                // An unlock requested during the warmup targets tokens
                // that never finished locking; they skip the cooldown
                // and are withdrawable right away.
                if start <= self.activation_epoch.saturating_add(constants::LOCKUP_WARMUP_EPOCHS) {
                    return LockState::Unlocked;
                }
                if current_epoch <= start {
                    LockState::Preunlocking
                } else if current_epoch <= start.saturating_add(constants::UNLOCK_COOLDOWN_EPOCHS) {
                    LockState::Unlocking
                } else {
                    LockState::Unlocked
                }
            }
        }
    }
}
