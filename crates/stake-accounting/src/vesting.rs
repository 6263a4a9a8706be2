//! Vesting schedules
//!
//! Vesting is a time-release mechanism independent of the lock state
//! machine: unvested tokens sit in the account's custody balance
//! outside any position and are excluded from every lock-state bucket.
//! The curve shape is a pluggable strategy behind a single
//! `unvested_amount` query so new curves never touch the aggregator.

use serde::{Deserialize, Serialize};

use crate::epochs::Timestamp;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VestingSchedule {
    /// No vesting; everything outside positions is immediately vested
    #[default]
    None,
    /// Everything releases at once at `release_time`
    Cliff { release_time: Timestamp, amount: u64 },
    /// Linear release from `start_time` over `duration_secs`
    Linear {
        start_time: Timestamp,
        duration_secs: i64,
        amount: u64,
    },
}

impl VestingSchedule {
    /// Amount still unreleased as of `time`; never exceeds the
    /// schedule's total, never negative
    pub fn unvested_amount(&self, time: Timestamp) -> u64 {
        match *self {
            VestingSchedule::None => 0,
            VestingSchedule::Cliff { release_time, amount } => {
                if time < release_time { amount } else { 0 }
            }
            VestingSchedule::Linear {
                start_time,
                duration_secs,
                amount,
            } => {
                if duration_secs <= 0 || time >= start_time.saturating_add(duration_secs) {
                    return 0;
                }
                if time <= start_time {
                    return amount;
                }
                let elapsed = time.saturating_sub(start_time) as u128;
                // u128 intermediate so the interpolation neither loses
                // nor mints units
                let vested = (amount as u128) * elapsed / (duration_secs as u128);
                amount.saturating_sub(vested as u64)
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, VestingSchedule::None)
    }
}
