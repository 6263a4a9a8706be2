//! Epoch arithmetic
//!
//! Every locking/unlocking transition in the engine happens on epoch
//! boundaries. An epoch is a fixed-duration time bucket counted from a
//! deployment-wide genesis timestamp; `epoch_duration` is set once per
//! deployment and never changed afterwards.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Epoch index, counted from genesis
pub type Epoch = u64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Converts raw timestamps into epoch indices
///
/// Pure and deterministic: the same (genesis, duration, timestamp)
/// always yields the same epoch. Timestamps before genesis are a
/// deployment misconfiguration, not a runtime error; they clamp to
/// epoch 0 so `epoch_of` stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    genesis: Timestamp,
    epoch_duration_secs: i64,
}

impl EpochClock {
    pub fn new(genesis: Timestamp, epoch_duration_secs: i64) -> Self {
        assert!(epoch_duration_secs > 0, "epoch duration must be positive");
        Self {
            genesis,
            epoch_duration_secs,
        }
    }

    /// Epoch index containing `timestamp`; non-decreasing in `timestamp`
    pub fn epoch_of(&self, timestamp: Timestamp) -> Epoch {
        let elapsed = timestamp.saturating_sub(self.genesis);
        if elapsed < 0 {
            return 0;
        }
        (elapsed / self.epoch_duration_secs) as Epoch
    }

    /// Timestamp at which `epoch` begins
    pub fn epoch_start(&self, epoch: Epoch) -> Timestamp {
        self.genesis.saturating_add((epoch as i64).saturating_mul(self.epoch_duration_secs))
    }

    pub fn epoch_duration_secs(&self) -> i64 {
        self.epoch_duration_secs
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new(
            constants::DEFAULT_GENESIS_TIMESTAMP,
            constants::DEFAULT_EPOCH_DURATION_SECS,
        )
    }
}

/// Wall-clock time source for callers that do not supply their own
/// timestamps. The engine itself never reads this implicitly; every
/// query and operation takes the current time as a parameter.
pub trait TimeSource {
    fn now(&self) -> Timestamp;
}

/// System time via chrono
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}
