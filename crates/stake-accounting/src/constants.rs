//! Shared constants for the staking engine

/// Default epoch length in seconds when the config does not set one
pub const DEFAULT_EPOCH_DURATION_SECS: i64 = 3_600;

/// Default genesis timestamp (unix seconds); epoch 0 starts here
pub const DEFAULT_GENESIS_TIMESTAMP: i64 = 0;

/// Number of epochs an unlock request spends cooling down after its
/// start epoch passes (preunlocking boundary + one unlocking epoch)
pub const UNLOCK_COOLDOWN_EPOCHS: u64 = 1;

/// Number of epochs a fresh deposit spends in the Locking state
/// (the deposit epoch itself plus one full epoch)
pub const LOCKUP_WARMUP_EPOCHS: u64 = 1;
