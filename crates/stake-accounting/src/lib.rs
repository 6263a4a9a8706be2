//! Epoch-based token locking and vesting accounting
//!
//! Per-owner stake accounts hold discrete positions, each moving
//! through a time-derived lock state machine; the balance aggregator
//! buckets amounts by state and vesting status, and the engine's
//! operations (deposit, unlock, withdraw) validate every request
//! against a fresh summary before touching custody or storage.
//!
//! All time is passed in explicitly, so the whole engine is
//! deterministic under test with synthetic timestamps.

pub mod accounts;
pub mod aggregate;
pub mod config;
pub mod constants;
pub mod custody;
pub mod epochs;
pub mod error;
pub mod operations;
pub mod positions;
pub mod store;
pub mod vesting;

pub use accounts::{BalanceSummary, LockedSummary, StakeAccount, summarize};
pub use aggregate::LockedAggregate;
pub use custody::{CustodyLedger, MemoryLedger};
pub use epochs::{Epoch, EpochClock, SystemClock, TimeSource, Timestamp};
pub use error::{Result, StakeError};
pub use operations::{PositionRef, StakeEngine};
pub use positions::{LockState, Position};
pub use store::{AccountStore, MemoryStore, SqliteStore};
pub use vesting::VestingSchedule;
