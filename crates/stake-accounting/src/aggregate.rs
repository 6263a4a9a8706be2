//! Pool-wide locked balance tally
//!
//! Tracks the total amount locked across all stake accounts without
//! walking every account: deposits and unlock requests adjust a signed
//! delta that folds into the locked total once the next epoch begins.
//! If several epochs pass between touches the arithmetic is unchanged,
//! because nothing can have moved in epochs where no operation ran.

use serde::{Deserialize, Serialize};

use crate::epochs::Epoch;
use crate::error::{Result, StakeError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedAggregate {
    pub last_update_epoch: Epoch,
    /// Total locked as of `last_update_epoch`
    pub locked: u64,
    /// Net change taking effect at the next epoch boundary
    pub delta_locked: i64,
}

impl LockedAggregate {
    /// Fold the pending delta in if at least one epoch has passed
    pub fn update(&mut self, current_epoch: Epoch) -> Result<()> {
        let elapsed = current_epoch
            .checked_sub(self.last_update_epoch)
            .ok_or_else(|| StakeError::pool_invariant("current epoch behind last update"))?;
        self.last_update_epoch = current_epoch;

        if elapsed == 0 {
            return Ok(());
        }

        self.locked = (self.locked as i64)
            .checked_add(self.delta_locked)
            .ok_or_else(|| StakeError::pool_invariant("locked total overflow"))?
            .try_into()
            .map_err(|_| StakeError::pool_invariant("locked total went negative"))?;
        self.delta_locked = 0;
        Ok(())
    }

    /// Record a deposit; takes effect at the next epoch boundary
    pub fn add_locking(&mut self, amount: u64, current_epoch: Epoch) -> Result<()> {
        self.update(current_epoch)?;

        self.delta_locked = self
            .delta_locked
            .checked_add(amount as i64)
            .ok_or_else(|| StakeError::pool_invariant("delta overflow on lock"))?;
        Ok(())
    }

    /// Record an unlock request; takes effect at the next epoch boundary
    ///
    /// Rejects any delta that would drive the projected locked total
    /// negative, since that would mean more unlocked than ever locked.
    pub fn add_unlocking(&mut self, amount: u64, current_epoch: Epoch) -> Result<()> {
        self.update(current_epoch)?;

        // Validate before assigning so a rejected unlock leaves the
        // tally untouched
        let new_delta = self
            .delta_locked
            .checked_sub(amount as i64)
            .ok_or_else(|| StakeError::pool_invariant("delta overflow on unlock"))?;
        let projected = (self.locked as i64)
            .checked_add(new_delta)
            .ok_or_else(|| StakeError::pool_invariant("projected total overflow"))?;
        if projected < 0 {
            return Err(StakeError::pool_invariant("unlock exceeds pool locked total"));
        }

        self.delta_locked = new_delta;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_without_activity_only_advances_epoch() {
        let mut aggregate = LockedAggregate::default();
        aggregate.update(10).unwrap();
        assert_eq!(aggregate.last_update_epoch, 10);
        assert_eq!(aggregate.locked, 0);
        assert_eq!(aggregate.delta_locked, 0);
    }

    #[test]
    fn deposit_folds_in_at_next_epoch() {
        let mut aggregate = LockedAggregate::default();
        aggregate.add_locking(10, 0).unwrap();
        assert_eq!(aggregate.locked, 0);
        assert_eq!(aggregate.delta_locked, 10);

        aggregate.update(1).unwrap();
        assert_eq!(aggregate.locked, 10);
        assert_eq!(aggregate.delta_locked, 0);
    }

    #[test]
    fn unlock_folds_in_even_after_idle_epochs() {
        let mut aggregate = LockedAggregate {
            last_update_epoch: 0,
            locked: 30,
            delta_locked: 0,
        };
        aggregate.add_unlocking(30, 0).unwrap();
        assert_eq!(aggregate.locked, 30);
        assert_eq!(aggregate.delta_locked, -30);

        aggregate.update(2).unwrap();
        assert_eq!(aggregate.locked, 0);
        assert_eq!(aggregate.delta_locked, 0);
    }

    #[test]
    fn unlock_bigger_than_locked_is_rejected() {
        let mut aggregate = LockedAggregate {
            last_update_epoch: 0,
            locked: 30,
            delta_locked: 0,
        };
        assert!(aggregate.add_unlocking(40, 0).is_err());

        // Rejection leaves the tally untouched
        assert_eq!(aggregate.locked, 30);
        assert_eq!(aggregate.delta_locked, 0);

        aggregate.update(5).unwrap();
        assert_eq!(aggregate.last_update_epoch, 5);
        assert_eq!(aggregate.locked, 30);
        assert!(aggregate.add_unlocking(40, 5).is_err());
    }
}
