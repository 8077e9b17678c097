//! Competition slots.

use serde::Serialize;

use grove_types::{Address, SlotId};

use crate::{CompetitionError, Result};

/// One competition and its amplifier pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompetitionSlot {
    /// Slot identifier.
    pub id: SlotId,
    /// Fees attributed to this slot, paid to the winner on settlement.
    pub amplifier_pool: u64,
    /// Fee attributions recorded while open.
    pub attempts: u64,
    /// Declared winner.
    pub winner: Option<Address>,
    /// Terminal: set once by winner declaration.
    pub completed: bool,
    /// Whether the amplifier pool has been paid out.
    pub settled: bool,
}

impl CompetitionSlot {
    pub(crate) fn new(id: SlotId) -> Self {
        Self {
            id,
            amplifier_pool: 0,
            attempts: 0,
            winner: None,
            completed: false,
            settled: false,
        }
    }

    /// Count one attempt and add `fee` to the amplifier pool.
    pub(crate) fn record_attempt(&mut self, fee: u64) -> Result<()> {
        if self.completed {
            return Err(CompetitionError::SlotCompleted(self.id));
        }
        self.attempts = self.attempts.checked_add(1).ok_or(CompetitionError::Overflow)?;
        self.amplifier_pool = self
            .amplifier_pool
            .checked_add(fee)
            .ok_or(CompetitionError::Overflow)?;
        Ok(())
    }

    /// Close the slot with `winner`. Returns the payout basis.
    pub(crate) fn declare_winner(&mut self, winner: Address) -> Result<u64> {
        if self.completed {
            return Err(CompetitionError::SlotCompleted(self.id));
        }
        if winner.is_zero() {
            return Err(CompetitionError::ZeroWinner);
        }
        if self.attempts == 0 {
            return Err(CompetitionError::NoAttempts(self.id));
        }
        self.winner = Some(winner);
        self.completed = true;
        Ok(self.amplifier_pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = CompetitionSlot::new(1);
        let winner = Address::from_low_u64(5);
        assert_eq!(
            slot.declare_winner(winner).expect_err("no attempts"),
            CompetitionError::NoAttempts(1)
        );

        slot.record_attempt(30).expect("attempt");
        slot.record_attempt(0).expect("attempt");
        assert_eq!(slot.attempts, 2);
        assert_eq!(slot.amplifier_pool, 30);

        assert_eq!(
            slot.declare_winner(Address::ZERO).expect_err("null winner"),
            CompetitionError::ZeroWinner
        );
        assert_eq!(slot.declare_winner(winner).expect("declare"), 30);
        assert_eq!(slot.winner, Some(winner));

        assert_eq!(
            slot.declare_winner(winner).expect_err("terminal"),
            CompetitionError::SlotCompleted(1)
        );
        assert_eq!(
            slot.record_attempt(10).expect_err("terminal"),
            CompetitionError::SlotCompleted(1)
        );
        assert_eq!(slot.amplifier_pool, 30);
    }
}
