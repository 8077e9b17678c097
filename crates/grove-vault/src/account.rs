//! Per-depositor records and locked commitments.

use serde::{Deserialize, Serialize};

use grove_types::Address;

use crate::{Result, VaultError};

/// Historical activity of one depositor. Created on first deposit and never
/// removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Lifetime assets deposited.
    pub total_deposited: u64,
    /// Lifetime shares withdrawn (including emergency withdrawals).
    pub total_withdrawn: u64,
    /// Time of first deposit.
    pub first_activity_time: u64,
    /// Time of the most recent deposit or withdrawal.
    pub last_activity_time: u64,
}

impl UserAccount {
    /// A fresh account first seen at `now`.
    pub fn opened_at(now: u64) -> Self {
        Self {
            first_activity_time: now,
            last_activity_time: now,
            ..Self::default()
        }
    }

    pub(crate) fn record_deposit(&mut self, amount: u64, now: u64) -> Result<()> {
        self.total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        self.last_activity_time = now;
        Ok(())
    }

    pub(crate) fn record_withdrawal(&mut self, amount: u64, now: u64) -> Result<()> {
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        self.last_activity_time = now;
        Ok(())
    }
}

/// Shares locked for a period in exchange for an amplified payout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCommitment {
    /// Sequential id within the vault.
    pub id: u64,
    /// Share owner.
    pub owner: Address,
    /// Locked shares.
    pub shares: u64,
    /// When the commitment was made.
    pub committed_at: u64,
    /// When the shares become withdrawable.
    pub unlock_at: u64,
    /// End (exclusive) of the amplified payout window.
    pub claim_until: u64,
    /// Payout multiplier from the matched tier.
    pub multiplier_bps: u32,
}

impl LockedCommitment {
    /// Whether the shares are still locked at `now`.
    pub fn is_locked(&self, now: u64) -> bool {
        now < self.unlock_at
    }

    /// Whether the amplified payout may be claimed at `now`.
    pub fn is_claimable(&self, now: u64) -> bool {
        now >= self.unlock_at && now < self.claim_until
    }
}
