//! Read-only views over an [`AccountingVault`].

use serde::Serialize;

use grove_types::bps::BPS_DENOMINATOR;
use grove_types::{Address, Bank, SECONDS_PER_YEAR};

use crate::account::LockedCommitment;
use crate::vault::AccountingVault;

/// Vault-wide figures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VaultMetrics {
    /// Position in the yield source.
    pub total_assets: u64,
    /// Sum of deposited, not yet withdrawn, principal.
    pub total_principal: u64,
    /// Shares outstanding.
    pub total_supply: u64,
    /// `total_assets - total_principal`, floored at zero.
    pub accumulated_yield: u64,
    /// Lifetime yield paid to distribution buckets.
    pub total_donated: u64,
    /// Harvested yield awaiting distribution.
    pub pending_distribution: u64,
    /// Whether the yield source still covers principal.
    pub healthy: bool,
}

/// One depositor's position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UserSnapshot {
    /// Shares held.
    pub shares: u64,
    /// Shares still under a commitment lock.
    pub locked_shares: u64,
    /// Lifetime deposits.
    pub total_deposited: u64,
    /// Lifetime withdrawals.
    pub total_withdrawn: u64,
    /// Pro-rata share of lifetime distributed yield at the current share count.
    pub yield_contributed: u64,
    /// First deposit.
    pub first_activity_time: u64,
    /// Most recent deposit or withdrawal.
    pub last_activity_time: u64,
}

impl AccountingVault {
    /// The vault's position in the yield source.
    pub fn total_assets(&self, bank: &Bank) -> u64 {
        self.deps.source.balance_of(bank, self.address())
    }

    /// Depositor capital currently held.
    pub fn total_principal(&self) -> u64 {
        self.state.total_principal
    }

    /// Shares outstanding. Always equal to total principal.
    pub fn total_supply(&self) -> u64 {
        self.state.total_shares
    }

    /// Shares held by `owner`, locked or not.
    pub fn shares_of(&self, owner: Address) -> u64 {
        self.state.shares_of(owner)
    }

    /// Harvested yield awaiting distribution.
    pub fn pending_yield(&self) -> u64 {
        self.state.pending_yield
    }

    /// Lifetime yield paid out to buckets.
    pub fn total_yield_distributed(&self) -> u64 {
        self.state.total_yield_distributed
    }

    /// Unix time of the last successful harvest.
    pub fn last_harvest_time(&self) -> u64 {
        self.state.last_harvest_time
    }

    /// Whether deposits and withdrawals are blocked.
    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Whether emergency mode has been activated.
    pub fn is_emergency(&self) -> bool {
        self.state.emergency
    }

    /// Commitments recorded for `owner`.
    pub fn commitments_of(&self, owner: Address) -> impl Iterator<Item = &LockedCommitment> {
        self.state
            .commitments
            .iter()
            .filter(move |c| c.owner == owner)
    }

    /// Shares are minted 1:1.
    pub fn convert_to_shares(&self, assets: u64) -> u64 {
        assets
    }

    /// Shares redeem 1:1.
    pub fn convert_to_assets(&self, shares: u64) -> u64 {
        shares
    }

    /// Largest deposit currently accepted for `receiver`.
    pub fn max_deposit(&self, receiver: Address) -> u64 {
        if receiver.is_zero() {
            return 0;
        }
        self.state.deposit_headroom()
    }

    /// Same as [`max_deposit`](Self::max_deposit), in shares.
    pub fn max_mint(&self, receiver: Address) -> u64 {
        self.convert_to_shares(self.max_deposit(receiver))
    }

    /// Largest withdrawal `owner` can make at `now`, excluding locked shares.
    pub fn max_withdraw(&self, owner: Address, now: u64) -> u64 {
        if self.state.paused {
            return 0;
        }
        self.state.unlocked_shares(owner, now)
    }

    /// Whether the yield source still covers all principal.
    pub fn is_healthy(&self, bank: &Bank) -> bool {
        self.total_assets(bank) >= self.state.total_principal
    }

    /// Snapshot of the public read surface.
    pub fn metrics(&self, bank: &Bank) -> VaultMetrics {
        let total_assets = self.total_assets(bank);
        VaultMetrics {
            total_assets,
            total_principal: self.state.total_principal,
            total_supply: self.state.total_shares,
            accumulated_yield: total_assets.saturating_sub(self.state.total_principal),
            total_donated: self.state.total_yield_distributed,
            pending_distribution: self.state.pending_yield,
            healthy: total_assets >= self.state.total_principal,
        }
    }

    /// Position summary for `user`, or `None` if they never deposited.
    pub fn user_snapshot(&self, user: Address, now: u64) -> Option<UserSnapshot> {
        let account = self.state.accounts.get(&user)?;
        let shares = self.state.shares_of(user);
        let yield_contributed = if self.state.total_shares == 0 {
            0
        } else {
            let scaled = u128::from(self.state.total_yield_distributed) * u128::from(shares)
                / u128::from(self.state.total_shares);
            u64::try_from(scaled).unwrap_or(u64::MAX)
        };
        Some(UserSnapshot {
            shares,
            locked_shares: self.state.locked_shares(user, now),
            total_deposited: account.total_deposited,
            total_withdrawn: account.total_withdrawn,
            yield_contributed,
            first_activity_time: account.first_activity_time,
            last_activity_time: account.last_activity_time,
        })
    }

    /// Annualised yield in basis points, extrapolated from the yield
    /// accumulated since the last harvest. Zero when there is no principal
    /// or no elapsed time.
    pub fn yield_rate_bps(&self, bank: &Bank, now: u64) -> u64 {
        let principal = u128::from(self.state.total_principal);
        let elapsed = u128::from(now.saturating_sub(self.state.last_harvest_time));
        if principal == 0 || elapsed == 0 {
            return 0;
        }
        let accumulated = u128::from(self.calculate_accumulated_yield(bank));
        let rate = accumulated * u128::from(BPS_DENOMINATOR) * u128::from(SECONDS_PER_YEAR)
            / (principal * elapsed);
        u64::try_from(rate).unwrap_or(u64::MAX)
    }
}
