//! Lending-market and reward-claim seams.
//!
//! The vault treats the lending market as an opaque [`YieldSource`]: it
//! supplies capital, withdraws it (possibly receiving less than requested),
//! and trusts [`YieldSource::balance_of`] as the ground truth for its total
//! assets. Reward claims go through a separate [`RewardsController`] and
//! are strictly best-effort.
//!
//! [`InMemoryLendingMarket`] implements the source on top of the shared
//! [`Bank`]: supplied assets move into a reserve account and the supplier is
//! credited a yield-bearing receipt token 1:1. Because all of its state is
//! bank balances, a rolled-back bank transaction rolls the market back too.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use grove_types::bps::apply_bps;
use grove_types::{Address, AssetId, Bank};

use crate::SourceError;

/// Reserve metadata reported by a yield source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveData {
    /// Token credited to suppliers.
    pub yield_bearing_token: AssetId,
    /// Account holding the supplied underlying.
    pub reserve: Address,
}

/// External yield generator.
pub trait YieldSource: Send {
    /// Move `amount` of `asset` from `from` into the market, crediting
    /// `on_behalf_of`.
    fn supply(
        &mut self,
        bank: &mut Bank,
        asset: AssetId,
        amount: u64,
        from: Address,
        on_behalf_of: Address,
    ) -> Result<(), SourceError>;

    /// Debit `amount` from `holder`'s position and pay the underlying to
    /// `to`. Returns the amount actually paid, which may be lower.
    fn withdraw(
        &mut self,
        bank: &mut Bank,
        asset: AssetId,
        amount: u64,
        holder: Address,
        to: Address,
    ) -> Result<u64, SourceError>;

    /// Current position of `holder`, principal plus accrued yield.
    fn balance_of(&self, bank: &Bank, holder: Address) -> u64;

    /// Reserve metadata for `asset`, if the source manages it.
    fn reserve_data(&self, asset: AssetId) -> Option<ReserveData>;
}

/// External incentive-reward claimer.
pub trait RewardsController: Send {
    /// Claim every pending reward for `assets` to `to`. Returns the amount claimed.
    fn claim_all_rewards(
        &mut self,
        bank: &mut Bank,
        assets: &[AssetId],
        to: Address,
    ) -> Result<u64, SourceError>;
}

/// A single-asset lending market backed by the bank.
///
/// Clones share the slippage setting, so a test or simulation can keep a
/// handle after boxing one into a vault.
#[derive(Clone, Debug)]
pub struct InMemoryLendingMarket {
    asset: AssetId,
    receipt_token: AssetId,
    reserve: Address,
    slippage_bps: Arc<AtomicU16>,
}

impl InMemoryLendingMarket {
    /// A market for `asset` issuing `receipt_token`, holding funds in `reserve`.
    pub fn new(asset: AssetId, receipt_token: AssetId, reserve: Address) -> Self {
        Self {
            asset,
            receipt_token,
            reserve,
            slippage_bps: Arc::new(AtomicU16::new(0)),
        }
    }

    /// Haircut applied to every withdrawal, in basis points.
    pub fn set_slippage_bps(&self, bps: u16) {
        tracing::debug!(bps, "lending market slippage changed");
        self.slippage_bps.store(bps, Ordering::Relaxed);
    }

    /// Current withdrawal haircut.
    pub fn slippage_bps(&self) -> u16 {
        self.slippage_bps.load(Ordering::Relaxed)
    }

    /// The yield-bearing receipt token.
    pub fn receipt_token(&self) -> AssetId {
        self.receipt_token
    }

    /// Simulate interest: grow `holder`'s position by `amount`, backed by
    /// newly minted underlying in the reserve.
    ///
    /// # Errors
    ///
    /// - [`SourceError::Bank`] on balance overflow
    pub fn accrue(&self, bank: &mut Bank, holder: Address, amount: u64) -> Result<(), SourceError> {
        bank.mint(self.asset, self.reserve, amount)?;
        bank.mint(self.receipt_token, holder, amount)?;
        tracing::trace!(%holder, amount, "lending market accrued interest");
        Ok(())
    }

    /// Simulate a loss: shrink `holder`'s position by `amount`.
    ///
    /// # Errors
    ///
    /// - [`SourceError::Bank`] if the position is smaller than `amount`
    pub fn realize_loss(
        &self,
        bank: &mut Bank,
        holder: Address,
        amount: u64,
    ) -> Result<(), SourceError> {
        bank.burn(self.receipt_token, holder, amount)?;
        tracing::trace!(%holder, amount, "lending market realized loss");
        Ok(())
    }

    fn ensure_asset(&self, asset: AssetId) -> Result<(), SourceError> {
        if asset == self.asset {
            Ok(())
        } else {
            Err(SourceError::UnsupportedAsset(asset))
        }
    }
}

impl YieldSource for InMemoryLendingMarket {
    fn supply(
        &mut self,
        bank: &mut Bank,
        asset: AssetId,
        amount: u64,
        from: Address,
        on_behalf_of: Address,
    ) -> Result<(), SourceError> {
        self.ensure_asset(asset)?;
        bank.transfer(asset, from, self.reserve, amount)?;
        bank.mint(self.receipt_token, on_behalf_of, amount)?;
        Ok(())
    }

    fn withdraw(
        &mut self,
        bank: &mut Bank,
        asset: AssetId,
        amount: u64,
        holder: Address,
        to: Address,
    ) -> Result<u64, SourceError> {
        self.ensure_asset(asset)?;
        let available = bank.balance_of(self.receipt_token, holder);
        if available < amount {
            return Err(SourceError::InsufficientPosition {
                holder,
                requested: amount,
                available,
            });
        }
        bank.burn(self.receipt_token, holder, amount)?;
        let haircut = apply_bps(amount, u32::from(self.slippage_bps())).unwrap_or(amount);
        let returned = amount.saturating_sub(haircut);
        bank.transfer(asset, self.reserve, to, returned)?;
        Ok(returned)
    }

    fn balance_of(&self, bank: &Bank, holder: Address) -> u64 {
        bank.balance_of(self.receipt_token, holder)
    }

    fn reserve_data(&self, asset: AssetId) -> Option<ReserveData> {
        (asset == self.asset).then_some(ReserveData {
            yield_bearing_token: self.receipt_token,
            reserve: self.reserve,
        })
    }
}

/// Reward controller that mints a fixed amount of a reward token per claim.
#[derive(Clone, Debug)]
pub struct FixedRewards {
    reward_token: AssetId,
    per_claim: u64,
}

impl FixedRewards {
    /// Mint `per_claim` of `reward_token` on every claim.
    pub fn new(reward_token: AssetId, per_claim: u64) -> Self {
        Self {
            reward_token,
            per_claim,
        }
    }
}

impl RewardsController for FixedRewards {
    fn claim_all_rewards(
        &mut self,
        bank: &mut Bank,
        assets: &[AssetId],
        to: Address,
    ) -> Result<u64, SourceError> {
        if assets.is_empty() || self.per_claim == 0 {
            return Ok(0);
        }
        bank.mint(self.reward_token, to, self.per_claim)?;
        Ok(self.per_claim)
    }
}
