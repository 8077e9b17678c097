//! The accounting vault.
//!
//! Shares are minted 1:1 with deposited principal and never drift in price.
//! Every state-mutating call runs on a staged copy of the vault's ledger
//! inside a [`Bank::transaction`]; the copy is committed only when the call
//! succeeds, so a failed withdrawal leaves neither burned shares nor a
//! reduced principal behind, and a failed distribution pays nobody.
//!
//! Yield sources are expected to keep their positions as bank balances (as
//! [`crate::InMemoryLendingMarket`] does) so that the same rollback covers
//! them.

use std::collections::HashMap;

use serde::Serialize;

use grove_router::YieldRouting;
use grove_types::bps::{apply_bps, min_after_slippage, mul_div};
use grove_types::{
    AccessControl, Address, AssetId, Bank, EventLog, Payout, ProtocolEvent, ReentrancyGuard, Role,
};

use crate::account::{LockedCommitment, UserAccount};
use crate::config::{BucketKind, DistributionBuckets, VaultConfig};
use crate::source::{RewardsController, YieldSource};
use crate::temporal::{amplify_by, TemporalAmplifier};
use crate::{Result, VaultError, MAX_HARVEST_COOLDOWN_SECS};

/// Metadata attached to public-goods routing calls.
pub const PUBLIC_GOODS_METADATA: &[u8] = b"grove/public-goods";

/// One bucket's share of a distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BucketPayout {
    /// Which bucket.
    pub kind: BucketKind,
    /// Bucket recipient (the default recipient when routed).
    pub recipient: Address,
    /// Amount sent.
    pub amount: u64,
}

/// What a distribution paid out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DistributionReceipt {
    /// Yield newly harvested in the same call (harvest-then-distribute only).
    pub harvested: u64,
    /// Amount the yield source actually returned.
    pub withdrawn: u64,
    /// Non-zero bucket payouts.
    pub payouts: Vec<BucketPayout>,
    /// Unallocated remainder supplied back to the yield source.
    pub retained: u64,
}

impl DistributionReceipt {
    /// Sum of bucket payouts.
    pub fn total_paid(&self) -> u64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// Amount paid to a given bucket.
    pub fn paid_to(&self, kind: BucketKind) -> u64 {
        self.payouts
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.amount)
            .sum()
    }
}

#[derive(Clone, Copy)]
struct Ctx {
    vault: Address,
    asset: AssetId,
}

pub(crate) struct VaultDeps {
    pub(crate) source: Box<dyn YieldSource>,
    rewards: Option<Box<dyn RewardsController>>,
    router: Option<Box<dyn YieldRouting>>,
}

#[derive(Clone, Debug)]
pub(crate) struct VaultState {
    pub(crate) config: VaultConfig,
    pub(crate) amplifier: TemporalAmplifier,
    pub(crate) total_principal: u64,
    pub(crate) total_shares: u64,
    pub(crate) shares: HashMap<Address, u64>,
    pub(crate) allowances: HashMap<(Address, Address), u64>,
    pub(crate) accounts: HashMap<Address, UserAccount>,
    pub(crate) commitments: Vec<LockedCommitment>,
    pub(crate) next_commitment_id: u64,
    pub(crate) pending_yield: u64,
    pub(crate) total_yield_distributed: u64,
    pub(crate) last_harvest_time: u64,
    pub(crate) paused: bool,
    pub(crate) emergency: bool,
    /// Events of the call in flight. Empty between calls.
    pub(crate) staged_events: EventLog,
}

impl VaultState {
    pub(crate) fn shares_of(&self, owner: Address) -> u64 {
        self.shares.get(&owner).copied().unwrap_or(0)
    }

    pub(crate) fn locked_shares(&self, owner: Address, now: u64) -> u64 {
        self.commitments
            .iter()
            .filter(|c| c.owner == owner && c.is_locked(now))
            .map(|c| c.shares)
            .sum()
    }

    pub(crate) fn unlocked_shares(&self, owner: Address, now: u64) -> u64 {
        self.shares_of(owner)
            .saturating_sub(self.locked_shares(owner, now))
    }

    pub(crate) fn deposit_headroom(&self) -> u64 {
        if self.paused || self.emergency {
            return 0;
        }
        let cap = self.config.deposit_cap.unwrap_or(u64::MAX);
        cap.saturating_sub(self.total_principal)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.paused {
            return Err(VaultError::Paused);
        }
        if self.emergency {
            return Err(VaultError::EmergencyMode);
        }
        Ok(())
    }

    fn credit_deposit(&mut self, receiver: Address, amount: u64, now: u64) -> Result<()> {
        self.total_principal = self
            .total_principal
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        self.total_shares = self
            .total_shares
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        let held = self.shares.entry(receiver).or_insert(0);
        *held = held.checked_add(amount).ok_or(VaultError::Overflow)?;
        self.accounts
            .entry(receiver)
            .or_insert_with(|| UserAccount::opened_at(now))
            .record_deposit(amount, now)
    }

    fn burn_shares(&mut self, owner: Address, amount: u64) -> Result<()> {
        let available = self.shares_of(owner);
        let remaining = available
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientShares {
                owner,
                requested: amount,
                available,
            })?;
        if remaining == 0 {
            self.shares.remove(&owner);
        } else {
            self.shares.insert(owner, remaining);
        }
        self.total_shares = self.total_shares.saturating_sub(amount);
        self.total_principal = self.total_principal.saturating_sub(amount);
        Ok(())
    }

    /// Shrink `owner`'s commitments by `remaining / held` after an exit that
    /// ignored locks. Commitments scaled to zero shares are dropped.
    fn scale_commitments(&mut self, owner: Address, held: u64, remaining: u64) -> Result<()> {
        for commitment in self.commitments.iter_mut().filter(|c| c.owner == owner) {
            commitment.shares =
                mul_div(commitment.shares, remaining, held).ok_or(VaultError::Overflow)?;
        }
        self.commitments.retain(|c| c.owner != owner || c.shares > 0);
        Ok(())
    }

    fn spend_allowance(&mut self, owner: Address, spender: Address, amount: u64) -> Result<()> {
        if owner == spender {
            return Ok(());
        }
        let allowance = self.allowances.get(&(owner, spender)).copied().unwrap_or(0);
        let remaining = allowance
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientAllowance {
                spender,
                requested: amount,
                allowance,
            })?;
        self.allowances.insert((owner, spender), remaining);
        Ok(())
    }
}

/// Capital/share ledger for one underlying asset.
pub struct AccountingVault {
    address: Address,
    asset: AssetId,
    access: AccessControl,
    guard: ReentrancyGuard,
    pub(crate) deps: VaultDeps,
    pub(crate) state: VaultState,
    events: EventLog,
}

impl AccountingVault {
    /// Create a vault whose token account is `address`, holding `asset`
    /// in `source`. `now` seeds the harvest clock.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CooldownTooLong`] or [`VaultError::InvalidConfig`] if
    ///   `config` fails validation
    /// - [`VaultError::InvalidReceiver`] if `address` is the null address
    pub fn new(
        address: Address,
        asset: AssetId,
        admin: Address,
        config: VaultConfig,
        source: Box<dyn YieldSource>,
        now: u64,
    ) -> Result<Self> {
        if address.is_zero() {
            return Err(VaultError::InvalidReceiver);
        }
        config.validate()?;
        let amplifier = TemporalAmplifier::new(config.temporal.clone())?;

        tracing::info!(vault = %address, %asset, %admin, "vault created");

        Ok(Self {
            address,
            asset,
            access: AccessControl::new(admin),
            guard: ReentrancyGuard::new(),
            deps: VaultDeps {
                source,
                rewards: None,
                router: None,
            },
            state: VaultState {
                config,
                amplifier,
                total_principal: 0,
                total_shares: 0,
                shares: HashMap::new(),
                allowances: HashMap::new(),
                accounts: HashMap::new(),
                commitments: Vec::new(),
                next_commitment_id: 0,
                pending_yield: 0,
                total_yield_distributed: 0,
                last_harvest_time: now,
                paused: false,
                emergency: false,
                staged_events: EventLog::new(),
            },
            events: EventLog::new(),
        })
    }

    /// Route the public-goods bucket through `router`.
    pub fn with_router(mut self, router: Box<dyn YieldRouting>) -> Self {
        self.deps.router = Some(router);
        self
    }

    /// Claim incentive rewards through `rewards` on every harvest.
    pub fn with_rewards(mut self, rewards: Box<dyn RewardsController>) -> Self {
        self.deps.rewards = Some(rewards);
        self
    }

    /// The vault's token account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The underlying asset.
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Current configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.state.config
    }

    // ------------------------------------------------------------------
    // Capital
    // ------------------------------------------------------------------

    /// Pull `amount` from `caller`, put it to work, and mint `amount`
    /// shares to `receiver`. Returns shares minted.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Paused`] / [`VaultError::EmergencyMode`]
    /// - [`VaultError::InvalidReceiver`] if `receiver` is the null address
    /// - [`VaultError::BelowMinimum`] if `amount < min_deposit`
    /// - [`VaultError::DepositCapExceeded`] if the cap would be exceeded
    /// - [`VaultError::Bank`] if `caller` cannot cover `amount`
    pub fn deposit(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        amount: u64,
        receiver: Address,
        now: u64,
    ) -> Result<u64> {
        self.atomically(bank, |ctx, state, deps, bank| {
            deposit_in(ctx, state, deps, bank, caller, amount, receiver, now)
        })
    }

    /// Mint exactly `shares` shares to `receiver`. With a fixed 1:1 ratio
    /// this is [`deposit`](Self::deposit) of the same amount.
    ///
    /// # Errors
    ///
    /// Same as [`deposit`](Self::deposit).
    pub fn mint(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        shares: u64,
        receiver: Address,
        now: u64,
    ) -> Result<u64> {
        self.deposit(bank, caller, shares, receiver, now)
    }

    /// Burn `amount` of `owner`'s shares and pay the underlying to
    /// `receiver`. Returns the amount the yield source returned.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Paused`]
    /// - [`VaultError::InvalidReceiver`] / [`VaultError::ZeroAmount`]
    /// - [`VaultError::InsufficientAllowance`] if `caller` is not `owner` and
    ///   lacks allowance
    /// - [`VaultError::InsufficientShares`] / [`VaultError::SharesLocked`]
    /// - [`VaultError::SlippageExceeded`] if the source returns less than
    ///   `amount * (1 - max_slippage)`; everything is rolled back
    pub fn withdraw(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        amount: u64,
        receiver: Address,
        owner: Address,
        now: u64,
    ) -> Result<u64> {
        self.atomically(bank, |ctx, state, deps, bank| {
            if state.paused {
                return Err(VaultError::Paused);
            }
            if receiver.is_zero() {
                return Err(VaultError::InvalidReceiver);
            }
            if amount == 0 {
                return Err(VaultError::ZeroAmount);
            }
            state.spend_allowance(owner, caller, amount)?;

            let held = state.shares_of(owner);
            if amount > held {
                return Err(VaultError::InsufficientShares {
                    owner,
                    requested: amount,
                    available: held,
                });
            }
            let unlocked = state.unlocked_shares(owner, now);
            if amount > unlocked {
                return Err(VaultError::SharesLocked {
                    owner,
                    requested: amount,
                    unlocked,
                });
            }

            let max_slippage = state.config.max_slippage_bps;
            let returned = exit_position(
                ctx,
                state,
                deps,
                bank,
                owner,
                amount,
                receiver,
                Some(max_slippage),
                now,
            )?;

            tracing::info!(
                vault = %ctx.vault,
                %owner,
                %receiver,
                shares = amount,
                returned,
                "withdrawal"
            );
            state.staged_events.emit(ProtocolEvent::Withdrawn {
                vault: ctx.vault,
                caller,
                owner,
                receiver,
                shares: amount,
                returned,
            });
            Ok(returned)
        })
    }

    /// Burn exactly `shares` shares. Identical to
    /// [`withdraw`](Self::withdraw) at the fixed 1:1 ratio.
    ///
    /// # Errors
    ///
    /// Same as [`withdraw`](Self::withdraw).
    pub fn redeem(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        shares: u64,
        receiver: Address,
        owner: Address,
        now: u64,
    ) -> Result<u64> {
        self.withdraw(bank, caller, shares, receiver, owner, now)
    }

    /// Exit `shares` of the caller's position while in emergency mode.
    ///
    /// Works while paused, ignores commitment locks, and accepts whatever
    /// the yield source returns. The caller's commitments shrink in
    /// proportion to the shares exited; a full exit drops them.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotEmergencyMode`] outside emergency mode
    /// - [`VaultError::InvalidReceiver`] / [`VaultError::ZeroAmount`]
    /// - [`VaultError::InsufficientShares`]
    pub fn emergency_withdraw(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        shares: u64,
        receiver: Address,
        now: u64,
    ) -> Result<u64> {
        self.atomically(bank, |ctx, state, deps, bank| {
            if !state.emergency {
                return Err(VaultError::NotEmergencyMode);
            }
            if receiver.is_zero() {
                return Err(VaultError::InvalidReceiver);
            }
            if shares == 0 {
                return Err(VaultError::ZeroAmount);
            }
            let held = state.shares_of(caller);
            let returned =
                exit_position(ctx, state, deps, bank, caller, shares, receiver, None, now)?;
            state.scale_commitments(caller, held, held.saturating_sub(shares))?;

            tracing::warn!(
                vault = %ctx.vault,
                owner = %caller,
                shares,
                returned,
                "emergency withdrawal"
            );
            state.staged_events.emit(ProtocolEvent::EmergencyWithdrawn {
                vault: ctx.vault,
                owner: caller,
                receiver,
                shares,
                returned,
            });
            Ok(returned)
        })
    }

    /// Let `spender` withdraw up to `shares` of `caller`'s shares.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidReceiver`] if `spender` is the null address
    pub fn approve(&mut self, caller: Address, spender: Address, shares: u64) -> Result<()> {
        if spender.is_zero() {
            return Err(VaultError::InvalidReceiver);
        }
        self.state.allowances.insert((caller, spender), shares);
        Ok(())
    }

    /// Remaining delegated allowance.
    pub fn allowance(&self, owner: Address, spender: Address) -> u64 {
        self.state
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Locked commitments
    // ------------------------------------------------------------------

    /// Deposit `amount` for `receiver` and lock the minted shares for
    /// `lock_secs`, recording the amplifier tier the period qualifies for.
    ///
    /// # Errors
    ///
    /// - [`VaultError::LocksUnsupported`] if no tiers are configured
    /// - [`VaultError::NoTemporalTier`] if `lock_secs` reaches no tier
    /// - any error from [`deposit`](Self::deposit)
    pub fn commit(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        amount: u64,
        receiver: Address,
        lock_secs: u64,
        now: u64,
    ) -> Result<LockedCommitment> {
        self.atomically(bank, |ctx, state, deps, bank| {
            if !state.amplifier.is_enabled() {
                return Err(VaultError::LocksUnsupported);
            }
            let tier = *state
                .amplifier
                .lookup(lock_secs)
                .ok_or(VaultError::NoTemporalTier { lock_secs })?;

            let shares = deposit_in(ctx, state, deps, bank, caller, amount, receiver, now)?;

            let unlock_at = now.checked_add(lock_secs).ok_or(VaultError::Overflow)?;
            let claim_until = unlock_at
                .checked_add(tier.unlock_window_secs)
                .ok_or(VaultError::Overflow)?;
            let id = state.next_commitment_id;
            state.next_commitment_id = id.checked_add(1).ok_or(VaultError::Overflow)?;
            let commitment = LockedCommitment {
                id,
                owner: receiver,
                shares,
                committed_at: now,
                unlock_at,
                claim_until,
                multiplier_bps: tier.multiplier_bps,
            };
            state.commitments.push(commitment);

            tracing::info!(
                vault = %ctx.vault,
                owner = %receiver,
                shares,
                multiplier_bps = tier.multiplier_bps,
                unlock_at,
                "commitment locked"
            );
            state.staged_events.emit(ProtocolEvent::Committed {
                vault: ctx.vault,
                owner: receiver,
                commitment_id: commitment.id,
                shares,
                multiplier_bps: tier.multiplier_bps,
                unlock_at,
            });
            Ok(commitment)
        })
    }

    /// A recorded commitment.
    pub fn commitment(&self, id: u64) -> Option<&LockedCommitment> {
        self.state.commitments.iter().find(|c| c.id == id)
    }

    /// Amplify `base` by commitment `id`'s multiplier. Only valid inside the
    /// commitment's unlock window.
    ///
    /// # Errors
    ///
    /// - [`VaultError::UnknownCommitment`]
    /// - [`VaultError::CommitmentNotClaimable`] outside the window
    pub fn amplified_payout(&self, id: u64, base: u64, now: u64) -> Result<u64> {
        let commitment = self
            .commitment(id)
            .ok_or(VaultError::UnknownCommitment(id))?;
        if !commitment.is_claimable(now) {
            return Err(VaultError::CommitmentNotClaimable {
                id,
                unlock_at: commitment.unlock_at,
                claim_until: commitment.claim_until,
                now,
            });
        }
        amplify_by(base, commitment.multiplier_bps)
    }

    // ------------------------------------------------------------------
    // Yield
    // ------------------------------------------------------------------

    /// `max(0, source balance - total principal)`.
    pub fn calculate_accumulated_yield(&self, bank: &Bank) -> u64 {
        self.deps
            .source
            .balance_of(bank, self.address)
            .saturating_sub(self.state.total_principal)
    }

    /// Move newly accrued yield into `pending_yield`. Returns the amount
    /// harvested.
    ///
    /// Keepers may harvest at any time; anyone else only once the cooldown
    /// has elapsed since the last harvest. Incentive rewards are claimed
    /// best-effort afterwards; a failed claim is logged and ignored.
    ///
    /// # Errors
    ///
    /// - [`VaultError::HarvestCooldown`] for an early non-keeper call
    /// - [`VaultError::NoYieldAvailable`] if nothing new has accrued; no
    ///   state changes
    pub fn harvest_yield(&mut self, bank: &mut Bank, caller: Address, now: u64) -> Result<u64> {
        let is_keeper = self.access.has_role(Role::Keeper, caller);
        self.atomically(bank, |ctx, state, deps, bank| {
            harvest_in(ctx, state, deps, bank, is_keeper, now)
        })
    }

    /// Withdraw `pending_yield` from the source and pay the distribution
    /// buckets.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoPendingYield`] if nothing is pending
    /// - [`VaultError::NoActivePolicy`] if every bucket share is zero
    /// - [`VaultError::SlippageExceeded`] if the source under-delivers
    /// - [`VaultError::Router`] if routing the public-goods share fails;
    ///   nothing is paid to any bucket
    pub fn distribute_yield(&mut self, bank: &mut Bank, now: u64) -> Result<DistributionReceipt> {
        self.atomically(bank, |ctx, state, deps, bank| {
            distribute_in(ctx, state, deps, bank, now)
        })
    }

    /// Harvest, then distribute, atomically.
    ///
    /// Returns `Ok(None)` when there is neither new nor pending yield: the
    /// cooperative no-op case.
    ///
    /// # Errors
    ///
    /// Any error from [`harvest_yield`](Self::harvest_yield) other than
    /// [`VaultError::NoYieldAvailable`], or from
    /// [`distribute_yield`](Self::distribute_yield).
    pub fn harvest_and_route_yield(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        now: u64,
    ) -> Result<Option<DistributionReceipt>> {
        let is_keeper = self.access.has_role(Role::Keeper, caller);
        self.atomically(bank, |ctx, state, deps, bank| {
            let harvested = match harvest_in(ctx, state, deps, bank, is_keeper, now) {
                Ok(amount) => amount,
                Err(VaultError::NoYieldAvailable) if state.pending_yield > 0 => 0,
                Err(VaultError::NoYieldAvailable) => {
                    tracing::debug!(vault = %ctx.vault, "nothing to harvest");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            let mut receipt = distribute_in(ctx, state, deps, bank, now)?;
            receipt.harvested = harvested;
            Ok(Some(receipt))
        })
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Grant `keeper` the right to harvest regardless of cooldown.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    pub fn set_keeper(&mut self, caller: Address, keeper: Address) -> Result<()> {
        Ok(self.access.grant(caller, Role::Keeper, keeper)?)
    }

    /// Revoke a keeper.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    pub fn revoke_keeper(&mut self, caller: Address, keeper: Address) -> Result<bool> {
        Ok(self.access.revoke(caller, Role::Keeper, keeper)?)
    }

    /// Whether `who` may harvest regardless of cooldown.
    pub fn is_keeper(&self, who: Address) -> bool {
        self.access.has_role(Role::Keeper, who)
    }

    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    /// - [`VaultError::CooldownTooLong`] above one day
    pub fn set_harvest_cooldown(&mut self, caller: Address, secs: u64) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if secs > MAX_HARVEST_COOLDOWN_SECS {
            return Err(VaultError::CooldownTooLong {
                requested: secs,
                max: MAX_HARVEST_COOLDOWN_SECS,
            });
        }
        self.state.config.harvest_cooldown_secs = secs;
        tracing::info!(vault = %self.address, secs, "harvest cooldown updated");
        Ok(())
    }

    /// Replace the distribution table.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    /// - [`VaultError::InvalidConfig`] if the table fails validation
    pub fn set_distribution_buckets(
        &mut self,
        caller: Address,
        buckets: DistributionBuckets,
    ) -> Result<()> {
        self.access.ensure_admin(caller)?;
        buckets.validate()?;
        self.state.config.buckets = buckets;
        tracing::info!(
            vault = %self.address,
            total_bps = buckets.total_bps(),
            "distribution buckets updated"
        );
        Ok(())
    }

    /// Set or clear the principal cap.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    pub fn set_deposit_cap(&mut self, caller: Address, cap: Option<u64>) -> Result<()> {
        self.access.ensure_admin(caller)?;
        self.state.config.deposit_cap = cap;
        Ok(())
    }

    /// Block deposits, mints and withdrawals.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    pub fn pause(&mut self, caller: Address) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if !self.state.paused {
            self.state.paused = true;
            tracing::warn!(vault = %self.address, "vault paused");
            self.events.emit(ProtocolEvent::Paused { vault: self.address });
        }
        Ok(())
    }

    /// Lift a pause.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    pub fn unpause(&mut self, caller: Address) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if self.state.paused {
            self.state.paused = false;
            tracing::info!(vault = %self.address, "vault unpaused");
            self.events.emit(ProtocolEvent::Unpaused { vault: self.address });
        }
        Ok(())
    }

    /// Enter emergency mode: no new capital, emergency exits unlocked.
    /// There is no way back.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the administrator
    pub fn activate_emergency_mode(&mut self, caller: Address) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if !self.state.emergency {
            self.state.emergency = true;
            tracing::warn!(vault = %self.address, "emergency mode activated");
            self.events.emit(ProtocolEvent::EmergencyActivated { vault: self.address });
        }
        Ok(())
    }

    /// Events emitted so far.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Take all emitted events.
    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        self.events.drain()
    }

    fn atomically<T>(
        &mut self,
        bank: &mut Bank,
        op: impl FnOnce(Ctx, &mut VaultState, &mut VaultDeps, &mut Bank) -> Result<T>,
    ) -> Result<T> {
        let _entered = self.guard.enter()?;
        let ctx = Ctx {
            vault: self.address,
            asset: self.asset,
        };
        let mut staged = self.state.clone();
        let deps = &mut self.deps;
        let output = bank.transaction(|bank| op(ctx, &mut staged, deps, bank))?;
        self.events.append(&mut staged.staged_events);
        self.state = staged;
        Ok(output)
    }
}

#[allow(clippy::too_many_arguments)]
fn deposit_in(
    ctx: Ctx,
    state: &mut VaultState,
    deps: &mut VaultDeps,
    bank: &mut Bank,
    caller: Address,
    amount: u64,
    receiver: Address,
    now: u64,
) -> Result<u64> {
    state.ensure_accepting()?;
    if receiver.is_zero() {
        return Err(VaultError::InvalidReceiver);
    }
    if amount < state.config.min_deposit {
        return Err(VaultError::BelowMinimum {
            amount,
            minimum: state.config.min_deposit,
        });
    }
    if amount == 0 {
        return Err(VaultError::ZeroAmount);
    }
    let available = state.deposit_headroom();
    if amount > available {
        return Err(VaultError::DepositCapExceeded {
            requested: amount,
            available,
        });
    }

    bank.transfer(ctx.asset, caller, ctx.vault, amount)?;
    deps.source
        .supply(bank, ctx.asset, amount, ctx.vault, ctx.vault)?;
    state.credit_deposit(receiver, amount, now)?;

    tracing::info!(vault = %ctx.vault, %caller, %receiver, amount, "deposit");
    state.staged_events.emit(ProtocolEvent::Deposited {
        vault: ctx.vault,
        caller,
        receiver,
        assets: amount,
        shares: amount,
    });
    Ok(amount)
}

/// Burn `shares` of `owner`, pull the same amount out of the source and pay
/// `receiver` whatever came back.
#[allow(clippy::too_many_arguments)]
fn exit_position(
    ctx: Ctx,
    state: &mut VaultState,
    deps: &mut VaultDeps,
    bank: &mut Bank,
    owner: Address,
    shares: u64,
    receiver: Address,
    max_slippage_bps: Option<u16>,
    now: u64,
) -> Result<u64> {
    state.burn_shares(owner, shares)?;
    let returned = deps
        .source
        .withdraw(bank, ctx.asset, shares, ctx.vault, ctx.vault)?;
    if let Some(max_slippage_bps) = max_slippage_bps {
        ensure_within_slippage(shares, returned, max_slippage_bps)?;
    }
    bank.transfer(ctx.asset, ctx.vault, receiver, returned)?;
    state
        .accounts
        .entry(owner)
        .or_insert_with(|| UserAccount::opened_at(now))
        .record_withdrawal(shares, now)?;
    Ok(returned)
}

fn ensure_within_slippage(requested: u64, returned: u64, max_slippage_bps: u16) -> Result<()> {
    let minimum =
        min_after_slippage(requested, u32::from(max_slippage_bps)).ok_or(VaultError::Overflow)?;
    if returned < minimum {
        tracing::warn!(requested, returned, minimum, "yield source slippage exceeded");
        return Err(VaultError::SlippageExceeded {
            requested,
            returned,
            minimum,
        });
    }
    Ok(())
}

fn harvest_in(
    ctx: Ctx,
    state: &mut VaultState,
    deps: &mut VaultDeps,
    bank: &mut Bank,
    is_keeper: bool,
    now: u64,
) -> Result<u64> {
    if !is_keeper {
        let ready_at = state
            .last_harvest_time
            .saturating_add(state.config.harvest_cooldown_secs);
        if now < ready_at {
            return Err(VaultError::HarvestCooldown { ready_at, now });
        }
    }

    // Yield already pending belongs to an earlier harvest.
    let harvestable = deps
        .source
        .balance_of(bank, ctx.vault)
        .saturating_sub(state.total_principal)
        .saturating_sub(state.pending_yield);
    if harvestable == 0 {
        return Err(VaultError::NoYieldAvailable);
    }

    state.pending_yield = state
        .pending_yield
        .checked_add(harvestable)
        .ok_or(VaultError::Overflow)?;
    state.last_harvest_time = now;

    if let Some(rewards) = deps.rewards.as_mut() {
        let treasury = state.config.buckets.treasury.recipient;
        let to = if treasury.is_zero() { ctx.vault } else { treasury };
        let assets = [ctx.asset];
        match bank.transaction(|bank| rewards.claim_all_rewards(bank, &assets, to)) {
            Ok(claimed) => {
                tracing::debug!(vault = %ctx.vault, claimed, %to, "incentive rewards claimed")
            }
            Err(e) => {
                tracing::warn!(vault = %ctx.vault, error = %e, "reward claim failed, continuing")
            }
        }
    }

    tracing::info!(
        vault = %ctx.vault,
        harvested = harvestable,
        pending = state.pending_yield,
        "yield harvested"
    );
    state.staged_events.emit(ProtocolEvent::YieldHarvested {
        vault: ctx.vault,
        amount: harvestable,
        pending: state.pending_yield,
        timestamp: now,
    });
    Ok(harvestable)
}

fn distribute_in(
    ctx: Ctx,
    state: &mut VaultState,
    deps: &mut VaultDeps,
    bank: &mut Bank,
    now: u64,
) -> Result<DistributionReceipt> {
    if state.pending_yield == 0 {
        return Err(VaultError::NoPendingYield);
    }
    let buckets = state.config.buckets;
    if !buckets.is_active() {
        return Err(VaultError::NoActivePolicy);
    }

    // Never withdraw more than the source holds above principal.
    let available = deps
        .source
        .balance_of(bank, ctx.vault)
        .saturating_sub(state.total_principal);
    let amount = state.pending_yield.min(available);
    if amount == 0 {
        return Err(VaultError::NoYieldAvailable);
    }

    let withdrawn = deps
        .source
        .withdraw(bank, ctx.asset, amount, ctx.vault, ctx.vault)?;
    ensure_within_slippage(amount, withdrawn, state.config.max_slippage_bps)?;

    let mut payouts = Vec::new();
    let mut paid: u64 = 0;
    for (kind, bucket) in buckets.iter() {
        let share = apply_bps(withdrawn, u32::from(bucket.share_bps)).ok_or(VaultError::Overflow)?;
        if share == 0 {
            continue;
        }
        match (kind, deps.router.as_mut()) {
            (BucketKind::PublicGoods, Some(router)) => {
                router.route_yield(
                    bank,
                    ctx.vault,
                    ctx.asset,
                    share,
                    bucket.recipient,
                    PUBLIC_GOODS_METADATA,
                )?;
            }
            _ => bank.transfer(ctx.asset, ctx.vault, bucket.recipient, share)?,
        }
        tracing::debug!(
            vault = %ctx.vault,
            ?kind,
            recipient = %bucket.recipient,
            share,
            "bucket paid"
        );
        paid = paid.checked_add(share).ok_or(VaultError::Overflow)?;
        payouts.push(BucketPayout {
            kind,
            recipient: bucket.recipient,
            amount: share,
        });
    }

    let retained = withdrawn.checked_sub(paid).ok_or(VaultError::Overflow)?;
    if retained > 0 {
        deps.source
            .supply(bank, ctx.asset, retained, ctx.vault, ctx.vault)?;
    }

    state.pending_yield = 0;
    state.total_yield_distributed = state
        .total_yield_distributed
        .checked_add(paid)
        .ok_or(VaultError::Overflow)?;

    tracing::info!(
        vault = %ctx.vault,
        withdrawn,
        paid,
        retained,
        timestamp = now,
        "yield distributed"
    );
    state.staged_events.emit(ProtocolEvent::YieldDistributed {
        vault: ctx.vault,
        withdrawn,
        payouts: payouts
            .iter()
            .map(|p| Payout {
                recipient: p.recipient,
                amount: p.amount,
            })
            .collect(),
        retained,
    });

    Ok(DistributionReceipt {
        harvested: 0,
        withdrawn,
        payouts,
        retained,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use grove_router::{RouteReceipt, RouterError, YieldRouter};

    use super::*;
    use crate::config::Bucket;
    use crate::source::{FixedRewards, InMemoryLendingMarket};
    use crate::temporal::TemporalTier;
    use crate::SourceError;

    const ASSET: Address = Address::new([0xA0; 20]);
    const RECEIPT: Address = Address::new([0xA1; 20]);
    const RESERVE: Address = Address::new([0xA2; 20]);
    const VAULT: Address = Address::new([0x10; 20]);
    const ADMIN: Address = Address::new([0x01; 20]);
    const USER: Address = Address::new([0x02; 20]);
    const OTHER: Address = Address::new([0x03; 20]);
    const KEEPER: Address = Address::new([0x04; 20]);
    const PUBLIC_GOODS: Address = Address::new([0x50; 20]);
    const TREASURY: Address = Address::new([0x51; 20]);

    fn buckets(public_goods_bps: u16, treasury_bps: u16) -> DistributionBuckets {
        DistributionBuckets {
            public_goods: Bucket {
                recipient: PUBLIC_GOODS,
                share_bps: public_goods_bps,
            },
            treasury: Bucket {
                recipient: TREASURY,
                share_bps: treasury_bps,
            },
            ..DistributionBuckets::default()
        }
    }

    fn setup(config: VaultConfig) -> (AccountingVault, InMemoryLendingMarket, Bank) {
        let market = InMemoryLendingMarket::new(ASSET, RECEIPT, RESERVE);
        let vault = AccountingVault::new(VAULT, ASSET, ADMIN, config, Box::new(market.clone()), 0)
            .expect("valid vault");
        let mut bank = Bank::new();
        bank.mint(ASSET, USER, 1_000_000).expect("mint");
        bank.mint(ASSET, OTHER, 1_000_000).expect("mint");
        (vault, market, bank)
    }

    fn funded(config: VaultConfig, deposit: u64) -> (AccountingVault, InMemoryLendingMarket, Bank) {
        let (mut vault, market, mut bank) = setup(config);
        vault
            .deposit(&mut bank, USER, deposit, USER, 0)
            .expect("deposit");
        (vault, market, bank)
    }

    #[test]
    fn test_deposit_mints_shares_one_to_one() {
        let (mut vault, _market, mut bank) = setup(VaultConfig::default());
        let shares = vault
            .deposit(&mut bank, USER, 10_000, USER, 5)
            .expect("deposit");

        assert_eq!(shares, 10_000);
        assert_eq!(vault.total_principal(), 10_000);
        assert_eq!(vault.shares_of(USER), 10_000);
        assert_eq!(vault.total_assets(&bank), 10_000);
        assert_eq!(bank.balance_of(ASSET, USER), 990_000);
        assert_eq!(bank.balance_of(ASSET, RESERVE), 10_000);
        assert!(matches!(
            vault.events().last(),
            Some(ProtocolEvent::Deposited { shares: 10_000, .. })
        ));
    }

    #[test]
    fn test_deposit_validation() {
        let config = VaultConfig {
            min_deposit: 100,
            deposit_cap: Some(1_000),
            ..VaultConfig::default()
        };
        let (mut vault, _market, mut bank) = setup(config);

        let err = vault
            .deposit(&mut bank, USER, 99, USER, 0)
            .expect_err("below minimum");
        assert!(matches!(err, VaultError::BelowMinimum { amount: 99, minimum: 100 }));

        let err = vault
            .deposit(&mut bank, USER, 500, Address::ZERO, 0)
            .expect_err("null receiver");
        assert_eq!(err, VaultError::InvalidReceiver);

        vault.deposit(&mut bank, USER, 800, USER, 0).expect("deposit");
        let err = vault
            .deposit(&mut bank, USER, 300, USER, 0)
            .expect_err("over cap");
        assert_eq!(
            err,
            VaultError::DepositCapExceeded {
                requested: 300,
                available: 200
            }
        );
        assert_eq!(vault.max_deposit(USER), 200);
    }

    #[test]
    fn test_deposit_without_funds_rolls_back() {
        let (mut vault, _market, mut bank) = setup(VaultConfig::default());
        let broke = Address::from_low_u64(99);
        let err = vault
            .deposit(&mut bank, broke, 10, broke, 0)
            .expect_err("no funds");
        assert!(matches!(err, VaultError::Bank(_)));
        assert_eq!(vault.total_principal(), 0);
        assert!(vault.events().is_empty());
    }

    #[test]
    fn test_withdraw_returns_principal() {
        let (mut vault, _market, mut bank) = funded(VaultConfig::default(), 10_000);
        let returned = vault
            .withdraw(&mut bank, USER, 4_000, OTHER, USER, 10)
            .expect("withdraw");

        assert_eq!(returned, 4_000);
        assert_eq!(vault.shares_of(USER), 6_000);
        assert_eq!(vault.total_principal(), 6_000);
        assert_eq!(bank.balance_of(ASSET, OTHER), 1_004_000);
        let snapshot = vault.user_snapshot(USER, 10).expect("known user");
        assert_eq!(snapshot.total_withdrawn, 4_000);
    }

    #[test]
    fn test_withdraw_slippage_rolls_back() {
        let (mut vault, market, mut bank) = funded(VaultConfig::default(), 10_000);
        market.set_slippage_bps(300);

        let err = vault
            .withdraw(&mut bank, USER, 10_000, USER, USER, 1)
            .expect_err("slippage");
        assert_eq!(
            err,
            VaultError::SlippageExceeded {
                requested: 10_000,
                returned: 9_700,
                minimum: 9_800
            }
        );
        assert_eq!(vault.shares_of(USER), 10_000);
        assert_eq!(vault.total_principal(), 10_000);
        assert_eq!(vault.total_assets(&bank), 10_000);
        assert_eq!(bank.balance_of(ASSET, USER), 990_000);

        market.set_slippage_bps(150);
        let returned = vault
            .withdraw(&mut bank, USER, 10_000, USER, USER, 1)
            .expect("within tolerance");
        assert_eq!(returned, 9_850);
    }

    #[test]
    fn test_delegated_withdraw_needs_allowance() {
        let (mut vault, _market, mut bank) = funded(VaultConfig::default(), 1_000);
        let err = vault
            .withdraw(&mut bank, OTHER, 100, OTHER, USER, 0)
            .expect_err("no allowance");
        assert!(matches!(err, VaultError::InsufficientAllowance { allowance: 0, .. }));

        vault.approve(USER, OTHER, 150).expect("approve");
        vault
            .redeem(&mut bank, OTHER, 100, OTHER, USER, 0)
            .expect("delegated");
        assert_eq!(vault.allowance(USER, OTHER), 50);
        assert_eq!(vault.shares_of(USER), 900);
    }

    #[test]
    fn test_paused_blocks_capital_flows() {
        let (mut vault, _market, mut bank) = funded(VaultConfig::default(), 1_000);
        assert!(matches!(vault.pause(USER), Err(VaultError::Unauthorized(_))));
        vault.pause(ADMIN).expect("pause");

        assert_eq!(
            vault.deposit(&mut bank, USER, 10, USER, 0).expect_err("paused"),
            VaultError::Paused
        );
        assert_eq!(
            vault
                .withdraw(&mut bank, USER, 10, USER, USER, 0)
                .expect_err("paused"),
            VaultError::Paused
        );
        assert_eq!(vault.max_deposit(USER), 0);

        vault.unpause(ADMIN).expect("unpause");
        vault.deposit(&mut bank, USER, 10, USER, 0).expect("deposit");
    }

    #[test]
    fn test_emergency_withdraw() {
        let config = VaultConfig {
            temporal: vec![TemporalTier {
                min_lock_secs: 1_000,
                multiplier_bps: 12_000,
                unlock_window_secs: 100,
            }],
            ..VaultConfig::default()
        };
        let (mut vault, market, mut bank) = setup(config);
        vault
            .commit(&mut bank, USER, 1_000, USER, 1_000, 0)
            .expect("commit");

        assert_eq!(
            vault
                .emergency_withdraw(&mut bank, USER, 1_000, USER, 10)
                .expect_err("not in emergency"),
            VaultError::NotEmergencyMode
        );

        vault.activate_emergency_mode(ADMIN).expect("emergency");
        vault.pause(ADMIN).expect("pause");
        assert_eq!(
            vault.deposit(&mut bank, USER, 10, USER, 10).expect_err("closed"),
            VaultError::Paused
        );

        market.set_slippage_bps(1_000);
        let returned = vault
            .emergency_withdraw(&mut bank, USER, 1_000, USER, 10)
            .expect("emergency exit ignores locks and slippage");
        assert_eq!(returned, 900);
        assert_eq!(vault.shares_of(USER), 0);
        assert_eq!(vault.total_principal(), 0);
    }

    #[test]
    fn test_partial_emergency_exit_scales_commitments() {
        let config = VaultConfig {
            temporal: vec![TemporalTier {
                min_lock_secs: 1_000,
                multiplier_bps: 12_000,
                unlock_window_secs: 100,
            }],
            ..VaultConfig::default()
        };
        let (mut vault, _market, mut bank) = setup(config);
        vault
            .commit(&mut bank, USER, 1_000, USER, 1_000, 0)
            .expect("commit");
        vault
            .deposit(&mut bank, USER, 1_000, USER, 0)
            .expect("deposit");
        vault.activate_emergency_mode(ADMIN).expect("emergency");

        vault
            .emergency_withdraw(&mut bank, USER, 500, USER, 10)
            .expect("partial exit");
        let commitments: Vec<_> = vault.commitments_of(USER).collect();
        assert_eq!(commitments.len(), 1);
        assert_eq!(commitments[0].shares, 750);
        assert_eq!(vault.shares_of(USER), 1_500);

        vault
            .emergency_withdraw(&mut bank, USER, 1_500, USER, 10)
            .expect("full exit");
        assert_eq!(vault.commitments_of(USER).count(), 0);
    }

    #[test]
    fn test_locked_shares_cannot_be_withdrawn() {
        let config = VaultConfig {
            temporal: vec![
                TemporalTier {
                    min_lock_secs: 1_000,
                    multiplier_bps: 12_000,
                    unlock_window_secs: 500,
                },
                TemporalTier {
                    min_lock_secs: 10_000,
                    multiplier_bps: 20_000,
                    unlock_window_secs: 500,
                },
            ],
            ..VaultConfig::default()
        };
        let (mut vault, _market, mut bank) = setup(config);
        vault.deposit(&mut bank, USER, 500, USER, 0).expect("deposit");
        let commitment = vault
            .commit(&mut bank, USER, 1_000, USER, 20_000, 0)
            .expect("commit");
        assert_eq!(commitment.multiplier_bps, 20_000);
        assert_eq!(commitment.unlock_at, 20_000);
        assert_eq!(commitment.claim_until, 20_500);

        let err = vault
            .withdraw(&mut bank, USER, 600, USER, USER, 100)
            .expect_err("locked");
        assert_eq!(
            err,
            VaultError::SharesLocked {
                owner: USER,
                requested: 600,
                unlocked: 500
            }
        );
        vault
            .withdraw(&mut bank, USER, 500, USER, USER, 100)
            .expect("unlocked part");

        assert!(matches!(
            vault.amplified_payout(commitment.id, 100, 100),
            Err(VaultError::CommitmentNotClaimable { .. })
        ));
        assert_eq!(
            vault
                .amplified_payout(commitment.id, 100, 20_000)
                .expect("window open"),
            200
        );
        assert!(vault.amplified_payout(commitment.id, 100, 20_500).is_err());

        vault
            .withdraw(&mut bank, USER, 1_000, USER, USER, 20_000)
            .expect("lock expired");
    }

    #[test]
    fn test_commit_requires_tiers() {
        let (mut vault, _market, mut bank) = setup(VaultConfig::default());
        assert_eq!(
            vault
                .commit(&mut bank, USER, 100, USER, 1_000, 0)
                .expect_err("no tiers"),
            VaultError::LocksUnsupported
        );

        let config = VaultConfig {
            temporal: vec![TemporalTier {
                min_lock_secs: 1_000,
                multiplier_bps: 11_000,
                unlock_window_secs: 10,
            }],
            ..VaultConfig::default()
        };
        let (mut vault, _market, mut bank) = setup(config);
        assert_eq!(
            vault
                .commit(&mut bank, USER, 100, USER, 999, 0)
                .expect_err("too short"),
            VaultError::NoTemporalTier { lock_secs: 999 }
        );
        assert_eq!(vault.total_principal(), 0);
    }

    #[test]
    fn test_accumulated_yield_and_harvest() {
        let config = VaultConfig {
            buckets: buckets(1_500, 0),
            ..VaultConfig::default()
        };
        let (mut vault, market, mut bank) = funded(config, 10_000);
        market.accrue(&mut bank, VAULT, 1_500).expect("accrue");
        assert_eq!(vault.calculate_accumulated_yield(&bank), 1_500);

        let err = vault
            .harvest_yield(&mut bank, USER, 100)
            .expect_err("cooldown");
        assert_eq!(err, VaultError::HarvestCooldown { ready_at: 3_600, now: 100 });

        let harvested = vault
            .harvest_yield(&mut bank, USER, 3_600)
            .expect("cooldown elapsed");
        assert_eq!(harvested, 1_500);
        assert_eq!(vault.pending_yield(), 1_500);

        // Pending yield is not harvested twice.
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        assert_eq!(
            vault.harvest_yield(&mut bank, KEEPER, 3_601).expect_err("nothing new"),
            VaultError::NoYieldAvailable
        );
        market.accrue(&mut bank, VAULT, 10).expect("accrue");
        assert_eq!(vault.harvest_yield(&mut bank, KEEPER, 3_601).expect("keeper"), 10);
        assert_eq!(vault.pending_yield(), 1_510);
    }

    #[test]
    fn test_harvest_and_route_pays_buckets() {
        let config = VaultConfig {
            buckets: buckets(1_500, 500),
            ..VaultConfig::default()
        };
        let (mut vault, market, mut bank) = funded(config, 10_000);
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 1_500).expect("accrue");

        let receipt = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 50)
            .expect("route")
            .expect("yield was available");

        assert_eq!(receipt.harvested, 1_500);
        assert_eq!(receipt.withdrawn, 1_500);
        assert_eq!(receipt.paid_to(BucketKind::PublicGoods), 225);
        assert_eq!(receipt.paid_to(BucketKind::Treasury), 75);
        assert_eq!(receipt.retained, 1_200);
        assert_eq!(bank.balance_of(ASSET, PUBLIC_GOODS), 225);
        assert_eq!(bank.balance_of(ASSET, TREASURY), 75);

        assert_eq!(vault.pending_yield(), 0);
        assert_eq!(vault.total_principal(), 10_000);
        assert_eq!(vault.total_assets(&bank), 11_200);
        assert_eq!(vault.metrics(&bank).total_donated, 300);
        assert!(vault.is_healthy(&bank));

        // The retained remainder is harvested again next round.
        let receipt = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 60)
            .expect("route")
            .expect("retained yield");
        assert_eq!(receipt.harvested, 1_200);
        assert_eq!(receipt.paid_to(BucketKind::PublicGoods), 180);
        assert_eq!(vault.total_assets(&bank), 10_960);
    }

    #[test]
    fn test_harvest_and_route_noop_without_yield() {
        let config = VaultConfig {
            buckets: buckets(1_500, 0),
            ..VaultConfig::default()
        };
        let (mut vault, _market, mut bank) = funded(config, 10_000);
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        assert_eq!(
            vault
                .harvest_and_route_yield(&mut bank, KEEPER, 60)
                .expect("no-op"),
            None
        );
        assert_eq!(vault.events().len(), 1);
    }

    #[test]
    fn test_distribute_requires_pending_and_policy() {
        let (mut vault, market, mut bank) = funded(VaultConfig::default(), 1_000);
        assert_eq!(
            vault.distribute_yield(&mut bank, 0).expect_err("nothing pending"),
            VaultError::NoPendingYield
        );

        market.accrue(&mut bank, VAULT, 100).expect("accrue");
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        vault.harvest_yield(&mut bank, KEEPER, 0).expect("harvest");
        assert_eq!(
            vault.distribute_yield(&mut bank, 0).expect_err("no buckets"),
            VaultError::NoActivePolicy
        );
        assert_eq!(vault.pending_yield(), 100);

        vault
            .set_distribution_buckets(ADMIN, buckets(10_000, 0))
            .expect("buckets");
        let receipt = vault.distribute_yield(&mut bank, 0).expect("distribute");
        assert_eq!(receipt.total_paid(), 100);
        assert_eq!(receipt.retained, 0);
    }

    #[test]
    fn test_distribute_caps_at_available_yield() {
        let config = VaultConfig {
            buckets: buckets(10_000, 0),
            ..VaultConfig::default()
        };
        let (mut vault, market, mut bank) = funded(config, 1_000);
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 100).expect("accrue");
        vault.harvest_yield(&mut bank, KEEPER, 0).expect("harvest");
        market.realize_loss(&mut bank, VAULT, 40).expect("loss");

        let receipt = vault.distribute_yield(&mut bank, 0).expect("distribute");
        assert_eq!(receipt.withdrawn, 60);
        assert_eq!(vault.total_assets(&bank), 1_000);
        assert_eq!(vault.pending_yield(), 0);
    }

    #[test]
    fn test_distribution_slippage_rolls_back() {
        let config = VaultConfig {
            buckets: buckets(5_000, 0),
            ..VaultConfig::default()
        };
        let (mut vault, market, mut bank) = funded(config, 1_000);
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 1_000).expect("accrue");
        market.set_slippage_bps(500);

        let err = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 0)
            .expect_err("slippage");
        assert!(matches!(err, VaultError::SlippageExceeded { .. }));
        assert_eq!(vault.pending_yield(), 0);
        assert_eq!(vault.total_assets(&bank), 2_000);
        assert_eq!(bank.balance_of(ASSET, PUBLIC_GOODS), 0);
        assert!(vault.events().iter().all(|e| !matches!(e, ProtocolEvent::YieldHarvested { .. })));
    }

    #[test]
    fn test_public_goods_through_router() {
        let config = VaultConfig {
            buckets: buckets(2_000, 0),
            ..VaultConfig::default()
        };
        let (vault, market, mut bank) = funded(config, 10_000);
        let router_addr = Address::from_low_u64(0x700);
        let first = Address::from_low_u64(0x701);
        let second = Address::from_low_u64(0x702);

        let mut router = YieldRouter::new(router_addr, ADMIN);
        router.authorize_vault(ADMIN, VAULT).expect("authorize");
        router
            .set_allocation_policy(ADMIN, VAULT, &[7_000, 3_000], &[first, second])
            .expect("policy");
        let router = Arc::new(Mutex::new(router));
        let mut vault = vault.with_router(Box::new(Arc::clone(&router)));
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");

        market.accrue(&mut bank, VAULT, 1_000).expect("accrue");
        let receipt = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 0)
            .expect("route")
            .expect("yield");
        assert_eq!(receipt.paid_to(BucketKind::PublicGoods), 200);
        assert_eq!(bank.balance_of(ASSET, first), 140);
        assert_eq!(bank.balance_of(ASSET, second), 60);
        assert_eq!(bank.balance_of(ASSET, PUBLIC_GOODS), 0);
        let routed = router.lock().expect("router lock").total_routed(ASSET);
        assert_eq!(routed, 200);
    }

    #[test]
    fn test_router_failure_rolls_back_distribution() {
        let config = VaultConfig {
            buckets: buckets(2_000, 1_000),
            ..VaultConfig::default()
        };
        let (vault, market, mut bank) = funded(config, 10_000);
        // Router never authorized this vault.
        let router = YieldRouter::new(Address::from_low_u64(0x700), ADMIN);
        let mut vault = vault.with_router(Box::new(Arc::new(Mutex::new(router))));
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 1_000).expect("accrue");

        let err = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 0)
            .expect_err("unauthorized vault");
        assert!(matches!(err, VaultError::Router(_)));
        assert_eq!(bank.balance_of(ASSET, TREASURY), 0);
        assert_eq!(vault.total_assets(&bank), 11_000);
        assert_eq!(vault.pending_yield(), 0);
    }

    /// Routes by re-entering the shared router while holding it.
    struct ReenteringRouter {
        shared: Arc<Mutex<YieldRouter>>,
    }

    impl YieldRouting for ReenteringRouter {
        fn route_yield(
            &mut self,
            bank: &mut Bank,
            caller: Address,
            asset: AssetId,
            amount: u64,
            default_recipient: Address,
            metadata: &[u8],
        ) -> grove_router::Result<RouteReceipt> {
            let _held = self.shared.lock().map_err(|_| RouterError::Unavailable)?;
            let mut again = Arc::clone(&self.shared);
            YieldRouting::route_yield(
                &mut again,
                bank,
                caller,
                asset,
                amount,
                default_recipient,
                metadata,
            )
        }
    }

    #[test]
    fn test_reentrant_route_rolls_back_distribution() {
        let config = VaultConfig {
            buckets: buckets(2_000, 1_000),
            ..VaultConfig::default()
        };
        let (vault, market, mut bank) = funded(config, 10_000);
        let mut router = YieldRouter::new(Address::from_low_u64(0x700), ADMIN);
        router.authorize_vault(ADMIN, VAULT).expect("authorize");
        let shared = Arc::new(Mutex::new(router));
        let mut vault = vault.with_router(Box::new(ReenteringRouter {
            shared: Arc::clone(&shared),
        }));
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 1_000).expect("accrue");
        let events_before = vault.events().len();

        let err = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 0)
            .expect_err("router re-entered");
        assert!(matches!(err, VaultError::Router(RouterError::Reentrant(_))));
        assert_eq!(vault.shares_of(USER), 10_000);
        assert_eq!(vault.total_principal(), 10_000);
        assert_eq!(vault.pending_yield(), 0);
        assert_eq!(vault.total_assets(&bank), 11_000);
        assert_eq!(bank.balance_of(ASSET, PUBLIC_GOODS), 0);
        assert_eq!(bank.balance_of(ASSET, TREASURY), 0);
        assert_eq!(vault.events().len(), events_before);

        // Both the vault and the shared router were released.
        let mut vault = vault.with_router(Box::new(Arc::clone(&shared)));
        let receipt = vault
            .harvest_and_route_yield(&mut bank, KEEPER, 0)
            .expect("route")
            .expect("yield");
        assert_eq!(receipt.paid_to(BucketKind::PublicGoods), 200);
        assert_eq!(bank.balance_of(ASSET, PUBLIC_GOODS), 200);
    }

    #[test]
    fn test_event_history_stays_out_of_staged_state() {
        let (mut vault, _market, mut bank) = setup(VaultConfig::default());
        for now in 0..10_000u64 {
            vault
                .deposit(&mut bank, USER, 1, USER, now)
                .expect("deposit");
            assert!(vault.state.staged_events.is_empty());
        }
        assert_eq!(vault.events().len(), 10_000);
        assert_eq!(vault.drain_events().len(), 10_000);
    }

    struct FailingRewards;

    impl RewardsController for FailingRewards {
        fn claim_all_rewards(
            &mut self,
            bank: &mut Bank,
            _assets: &[AssetId],
            to: Address,
        ) -> std::result::Result<u64, SourceError> {
            bank.mint(ASSET, to, 1)?;
            Err(SourceError::RewardClaim("controller offline".into()))
        }
    }

    #[test]
    fn test_reward_claims_are_best_effort() {
        let reward_token = Address::from_low_u64(0x900);
        let config = VaultConfig {
            buckets: buckets(0, 1_000),
            ..VaultConfig::default()
        };
        let (vault, market, mut bank) = funded(config.clone(), 1_000);
        let mut vault = vault.with_rewards(Box::new(FixedRewards::new(reward_token, 7)));
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 10).expect("accrue");
        vault.harvest_yield(&mut bank, KEEPER, 0).expect("harvest");
        assert_eq!(bank.balance_of(reward_token, TREASURY), 7);

        let (vault, market, mut bank) = funded(config, 1_000);
        let mut vault = vault.with_rewards(Box::new(FailingRewards));
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        market.accrue(&mut bank, VAULT, 10).expect("accrue");
        assert_eq!(vault.harvest_yield(&mut bank, KEEPER, 0).expect("harvest"), 10);
        assert_eq!(bank.balance_of(ASSET, TREASURY), 0);
    }

    #[test]
    fn test_admin_settings() {
        let (mut vault, _market, _bank) = setup(VaultConfig::default());
        assert_eq!(
            vault.set_harvest_cooldown(ADMIN, 86_401).expect_err("too long"),
            VaultError::CooldownTooLong {
                requested: 86_401,
                max: 86_400
            }
        );
        vault.set_harvest_cooldown(ADMIN, 60).expect("cooldown");
        assert_eq!(vault.config().harvest_cooldown_secs, 60);

        assert!(matches!(
            vault.set_distribution_buckets(ADMIN, buckets(9_000, 2_000)),
            Err(VaultError::InvalidConfig(_))
        ));
        assert!(matches!(
            vault.set_keeper(USER, USER),
            Err(VaultError::Unauthorized(_))
        ));
        vault.set_keeper(ADMIN, KEEPER).expect("keeper");
        assert!(vault.is_keeper(KEEPER));
        assert!(vault.revoke_keeper(ADMIN, KEEPER).expect("revoke"));
        assert!(!vault.is_keeper(KEEPER));
    }
}
