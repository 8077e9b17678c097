//! The yield router.
//!
//! Holds per-vault [`AllocationPolicy`] records and the set of vaults
//! authorized to route through it. Each [`YieldRouter::route_yield`] call
//! pulls the amount from the calling vault into the router's own account
//! and pays it out in one bank transaction. Rounding dust stays in the
//! router's account, is tracked per asset, and can be swept by the admin.

use std::collections::HashMap;

use serde::Serialize;

use grove_types::{
    AccessControl, Address, AssetId, Bank, EventLog, Payout, ProtocolEvent, ReentrancyGuard, Role,
};

use crate::policy::AllocationPolicy;
use crate::{Result, RouterError, YieldRouting};

/// What a single routing call paid out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteReceipt {
    /// Amount pulled from the caller.
    pub amount: u64,
    /// Non-zero payouts, in policy order.
    pub payouts: Vec<Payout>,
    /// Rounding remainder kept by the router.
    pub dust: u64,
    /// Whether the caller's policy was applied (vs. the default recipient).
    pub policy_applied: bool,
}

impl RouteReceipt {
    /// Sum of all payouts.
    pub fn total_paid(&self) -> u64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

#[derive(Clone, Debug, Default)]
struct RouterState {
    policies: HashMap<Address, AllocationPolicy>,
    total_routed: HashMap<AssetId, u128>,
    dust: HashMap<AssetId, u64>,
    /// Events of the call in flight. Empty between calls.
    staged_events: EventLog,
}

/// Policy-based fan-out of routed yield.
#[derive(Debug)]
pub struct YieldRouter {
    address: Address,
    access: AccessControl,
    guard: ReentrancyGuard,
    state: RouterState,
    events: EventLog,
}

impl YieldRouter {
    /// Create a router whose token account is `address`, administered by `admin`.
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            access: AccessControl::new(admin),
            guard: ReentrancyGuard::new(),
            state: RouterState::default(),
            events: EventLog::new(),
        }
    }

    /// The router's own token account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Grant `vault` the capability to call `route_yield`. Admin only.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Unauthorized`] unless `caller` is the administrator
    /// - [`RouterError::ZeroVault`] if `vault` is the null address
    pub fn authorize_vault(&mut self, caller: Address, vault: Address) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if vault.is_zero() {
            return Err(RouterError::ZeroVault);
        }
        self.access.grant(caller, Role::YieldRouting, vault)?;
        Ok(())
    }

    /// Revoke `vault`'s routing capability. Admin only.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Unauthorized`] unless `caller` is the administrator
    pub fn revoke_vault(&mut self, caller: Address, vault: Address) -> Result<bool> {
        Ok(self.access.revoke(caller, Role::YieldRouting, vault)?)
    }

    /// Whether `vault` may route through this router.
    pub fn is_authorized(&self, vault: Address) -> bool {
        self.access.has_role(Role::YieldRouting, vault)
    }

    /// Atomically replace `vault`'s policy and activate it. Admin only.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Unauthorized`] unless `caller` is the administrator
    /// - [`RouterError::ZeroVault`] if `vault` is the null address
    /// - any validation error from [`AllocationPolicy::new`]; the previous
    ///   policy is left untouched on failure
    pub fn set_allocation_policy(
        &mut self,
        caller: Address,
        vault: Address,
        weights: &[u16],
        recipients: &[Address],
    ) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if vault.is_zero() {
            return Err(RouterError::ZeroVault);
        }
        let policy = AllocationPolicy::new(weights, recipients)?;

        tracing::info!(
            %vault,
            recipients = recipients.len(),
            "allocation policy replaced"
        );

        self.events.emit(ProtocolEvent::PolicyUpdated {
            vault,
            recipients: recipients.to_vec(),
            weights_bps: weights.to_vec(),
        });
        self.state.policies.insert(vault, policy);
        Ok(())
    }

    /// Deactivate `vault`'s policy so routing falls back to the default
    /// recipient. Admin only. Returns whether an active policy existed.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Unauthorized`] unless `caller` is the administrator
    pub fn deactivate_policy(&mut self, caller: Address, vault: Address) -> Result<bool> {
        self.access.ensure_admin(caller)?;
        let Some(policy) = self.state.policies.get_mut(&vault).filter(|p| p.is_active()) else {
            return Ok(false);
        };
        policy.deactivate();
        tracing::info!(%vault, "allocation policy deactivated");
        self.events.emit(ProtocolEvent::PolicyDeactivated { vault });
        Ok(true)
    }

    /// The policy stored for `vault`, active or not.
    pub fn policy(&self, vault: Address) -> Option<&AllocationPolicy> {
        self.state.policies.get(&vault)
    }

    /// Lifetime amount routed in `asset` (dust included).
    pub fn total_routed(&self, asset: AssetId) -> u128 {
        self.state.total_routed.get(&asset).copied().unwrap_or(0)
    }

    /// Rounding dust currently held in `asset`.
    pub fn dust(&self, asset: AssetId) -> u64 {
        self.state.dust.get(&asset).copied().unwrap_or(0)
    }

    /// Fan `amount` of `asset` out from `caller` according to its policy.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Unauthorized`] if `caller` is not an authorized vault
    /// - [`RouterError::ZeroAmount`] if `amount` is zero
    /// - [`RouterError::ZeroRecipient`] if no policy applies and
    ///   `default_recipient` is the null address
    /// - [`RouterError::Bank`] if `caller` cannot cover `amount`
    pub fn route_yield(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        asset: AssetId,
        amount: u64,
        default_recipient: Address,
        metadata: &[u8],
    ) -> Result<RouteReceipt> {
        self.access.ensure_role(Role::YieldRouting, caller)?;
        if amount == 0 {
            return Err(RouterError::ZeroAmount);
        }
        let router = self.address;

        self.atomically(bank, |state, bank| {
            bank.transfer(asset, caller, router, amount)?;

            let (payouts, dust, policy_applied) =
                match state.policies.get(&caller).filter(|p| p.is_active()) {
                    Some(policy) => {
                        let (payouts, dust) = policy.split(amount)?;
                        (payouts, dust, true)
                    }
                    None => {
                        if default_recipient.is_zero() {
                            return Err(RouterError::ZeroRecipient { index: 0 });
                        }
                        let payout = Payout {
                            recipient: default_recipient,
                            amount,
                        };
                        (vec![payout], 0, false)
                    }
                };

            let payouts: Vec<Payout> = payouts.into_iter().filter(|p| p.amount > 0).collect();
            for payout in &payouts {
                bank.transfer(asset, router, payout.recipient, payout.amount)?;
                tracing::debug!(
                    recipient = %payout.recipient,
                    amount = payout.amount,
                    "routed share"
                );
            }

            let routed = state.total_routed.entry(asset).or_insert(0);
            *routed = routed
                .checked_add(u128::from(amount))
                .ok_or(RouterError::Overflow)?;
            if dust > 0 {
                let held = state.dust.entry(asset).or_insert(0);
                *held = held.checked_add(dust).ok_or(RouterError::Overflow)?;
            }

            tracing::info!(
                vault = %caller,
                %asset,
                amount,
                recipients = payouts.len(),
                dust,
                policy_applied,
                "yield routed"
            );

            state.staged_events.emit(ProtocolEvent::YieldRouted {
                vault: caller,
                asset,
                amount,
                payouts: payouts.clone(),
                dust,
                metadata: metadata.to_vec(),
            });

            Ok(RouteReceipt {
                amount,
                payouts,
                dust,
                policy_applied,
            })
        })
    }

    /// Transfer all accumulated dust in `asset` to `to`. Admin only.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Unauthorized`] unless `caller` is the administrator
    /// - [`RouterError::NoDust`] if no dust is held
    pub fn sweep_dust(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        asset: AssetId,
        to: Address,
    ) -> Result<u64> {
        self.access.ensure_admin(caller)?;
        let router = self.address;
        self.atomically(bank, |state, bank| {
            let amount = state.dust.remove(&asset).unwrap_or(0);
            if amount == 0 {
                return Err(RouterError::NoDust { asset });
            }
            bank.transfer(asset, router, to, amount)?;
            tracing::info!(%asset, %to, amount, "router dust swept");
            state.staged_events.emit(ProtocolEvent::DustSwept { asset, to, amount });
            Ok(amount)
        })
    }

    /// Events emitted so far.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Take all emitted events.
    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        self.events.drain()
    }

    /// Run `op` on a staged copy of the state inside a bank transaction and
    /// commit the copy only on success.
    fn atomically<T>(
        &mut self,
        bank: &mut Bank,
        op: impl FnOnce(&mut RouterState, &mut Bank) -> Result<T>,
    ) -> Result<T> {
        let _entered = self.guard.enter()?;
        let mut staged = self.state.clone();
        let output = bank.transaction(|bank| op(&mut staged, bank))?;
        self.events.append(&mut staged.staged_events);
        self.state = staged;
        Ok(output)
    }
}

impl YieldRouting for YieldRouter {
    fn route_yield(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        asset: AssetId,
        amount: u64,
        default_recipient: Address,
        metadata: &[u8],
    ) -> Result<RouteReceipt> {
        YieldRouter::route_yield(self, bank, caller, asset, amount, default_recipient, metadata)
    }
}
