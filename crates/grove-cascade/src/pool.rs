//! The cascade pool.
//!
//! The pool pays cascades out of its own token account. Amounts accumulated
//! as failed potential sit in the same account but are reserved: a cascade
//! may only spend the balance above the reserved total. Dependency shares
//! that are forfeited, and the rounding remainder of the even split, stay
//! in the pool and fund later cascades.

use std::collections::HashMap;

use serde::Serialize;

use grove_router::{RouteReceipt, YieldRouting};
use grove_types::{
    AccessControl, Address, AssetId, Bank, EventLog, Payout, ProjectId, ProtocolEvent,
    ReentrancyGuard, Role,
};

use crate::project::Project;
use crate::{CascadeError, Result};

/// Metadata attached to failed-potential routing calls.
pub const FAILED_POTENTIAL_METADATA: &[u8] = b"grove/failed-potential";

/// What a cascade paid out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CascadeReceipt {
    /// The triggered project.
    pub project: ProjectId,
    /// Primary payment to the project's funding address.
    pub primary: Payout,
    /// `primary * multiplier / 10000`.
    pub cascade_amount: u64,
    /// Payments to active dependencies.
    pub dependency_payouts: Vec<Payout>,
    /// Shares of inactive, unknown or unfunded dependencies.
    pub forfeited: u64,
    /// Remainder of the even split.
    pub dust: u64,
    /// Primary plus paid dependency shares.
    pub total_transferred: u64,
}

#[derive(Clone, Debug, Default)]
struct PoolState {
    projects: HashMap<ProjectId, Project>,
    failed_potential: HashMap<ProjectId, u64>,
    reserved: u64,
    total_cascaded: u128,
    /// Events of the call in flight. Empty between calls.
    staged_events: EventLog,
}

/// Project registry and cascade payer for one asset.
pub struct CascadePool {
    address: Address,
    asset: AssetId,
    access: AccessControl,
    guard: ReentrancyGuard,
    router: Box<dyn YieldRouting>,
    state: PoolState,
    events: EventLog,
}

impl CascadePool {
    /// Create a pool whose token account is `address`. The pool must be
    /// authorized on `router` before failed potential can be distributed.
    pub fn new(
        address: Address,
        asset: AssetId,
        admin: Address,
        router: Box<dyn YieldRouting>,
    ) -> Self {
        tracing::info!(pool = %address, %asset, %admin, "cascade pool created");
        Self {
            address,
            asset,
            access: AccessControl::new(admin),
            guard: ReentrancyGuard::new(),
            router,
            state: PoolState::default(),
            events: EventLog::new(),
        }
    }

    /// The pool's token account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The asset cascades pay out in.
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Allow `who` to trigger cascades.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` is the administrator
    pub fn grant_distributor(&mut self, caller: Address, who: Address) -> Result<()> {
        Ok(self.access.grant(caller, Role::Distributor, who)?)
    }

    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` is the administrator
    pub fn revoke_distributor(&mut self, caller: Address, who: Address) -> Result<bool> {
        Ok(self.access.revoke(caller, Role::Distributor, who)?)
    }

    /// Register or overwrite project `id`. Admin only.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` is the administrator
    /// - any validation error from [`Project::new`]
    pub fn register_project(
        &mut self,
        caller: Address,
        id: ProjectId,
        funding_address: Address,
        dependencies: &[ProjectId],
        cascade_multiplier_bps: u16,
    ) -> Result<()> {
        self.access.ensure_admin(caller)?;
        let project = Project::new(id, funding_address, dependencies, cascade_multiplier_bps)?;

        let replaced = self.state.projects.contains_key(&id);
        tracing::info!(
            project = id,
            %funding_address,
            dependencies = dependencies.len(),
            cascade_multiplier_bps,
            replaced,
            "project registered"
        );
        self.events.emit(ProtocolEvent::ProjectRegistered {
            project: id,
            funding_address,
            dependencies: project.dependencies.clone(),
            cascade_multiplier_bps,
        });
        self.state.projects.insert(id, project);
        Ok(())
    }

    /// Stop project `id` from triggering or receiving cascades. Admin only.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` is the administrator
    /// - [`CascadeError::UnknownProject`]
    pub fn deactivate_project(&mut self, caller: Address, id: ProjectId) -> Result<()> {
        self.access.ensure_admin(caller)?;
        let project = self
            .state
            .projects
            .get_mut(&id)
            .ok_or(CascadeError::UnknownProject(id))?;
        if project.active {
            project.active = false;
            tracing::info!(project = id, "project deactivated");
            self.events.emit(ProtocolEvent::ProjectDeactivated { project: id });
        }
        Ok(())
    }

    /// Project `id`, if registered.
    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.state.projects.get(&id)
    }

    /// Failed potential accumulated for `id`.
    pub fn failed_potential(&self, id: ProjectId) -> u64 {
        self.state.failed_potential.get(&id).copied().unwrap_or(0)
    }

    /// Pool balance not reserved for failed potential.
    pub fn available_balance(&self, bank: &Bank) -> u64 {
        bank.balance_of(self.asset, self.address)
            .saturating_sub(self.state.reserved)
    }

    /// Lifetime amount paid out by cascades.
    pub fn total_cascaded(&self) -> u128 {
        self.state.total_cascaded
    }

    /// Pull `amount` from `caller` into the pool.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::ZeroAmount`]
    /// - [`CascadeError::Bank`] if `caller` cannot cover `amount`
    pub fn fund(&mut self, bank: &mut Bank, caller: Address, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(CascadeError::ZeroAmount);
        }
        let (pool, asset) = (self.address, self.asset);
        self.atomically(bank, |_state, _router, bank| {
            bank.transfer(asset, caller, pool, amount)?;
            tracing::debug!(%pool, from = %caller, amount, "cascade pool funded");
            Ok(())
        })
    }

    /// Pay `primary_amount` to project `id` and spread the cascade share
    /// over its dependencies.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` holds `Distributor`
    /// - [`CascadeError::ZeroAmount`]
    /// - [`CascadeError::UnknownProject`] / [`CascadeError::ProjectInactive`]
    /// - [`CascadeError::InsufficientFunds`] if the unreserved balance is
    ///   below `primary_amount + cascade_amount`
    pub fn trigger_cascade(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        id: ProjectId,
        primary_amount: u64,
    ) -> Result<CascadeReceipt> {
        self.access.ensure_role(Role::Distributor, caller)?;
        if primary_amount == 0 {
            return Err(CascadeError::ZeroAmount);
        }
        let (pool, asset) = (self.address, self.asset);

        self.atomically(bank, |state, _router, bank| {
            let project = state
                .projects
                .get(&id)
                .ok_or(CascadeError::UnknownProject(id))?;
            if !project.active {
                return Err(CascadeError::ProjectInactive(id));
            }

            let cascade_amount = project.cascade_amount(primary_amount)?;
            let requested = primary_amount
                .checked_add(cascade_amount)
                .ok_or(CascadeError::Overflow)?;
            let available = bank.balance_of(asset, pool).saturating_sub(state.reserved);
            if requested > available {
                return Err(CascadeError::InsufficientFunds {
                    requested,
                    available,
                });
            }

            let primary = Payout {
                recipient: project.funding_address,
                amount: primary_amount,
            };
            bank.transfer(asset, pool, primary.recipient, primary.amount)?;

            let mut dependency_payouts = Vec::new();
            let mut forfeited: u64 = 0;
            let share = project.dependency_share(cascade_amount);
            if share > 0 {
                for dependency in &project.dependencies {
                    match state.projects.get(dependency).filter(|d| d.is_payable()) {
                        Some(dependency) => {
                            bank.transfer(asset, pool, dependency.funding_address, share)?;
                            tracing::debug!(
                                project = id,
                                dependency = dependency.id,
                                share,
                                "cascade share paid"
                            );
                            dependency_payouts.push(Payout {
                                recipient: dependency.funding_address,
                                amount: share,
                            });
                        }
                        None => {
                            tracing::debug!(
                                project = id,
                                dependency,
                                share,
                                "cascade share forfeited"
                            );
                            forfeited = forfeited.checked_add(share).ok_or(CascadeError::Overflow)?;
                        }
                    }
                }
            }

            let paid_to_dependencies: u64 = dependency_payouts.iter().map(|p| p.amount).sum();
            let dust = cascade_amount
                .saturating_sub(share.saturating_mul(project.dependencies.len() as u64));
            let total_transferred = primary_amount
                .checked_add(paid_to_dependencies)
                .ok_or(CascadeError::Overflow)?;
            state.total_cascaded = state
                .total_cascaded
                .checked_add(u128::from(total_transferred))
                .ok_or(CascadeError::Overflow)?;

            tracing::info!(
                project = id,
                primary = primary_amount,
                cascade_amount,
                dependencies_paid = dependency_payouts.len(),
                forfeited,
                total_transferred,
                "cascade triggered"
            );
            state.staged_events.emit(ProtocolEvent::CascadeTriggered {
                project: id,
                primary,
                cascade_amount,
                dependency_payouts: dependency_payouts.clone(),
                total_transferred,
            });

            Ok(CascadeReceipt {
                project: id,
                primary,
                cascade_amount,
                dependency_payouts,
                forfeited,
                dust,
                total_transferred,
            })
        })
    }

    /// Pull `amount` from `caller` into project `id`'s failed-potential
    /// pool. The project must be registered; its active flag is ignored.
    /// Admin only. Returns the new pool total.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` is the administrator
    /// - [`CascadeError::UnknownProject`] if `id` was never registered
    /// - [`CascadeError::ZeroAmount`]
    /// - [`CascadeError::Bank`] if `caller` cannot cover `amount`
    pub fn accumulate_failed_potential(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        id: ProjectId,
        amount: u64,
    ) -> Result<u64> {
        self.access.ensure_admin(caller)?;
        if !self.state.projects.contains_key(&id) {
            return Err(CascadeError::UnknownProject(id));
        }
        if amount == 0 {
            return Err(CascadeError::ZeroAmount);
        }
        let (pool, asset) = (self.address, self.asset);
        self.atomically(bank, |state, _router, bank| {
            bank.transfer(asset, caller, pool, amount)?;
            let held = state.failed_potential.entry(id).or_insert(0);
            *held = held.checked_add(amount).ok_or(CascadeError::Overflow)?;
            let pool_total = *held;
            state.reserved = state
                .reserved
                .checked_add(amount)
                .ok_or(CascadeError::Overflow)?;

            tracing::info!(project = id, amount, pool_total, "failed potential accumulated");
            state.staged_events.emit(ProtocolEvent::FailedPotentialAccumulated {
                project: id,
                amount,
                pool_total,
            });
            Ok(pool_total)
        })
    }

    /// Drain project `id`'s failed-potential pool through the router, with
    /// the project's funding address as the default recipient. Admin only.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::Unauthorized`] unless `caller` is the administrator
    /// - [`CascadeError::NoFailedPotential`] if the pool is empty
    /// - [`CascadeError::UnknownProject`] if `id` was never registered
    /// - [`CascadeError::Router`] if routing fails; the pool is left intact
    pub fn distribute_failed_potential(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        id: ProjectId,
    ) -> Result<RouteReceipt> {
        self.access.ensure_admin(caller)?;
        let (pool, asset) = (self.address, self.asset);
        self.atomically(bank, |state, router, bank| {
            let amount = state.failed_potential.remove(&id).unwrap_or(0);
            if amount == 0 {
                return Err(CascadeError::NoFailedPotential(id));
            }
            let funding_address = state
                .projects
                .get(&id)
                .map(|p| p.funding_address)
                .ok_or(CascadeError::UnknownProject(id))?;
            state.reserved = state.reserved.saturating_sub(amount);

            let receipt = router.route_yield(
                bank,
                pool,
                asset,
                amount,
                funding_address,
                FAILED_POTENTIAL_METADATA,
            )?;

            tracing::info!(project = id, amount, "failed potential distributed");
            state
                .staged_events
                .emit(ProtocolEvent::FailedPotentialDistributed { project: id, amount });
            Ok(receipt)
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

    fn atomically<T>(
        &mut self,
        bank: &mut Bank,
        op: impl FnOnce(&mut PoolState, &mut dyn YieldRouting, &mut Bank) -> Result<T>,
    ) -> Result<T> {
        let _entered = self.guard.enter()?;
        let mut staged = self.state.clone();
        let router = self.router.as_mut();
        let output = bank.transaction(|bank| op(&mut staged, router, bank))?;
        self.events.append(&mut staged.staged_events);
        self.state = staged;
        Ok(output)
    }
}
