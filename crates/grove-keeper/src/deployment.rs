//! In-memory deployment driven by the keeper.
//!
//! Wires one vault, one shared router, a cascade pool and a competition
//! pool over a single bank, with a simulated lending market underneath.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use grove_cascade::{CascadeError, CascadePool};
use grove_competition::{CompetitionError, CompetitionPool};
use grove_router::YieldRouter;
use grove_types::bps::{apply_bps, mul_div, BPS_DENOMINATOR};
use grove_types::{Address, Bank, ProtocolEvent, SlotId};
use grove_vault::{AccountingVault, DistributionReceipt, InMemoryLendingMarket, VaultMetrics};

use crate::config::KeeperConfig;

pub const ASSET: Address = Address::new([0xA5; 20]);
pub const RECEIPT_TOKEN: Address = Address::new([0xA6; 20]);
pub const MARKET_RESERVE: Address = Address::new([0xA7; 20]);
pub const ADMIN: Address = Address::new([0x0A; 20]);
pub const KEEPER: Address = Address::new([0x0B; 20]);
pub const SWAP_VENUE: Address = Address::new([0x0C; 20]);
pub const VAULT: Address = Address::new([0x10; 20]);
pub const CASCADE_POOL: Address = Address::new([0x20; 20]);
pub const COMPETITION_POOL: Address = Address::new([0x21; 20]);
pub const ROUTER: Address = Address::new([0x30; 20]);
pub const PUBLIC_GOODS: Address = Address::new([0x50; 20]);
pub const TREASURY: Address = Address::new([0x51; 20]);

/// Swap-venue pool id used for simulated trades.
const SWAP_POOL: u64 = 1;

/// What one keeper round did.
#[derive(Debug, Default, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub accrued: u64,
    pub distribution: Option<DistributionReceipt>,
    pub cascaded: u64,
    pub swap_fee: u64,
    pub winner_paid: u64,
    pub fees_swept: u64,
}

pub struct Deployment {
    bank: Bank,
    market: InMemoryLendingMarket,
    vault: AccountingVault,
    router: Arc<Mutex<YieldRouter>>,
    cascade: CascadePool,
    competition: CompetitionPool,
    depositors: Vec<Address>,
    cascade_project: Option<u64>,
    yield_bps: u16,
    max_swap_amount: u64,
    slot_rounds: u64,
    open_slot: SlotId,
}

impl Deployment {
    /// Build every component from `config` and seed depositor positions.
    pub fn build(config: &KeeperConfig, now: u64) -> anyhow::Result<Self> {
        let mut bank = Bank::new();
        let market = InMemoryLendingMarket::new(ASSET, RECEIPT_TOKEN, MARKET_RESERVE);

        let mut router = YieldRouter::new(ROUTER, ADMIN);
        for account in [VAULT, CASCADE_POOL, COMPETITION_POOL] {
            router.authorize_vault(ADMIN, account)?;
        }
        if !config.router.recipients.is_empty() {
            router
                .set_allocation_policy(
                    ADMIN,
                    VAULT,
                    &config.router.weights_bps,
                    &config.router.recipients,
                )
                .context("invalid [router] policy")?;
        }
        let router = Arc::new(Mutex::new(router));

        let mut vault = AccountingVault::new(
            VAULT,
            ASSET,
            ADMIN,
            config.vault.clone(),
            Box::new(market.clone()),
            now,
        )
        .context("invalid [vault] configuration")?
        .with_router(Box::new(Arc::clone(&router)));
        vault.set_keeper(ADMIN, KEEPER)?;

        let depositors: Vec<Address> = (1..=config.deployment.depositors)
            .map(|n| Address::from_low_u64(0x1000 + n))
            .collect();
        for &depositor in &depositors {
            bank.mint(ASSET, depositor, config.deployment.initial_deposit)?;
            vault.deposit(&mut bank, depositor, config.deployment.initial_deposit, depositor, now)?;
        }

        let mut cascade =
            CascadePool::new(CASCADE_POOL, ASSET, ADMIN, Box::new(Arc::clone(&router)));
        cascade.grant_distributor(ADMIN, KEEPER)?;
        for project in &config.projects {
            cascade
                .register_project(
                    ADMIN,
                    project.id,
                    project.funding_address,
                    &project.dependencies,
                    project.cascade_multiplier_bps,
                )
                .with_context(|| format!("invalid project {}", project.id))?;
        }

        let mut competition = CompetitionPool::new(
            COMPETITION_POOL,
            ASSET,
            ADMIN,
            config.competition,
            Box::new(Arc::clone(&router)),
        )
        .context("invalid [competition] configuration")?;
        competition.authorize_reporter(ADMIN, SWAP_VENUE)?;
        competition.grant_distributor(ADMIN, KEEPER)?;
        competition.create_competition_slot(ADMIN, 1)?;

        info!(
            depositors = depositors.len(),
            principal = vault.total_principal(),
            projects = config.projects.len(),
            "deployment ready"
        );

        Ok(Self {
            bank,
            market,
            vault,
            router,
            cascade,
            competition,
            depositors,
            cascade_project: config.deployment.cascade_project,
            yield_bps: config.keeper.simulated_yield_bps_per_round,
            max_swap_amount: config.deployment.max_swap_amount,
            slot_rounds: config.deployment.slot_rounds.max(1),
            open_slot: 1,
        })
    }

    /// Simulate one period of market activity and run the keeper duties.
    pub fn run_round(
        &mut self,
        round: u64,
        now: u64,
        rng: &mut impl Rng,
    ) -> anyhow::Result<RoundReport> {
        let mut report = RoundReport {
            round,
            ..RoundReport::default()
        };

        // Lending-market interest, jittered between 50% and 150% of the target rate.
        let base = apply_bps(self.vault.total_principal(), u32::from(self.yield_bps)).unwrap_or(0);
        report.accrued = base.saturating_mul(rng.gen_range(50..=150)) / 100;
        if report.accrued > 0 {
            self.market.accrue(&mut self.bank, VAULT, report.accrued)?;
        }

        report.distribution = self.vault.harvest_and_route_yield(&mut self.bank, KEEPER, now)?;

        if let Some(project) = self.cascade_project {
            report.cascaded = self.cascade_round(project)?;
        }

        report.swap_fee = self.swap_round(rng)?;
        if round % self.slot_rounds == 0 {
            report.winner_paid = self.close_slot(rng)?;
            report.fees_swept = self.sweep_fees()?;
        }

        Ok(report)
    }

    /// Spend the cascade pool's free balance on one cascade, sized so
    /// primary plus cascade share fits.
    fn cascade_round(&mut self, project: u64) -> anyhow::Result<u64> {
        let Some(multiplier) = self
            .cascade
            .project(project)
            .map(|p| p.cascade_multiplier_bps)
        else {
            warn!(project, "cascade project is not registered");
            return Ok(0);
        };
        let available = self.cascade.available_balance(&self.bank);
        let primary = mul_div(
            available,
            BPS_DENOMINATOR,
            BPS_DENOMINATOR + u64::from(multiplier),
        )
        .unwrap_or(0);
        if primary == 0 {
            return Ok(0);
        }
        match self.cascade.trigger_cascade(&mut self.bank, KEEPER, project, primary) {
            Ok(receipt) => Ok(receipt.total_transferred),
            Err(CascadeError::ProjectInactive(_)) => {
                debug!(project, "cascade project inactive, skipping");
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One simulated swap tied to the open competition slot.
    fn swap_round(&mut self, rng: &mut impl Rng) -> anyhow::Result<u64> {
        let amount = rng.gen_range(0..=self.max_swap_amount);
        let fee = apply_bps(amount, u32::from(self.competition.config().fee_bps)).unwrap_or(0);
        if fee > self.bank.balance_of(ASSET, SWAP_VENUE) {
            self.bank.mint(ASSET, SWAP_VENUE, fee)?;
        }
        Ok(self
            .competition
            .on_swap(&mut self.bank, SWAP_VENUE, SWAP_POOL, Some(self.open_slot), amount)?)
    }

    /// Declare a random depositor winner of the open slot, settle it and
    /// open the next one.
    fn close_slot(&mut self, rng: &mut impl Rng) -> anyhow::Result<u64> {
        let slot = self.open_slot;
        let pick = rng.gen_range(0..self.depositors.len().max(1));
        let Some(&winner) = self.depositors.get(pick) else {
            return Ok(0);
        };
        let paid = match self.competition.declare_winner(ADMIN, slot, winner) {
            Ok(_) => self.competition.settle_winner(&mut self.bank, KEEPER, slot)?.amount,
            Err(CompetitionError::NoAttempts(_)) => {
                debug!(slot, "no attempts, slot stays open");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        self.open_slot += 1;
        self.competition.create_competition_slot(ADMIN, self.open_slot)?;
        Ok(paid)
    }

    fn sweep_fees(&mut self) -> anyhow::Result<u64> {
        match self.competition.harvest_fees(&mut self.bank, ADMIN, SWAP_POOL) {
            Ok(receipt) => Ok(receipt.amount),
            Err(CompetitionError::NoFees(_)) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn metrics(&self) -> VaultMetrics {
        self.vault.metrics(&self.bank)
    }

    /// Lifetime amount the router has fanned out.
    pub fn total_routed(&self) -> u128 {
        self.router
            .lock()
            .map(|router| router.total_routed(ASSET))
            .unwrap_or(0)
    }

    /// Take the events every component emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        let mut events = self.vault.drain_events();
        if let Ok(mut router) = self.router.lock() {
            events.extend(router.drain_events());
        }
        events.extend(self.cascade.drain_events());
        events.extend(self.competition.drain_events());
        events
    }
}
