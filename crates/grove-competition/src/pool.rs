//! The competition pool.
//!
//! All collected fees sit in the pool's token account, split by
//! bookkeeping into per-slot amplifier pools and per-swap-pool fee buckets.

use std::collections::HashMap;

use grove_router::{RouteReceipt, YieldRouting};
use grove_types::bps::apply_bps;
use grove_types::{
    AccessControl, Address, AssetId, Bank, EventLog, Payout, PoolId, ProtocolEvent,
    ReentrancyGuard, Role, SlotId,
};

use crate::config::CompetitionConfig;
use crate::slot::CompetitionSlot;
use crate::{CompetitionError, Result};

/// Metadata attached to fee-sweep routing calls.
pub const FEE_HARVEST_METADATA: &[u8] = b"grove/swap-fees";

#[derive(Clone, Debug, Default)]
struct PoolState {
    slots: HashMap<SlotId, CompetitionSlot>,
    fee_buckets: HashMap<PoolId, u64>,
    /// Events of the call in flight. Empty between calls.
    staged_events: EventLog,
}

/// Competition slots and swap-fee buckets for one asset.
pub struct CompetitionPool {
    address: Address,
    asset: AssetId,
    config: CompetitionConfig,
    access: AccessControl,
    guard: ReentrancyGuard,
    router: Box<dyn YieldRouting>,
    state: PoolState,
    events: EventLog,
}

impl CompetitionPool {
    /// Create a pool whose token account is `address`.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::InvalidFee`] if `config` fails validation
    pub fn new(
        address: Address,
        asset: AssetId,
        admin: Address,
        config: CompetitionConfig,
        router: Box<dyn YieldRouting>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            pool = %address,
            %asset,
            fee_bps = config.fee_bps,
            "competition pool created"
        );
        Ok(Self {
            address,
            asset,
            config,
            access: AccessControl::new(admin),
            guard: ReentrancyGuard::new(),
            router,
            state: PoolState::default(),
            events: EventLog::new(),
        })
    }

    /// The pool's token account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current fee configuration.
    pub fn config(&self) -> &CompetitionConfig {
        &self.config
    }

    /// Allow `reporter` (a swap venue) to deliver fee attributions.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` is the administrator
    pub fn authorize_reporter(&mut self, caller: Address, reporter: Address) -> Result<()> {
        Ok(self.access.grant(caller, Role::FeeReporter, reporter)?)
    }

    /// Allow `who` to settle declared winners.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` is the administrator
    pub fn grant_distributor(&mut self, caller: Address, who: Address) -> Result<()> {
        Ok(self.access.grant(caller, Role::Distributor, who)?)
    }

    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` is the administrator
    /// - [`CompetitionError::InvalidFee`] above 10000 bps
    pub fn set_fee_bps(&mut self, caller: Address, fee_bps: u16) -> Result<()> {
        self.access.ensure_admin(caller)?;
        let config = CompetitionConfig {
            fee_bps,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        tracing::info!(pool = %self.address, fee_bps, "swap fee updated");
        Ok(())
    }

    /// Open slot `id`. Admin only.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` is the administrator
    /// - [`CompetitionError::SlotExists`] if `id` is taken
    pub fn create_competition_slot(&mut self, caller: Address, id: SlotId) -> Result<()> {
        self.access.ensure_admin(caller)?;
        if self.state.slots.contains_key(&id) {
            return Err(CompetitionError::SlotExists(id));
        }
        self.state.slots.insert(id, CompetitionSlot::new(id));
        tracing::info!(slot = id, "competition slot created");
        self.events.emit(ProtocolEvent::SlotCreated { slot: id });
        Ok(())
    }

    /// Slot `id`, if created.
    pub fn slot(&self, id: SlotId) -> Option<&CompetitionSlot> {
        self.state.slots.get(&id)
    }

    /// Fees accrued for swap pool `pool` and not yet harvested.
    pub fn fee_bucket(&self, pool: PoolId) -> u64 {
        self.state.fee_buckets.get(&pool).copied().unwrap_or(0)
    }

    /// Fee attribution for a swap of `swap_amount` in `pool`.
    ///
    /// The fee is pulled from `caller`. When `slot` names an open slot the
    /// swap counts as an attempt and the fee feeds the slot's amplifier
    /// pool. Otherwise, including for a completed slot, the fee accrues to
    /// the pool's fee bucket and no slot changes. Returns the fee.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` holds `FeeReporter`
    /// - [`CompetitionError::UnknownSlot`] if `slot` does not exist
    /// - [`CompetitionError::Bank`] if `caller` cannot cover the fee
    pub fn on_swap(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        pool: PoolId,
        slot: Option<SlotId>,
        swap_amount: u64,
    ) -> Result<u64> {
        self.access.ensure_role(Role::FeeReporter, caller)?;
        let fee = apply_bps(swap_amount, u32::from(self.config.fee_bps))
            .ok_or(CompetitionError::Overflow)?;
        let (account, asset) = (self.address, self.asset);

        self.atomically(bank, |state, _router, bank| {
            let open_slot = match slot {
                Some(id) => {
                    let entry = state
                        .slots
                        .get_mut(&id)
                        .ok_or(CompetitionError::UnknownSlot(id))?;
                    (!entry.completed).then_some(entry)
                }
                None => None,
            };

            if fee > 0 {
                bank.transfer(asset, caller, account, fee)?;
            }

            match open_slot {
                Some(entry) => {
                    entry.record_attempt(fee)?;
                    tracing::debug!(
                        slot = entry.id,
                        pool,
                        fee,
                        attempts = entry.attempts,
                        "attempt recorded"
                    );
                    let event = ProtocolEvent::AttemptRecorded {
                        slot: entry.id,
                        pool,
                        fee,
                        attempts: entry.attempts,
                        amplifier_pool: entry.amplifier_pool,
                    };
                    state.staged_events.emit(event);
                }
                None => {
                    if let Some(id) = slot {
                        tracing::debug!(
                            slot = id,
                            pool,
                            fee,
                            "attribution to completed slot ignored"
                        );
                    }
                    if fee == 0 {
                        return Ok(0);
                    }
                    let bucket = state.fee_buckets.entry(pool).or_insert(0);
                    *bucket = bucket.checked_add(fee).ok_or(CompetitionError::Overflow)?;
                    let bucket_total = *bucket;
                    tracing::debug!(pool, fee, bucket_total, "swap fee accrued");
                    state.staged_events.emit(ProtocolEvent::FeeAccrued {
                        pool,
                        fee,
                        bucket_total,
                    });
                }
            }
            Ok(fee)
        })
    }

    /// Close slot `id` with `winner`. One-shot. Admin only. Returns the
    /// amplifier pool as the payout basis.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` is the administrator
    /// - [`CompetitionError::UnknownSlot`]
    /// - [`CompetitionError::SlotCompleted`] on a second declaration
    /// - [`CompetitionError::ZeroWinner`] / [`CompetitionError::NoAttempts`]
    pub fn declare_winner(&mut self, caller: Address, id: SlotId, winner: Address) -> Result<u64> {
        self.access.ensure_admin(caller)?;
        let slot = self
            .state
            .slots
            .get_mut(&id)
            .ok_or(CompetitionError::UnknownSlot(id))?;
        let payout_basis = slot.declare_winner(winner)?;

        tracing::info!(slot = id, %winner, payout_basis, "winner declared");
        self.events.emit(ProtocolEvent::WinnerDeclared {
            slot: id,
            winner,
            payout_basis,
        });
        Ok(payout_basis)
    }

    /// Pay slot `id`'s amplifier pool to its declared winner. Once only.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` holds `Distributor`
    /// - [`CompetitionError::UnknownSlot`] / [`CompetitionError::NotCompleted`]
    /// - [`CompetitionError::AlreadySettled`]
    pub fn settle_winner(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        id: SlotId,
    ) -> Result<Payout> {
        self.access.ensure_role(Role::Distributor, caller)?;
        let (account, asset) = (self.address, self.asset);
        self.atomically(bank, |state, _router, bank| {
            let slot = state
                .slots
                .get_mut(&id)
                .ok_or(CompetitionError::UnknownSlot(id))?;
            let winner = match (slot.completed, slot.winner) {
                (true, Some(winner)) => winner,
                _ => return Err(CompetitionError::NotCompleted(id)),
            };
            if slot.settled {
                return Err(CompetitionError::AlreadySettled(id));
            }
            let payout = Payout {
                recipient: winner,
                amount: slot.amplifier_pool,
            };
            bank.transfer(asset, account, payout.recipient, payout.amount)?;
            slot.settled = true;

            tracing::info!(slot = id, %winner, amount = payout.amount, "winner settled");
            state.staged_events.emit(ProtocolEvent::WinnerSettled { slot: id, payout });
            Ok(payout)
        })
    }

    /// Drain swap pool `pool`'s fee bucket through the router. Admin only.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::Unauthorized`] unless `caller` is the administrator
    /// - [`CompetitionError::NoFees`] if the bucket is empty
    /// - [`CompetitionError::Router`] if routing fails; the bucket is kept
    pub fn harvest_fees(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        pool: PoolId,
    ) -> Result<RouteReceipt> {
        self.access.ensure_admin(caller)?;
        let (account, asset) = (self.address, self.asset);
        let fee_recipient = self.config.fee_recipient;
        self.atomically(bank, |state, router, bank| {
            let amount = state.fee_buckets.remove(&pool).unwrap_or(0);
            if amount == 0 {
                return Err(CompetitionError::NoFees(pool));
            }
            let receipt = router.route_yield(
                bank,
                account,
                asset,
                amount,
                fee_recipient,
                FEE_HARVEST_METADATA,
            )?;

            tracing::info!(pool, amount, "swap fees harvested");
            state.staged_events.emit(ProtocolEvent::FeesHarvested { pool, amount });
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

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use grove_router::YieldRouter;

    use super::*;

    const ASSET: Address = Address::new([0xD0; 20]);
    const POOL_ACCOUNT: Address = Address::new([0x21; 20]);
    const ROUTER: Address = Address::new([0x30; 20]);
    const ADMIN: Address = Address::new([0x01; 20]);
    const VENUE: Address = Address::new([0x05; 20]);
    const WINNER: Address = Address::new([0x06; 20]);
    const FEE_SINK: Address = Address::new([0x07; 20]);

    const SWAP_POOL: PoolId = 77;

    fn setup() -> (CompetitionPool, Arc<Mutex<YieldRouter>>, Bank) {
        let mut router = YieldRouter::new(ROUTER, ADMIN);
        router.authorize_vault(ADMIN, POOL_ACCOUNT).expect("authorize");
        let router = Arc::new(Mutex::new(router));
        let config = CompetitionConfig {
            fee_bps: 30,
            fee_recipient: FEE_SINK,
        };
        let mut pool = CompetitionPool::new(
            POOL_ACCOUNT,
            ASSET,
            ADMIN,
            config,
            Box::new(Arc::clone(&router)),
        )
        .expect("pool");
        pool.authorize_reporter(ADMIN, VENUE).expect("reporter");
        let mut bank = Bank::new();
        bank.mint(ASSET, VENUE, 1_000_000).expect("mint");
        (pool, router, bank)
    }

    #[test]
    fn test_fees_feed_open_slot() {
        let (mut pool, _router, mut bank) = setup();
        pool.create_competition_slot(ADMIN, 1).expect("slot");

        assert_eq!(pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 10_000).expect("swap"), 30);
        assert_eq!(pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 20_000).expect("swap"), 60);

        let slot = pool.slot(1).expect("slot");
        assert_eq!(slot.attempts, 2);
        assert_eq!(slot.amplifier_pool, 90);
        assert_eq!(pool.events().len(), 3);
        assert!(pool.state.staged_events.is_empty());
        assert_eq!(bank.balance_of(ASSET, POOL_ACCOUNT), 90);
        assert_eq!(pool.fee_bucket(SWAP_POOL), 0);
    }

    #[test]
    fn test_untied_and_completed_attributions_go_to_bucket() {
        let (mut pool, _router, mut bank) = setup();
        pool.create_competition_slot(ADMIN, 1).expect("slot");
        pool.on_swap(&mut bank, VENUE, SWAP_POOL, None, 10_000).expect("swap");
        pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 10_000).expect("swap");
        pool.declare_winner(ADMIN, 1, WINNER).expect("winner");

        pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 10_000).expect("ignored by slot");
        let slot = pool.slot(1).expect("slot");
        assert_eq!(slot.attempts, 1);
        assert_eq!(slot.amplifier_pool, 30);
        assert_eq!(pool.fee_bucket(SWAP_POOL), 60);
    }

    #[test]
    fn test_on_swap_rejections() {
        let (mut pool, _router, mut bank) = setup();
        assert!(matches!(
            pool.on_swap(&mut bank, WINNER, SWAP_POOL, None, 10_000),
            Err(CompetitionError::Unauthorized(_))
        ));
        assert_eq!(
            pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(9), 10_000)
                .expect_err("unknown"),
            CompetitionError::UnknownSlot(9)
        );
        assert_eq!(bank.balance_of(ASSET, VENUE), 1_000_000);
    }

    #[test]
    fn test_zero_fee_swap_still_counts_as_attempt() {
        let (mut pool, _router, mut bank) = setup();
        pool.create_competition_slot(ADMIN, 1).expect("slot");
        assert_eq!(pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 100).expect("swap"), 0);
        assert_eq!(pool.slot(1).expect("slot").attempts, 1);
        assert_eq!(pool.on_swap(&mut bank, VENUE, SWAP_POOL, None, 100).expect("swap"), 0);
        assert_eq!(pool.fee_bucket(SWAP_POOL), 0);
    }

    #[test]
    fn test_winner_is_one_shot() {
        let (mut pool, _router, mut bank) = setup();
        pool.create_competition_slot(ADMIN, 1).expect("slot");
        assert_eq!(
            pool.create_competition_slot(ADMIN, 1).expect_err("duplicate"),
            CompetitionError::SlotExists(1)
        );
        assert_eq!(
            pool.declare_winner(ADMIN, 1, WINNER).expect_err("no attempts"),
            CompetitionError::NoAttempts(1)
        );
        pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 100_000).expect("swap");

        assert!(matches!(
            pool.declare_winner(VENUE, 1, WINNER),
            Err(CompetitionError::Unauthorized(_))
        ));
        assert_eq!(pool.declare_winner(ADMIN, 1, WINNER).expect("declare"), 300);
        assert_eq!(
            pool.declare_winner(ADMIN, 1, WINNER).expect_err("second"),
            CompetitionError::SlotCompleted(1)
        );
    }

    #[test]
    fn test_settle_winner_once() {
        let (mut pool, _router, mut bank) = setup();
        pool.create_competition_slot(ADMIN, 1).expect("slot");
        pool.on_swap(&mut bank, VENUE, SWAP_POOL, Some(1), 100_000).expect("swap");
        assert_eq!(
            pool.settle_winner(&mut bank, ADMIN, 1).expect_err("open"),
            CompetitionError::NotCompleted(1)
        );
        pool.declare_winner(ADMIN, 1, WINNER).expect("declare");

        let payout = pool.settle_winner(&mut bank, ADMIN, 1).expect("settle");
        assert_eq!(payout, Payout { recipient: WINNER, amount: 300 });
        assert_eq!(bank.balance_of(ASSET, WINNER), 300);
        assert!(pool.slot(1).expect("slot").settled);
        assert_eq!(
            pool.settle_winner(&mut bank, ADMIN, 1).expect_err("twice"),
            CompetitionError::AlreadySettled(1)
        );
        assert_eq!(bank.balance_of(ASSET, WINNER), 300);
    }

    #[test]
    fn test_harvest_fees_routes_and_rejects_empty() {
        let (mut pool, router, mut bank) = setup();
        assert_eq!(
            pool.harvest_fees(&mut bank, ADMIN, SWAP_POOL).expect_err("empty"),
            CompetitionError::NoFees(SWAP_POOL)
        );

        pool.on_swap(&mut bank, VENUE, SWAP_POOL, None, 50_000).expect("swap");
        let receipt = pool.harvest_fees(&mut bank, ADMIN, SWAP_POOL).expect("harvest");
        assert_eq!(receipt.amount, 150);
        assert_eq!(bank.balance_of(ASSET, FEE_SINK), 150);
        assert_eq!(pool.fee_bucket(SWAP_POOL), 0);
        assert_eq!(router.lock().expect("router").total_routed(ASSET), 150);

        assert_eq!(
            pool.harvest_fees(&mut bank, ADMIN, SWAP_POOL).expect_err("drained"),
            CompetitionError::NoFees(SWAP_POOL)
        );
    }

    #[test]
    fn test_fee_update() {
        let (mut pool, _router, mut bank) = setup();
        assert!(matches!(
            pool.set_fee_bps(ADMIN, 10_001),
            Err(CompetitionError::InvalidFee { .. })
        ));
        pool.set_fee_bps(ADMIN, 100).expect("fee");
        assert_eq!(pool.on_swap(&mut bank, VENUE, SWAP_POOL, None, 1_000).expect("swap"), 10);
    }
}
