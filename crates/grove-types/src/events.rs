//! Protocol events.
//!
//! Components append events to their own [`EventLog`]. The log is part of
//! each component's rolled-back state, so a failed operation never leaves
//! an event behind.

use serde::Serialize;

use crate::{Address, AssetId, PoolId, ProjectId, SlotId};

/// A single transfer to a recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Payout {
    /// Who was paid.
    pub recipient: Address,
    /// How much.
    pub amount: u64,
}

/// Everything observable that the protocol does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    // Vault events
    Deposited {
        vault: Address,
        caller: Address,
        receiver: Address,
        assets: u64,
        shares: u64,
    },
    Withdrawn {
        vault: Address,
        caller: Address,
        owner: Address,
        receiver: Address,
        shares: u64,
        returned: u64,
    },
    EmergencyWithdrawn {
        vault: Address,
        owner: Address,
        receiver: Address,
        shares: u64,
        returned: u64,
    },
    Committed {
        vault: Address,
        owner: Address,
        commitment_id: u64,
        shares: u64,
        multiplier_bps: u32,
        unlock_at: u64,
    },
    YieldHarvested {
        vault: Address,
        amount: u64,
        pending: u64,
        timestamp: u64,
    },
    YieldDistributed {
        vault: Address,
        withdrawn: u64,
        payouts: Vec<Payout>,
        retained: u64,
    },
    Paused {
        vault: Address,
    },
    Unpaused {
        vault: Address,
    },
    EmergencyActivated {
        vault: Address,
    },

    // Router events
    PolicyUpdated {
        vault: Address,
        recipients: Vec<Address>,
        weights_bps: Vec<u16>,
    },
    PolicyDeactivated {
        vault: Address,
    },
    YieldRouted {
        vault: Address,
        asset: AssetId,
        amount: u64,
        payouts: Vec<Payout>,
        dust: u64,
        metadata: Vec<u8>,
    },
    DustSwept {
        asset: AssetId,
        to: Address,
        amount: u64,
    },

    // Cascade pool events
    ProjectRegistered {
        project: ProjectId,
        funding_address: Address,
        dependencies: Vec<ProjectId>,
        cascade_multiplier_bps: u16,
    },
    ProjectDeactivated {
        project: ProjectId,
    },
    CascadeTriggered {
        project: ProjectId,
        primary: Payout,
        cascade_amount: u64,
        dependency_payouts: Vec<Payout>,
        total_transferred: u64,
    },
    FailedPotentialAccumulated {
        project: ProjectId,
        amount: u64,
        pool_total: u64,
    },
    FailedPotentialDistributed {
        project: ProjectId,
        amount: u64,
    },

    // Competition pool events
    SlotCreated {
        slot: SlotId,
    },
    AttemptRecorded {
        slot: SlotId,
        pool: PoolId,
        fee: u64,
        attempts: u64,
        amplifier_pool: u64,
    },
    FeeAccrued {
        pool: PoolId,
        fee: u64,
        bucket_total: u64,
    },
    WinnerDeclared {
        slot: SlotId,
        winner: Address,
        payout_basis: u64,
    },
    WinnerSettled {
        slot: SlotId,
        payout: Payout,
    },
    FeesHarvested {
        pool: PoolId,
        amount: u64,
    },
}

/// Append-only list of emitted events.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// All recorded events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ProtocolEvent> {
        self.events.iter()
    }

    /// The most recent event.
    pub fn last(&self) -> Option<&ProtocolEvent> {
        self.events.last()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove and return every recorded event.
    pub fn drain(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Move every event out of `other` onto the end of this log.
    pub fn append(&mut self, other: &mut EventLog) {
        self.events.append(&mut other.events);
    }
}
