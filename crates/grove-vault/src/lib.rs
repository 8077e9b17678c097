//! # grove-vault
//!
//! Per-vault capital and share accounting.
//!
//! Depositors receive shares 1:1 with the principal they contribute; the
//! principal is put to work in an external [`source::YieldSource`]. Yield is
//! whatever the source reports above total principal. Harvesting moves that
//! excess into `pending_yield`; distributing withdraws it and pays the
//! vault's four distribution buckets, the public-goods bucket optionally
//! through a [`grove_router::YieldRouting`] implementation.
//!
//! ## Capital preservation
//!
//! The source balance never falls below total principal as a result of a
//! vault operation: deposits add the same amount to both, withdrawals burn
//! the same amount from both, and yield operations only ever withdraw
//! `min(pending_yield, balance - principal)`.
//!
//! ## Modules
//!
//! - [`config`]: Vault configuration and the distribution bucket table
//! - [`source`]: Lending-market and reward-claim seams, plus an in-memory market
//! - [`temporal`]: Commitment-length multiplier table
//! - [`account`]: Per-depositor records and locked commitments
//! - [`vault`]: The accounting vault
//! - [`metrics`]: Read-only views

pub mod account;
pub mod config;
pub mod metrics;
pub mod source;
pub mod temporal;
pub mod vault;

use grove_router::RouterError;
use grove_types::{AccessError, Address, AssetId, BankError, Reentrant};

pub use config::{Bucket, BucketKind, DistributionBuckets, VaultConfig};
pub use metrics::{UserSnapshot, VaultMetrics};
pub use source::{FixedRewards, InMemoryLendingMarket, ReserveData, RewardsController, YieldSource};
pub use temporal::{TemporalAmplifier, TemporalTier};
pub use vault::{AccountingVault, BucketPayout, DistributionReceipt};

/// Maximum configurable harvest cooldown (one day).
pub const MAX_HARVEST_COOLDOWN_SECS: u64 = grove_types::SECONDS_PER_DAY;

/// Errors raised by the external yield source or reward controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The source does not manage this asset.
    #[error("asset {0} is not supported by the yield source")]
    UnsupportedAsset(AssetId),

    /// The holder's position is smaller than the requested withdrawal.
    #[error("position of {holder} is {available}, cannot withdraw {requested}")]
    InsufficientPosition {
        /// Position holder.
        holder: Address,
        /// Amount requested.
        requested: u64,
        /// Position size.
        available: u64,
    },

    /// The reward controller failed to claim.
    #[error("reward claim failed: {0}")]
    RewardClaim(String),

    /// Token movement failed.
    #[error(transparent)]
    Bank(#[from] BankError),
}

/// Error types for vault operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// Deposit is below the configured minimum.
    #[error("deposit of {amount} is below the minimum of {minimum}")]
    BelowMinimum {
        /// Amount offered.
        amount: u64,
        /// Configured minimum.
        minimum: u64,
    },

    /// Amount is zero.
    #[error("amount is zero")]
    ZeroAmount,

    /// Receiver is the null address.
    #[error("receiver is the null address")]
    InvalidReceiver,

    /// The vault is paused.
    #[error("vault is paused")]
    Paused,

    /// The vault is in emergency mode and accepts no new capital.
    #[error("vault is in emergency mode")]
    EmergencyMode,

    /// Emergency withdrawal attempted outside emergency mode.
    #[error("vault is not in emergency mode")]
    NotEmergencyMode,

    /// Deposit would exceed the configured cap.
    #[error("deposit of {requested} exceeds remaining capacity {available}")]
    DepositCapExceeded {
        /// Amount offered.
        requested: u64,
        /// Remaining capacity.
        available: u64,
    },

    /// Owner holds fewer shares than requested.
    #[error("{owner} holds {available} shares, cannot withdraw {requested}")]
    InsufficientShares {
        /// Share owner.
        owner: Address,
        /// Shares requested.
        requested: u64,
        /// Shares held.
        available: u64,
    },

    /// Some of the owner's shares are locked by commitments.
    #[error("{owner} has {unlocked} unlocked shares, cannot withdraw {requested}")]
    SharesLocked {
        /// Share owner.
        owner: Address,
        /// Shares requested.
        requested: u64,
        /// Shares not covered by an active lock.
        unlocked: u64,
    },

    /// Delegated withdrawal exceeds the allowance.
    #[error("allowance of {spender} is {allowance}, cannot withdraw {requested}")]
    InsufficientAllowance {
        /// The delegated caller.
        spender: Address,
        /// Shares requested.
        requested: u64,
        /// Remaining allowance.
        allowance: u64,
    },

    /// The yield source returned less than the slippage tolerance allows.
    #[error("slippage exceeded: requested {requested}, returned {returned}, minimum {minimum}")]
    SlippageExceeded {
        /// Amount requested from the source.
        requested: u64,
        /// Amount actually returned.
        returned: u64,
        /// Smallest acceptable return.
        minimum: u64,
    },

    /// Nothing above principal to harvest.
    #[error("no yield available")]
    NoYieldAvailable,

    /// Nothing harvested to distribute.
    #[error("no pending yield to distribute")]
    NoPendingYield,

    /// No distribution bucket has a non-zero share.
    #[error("no active distribution policy")]
    NoActivePolicy,

    /// Non-keeper harvest before the cooldown elapsed.
    #[error("harvest cooldown active until {ready_at}, now {now}")]
    HarvestCooldown {
        /// When a permissionless harvest becomes possible.
        ready_at: u64,
        /// The current time.
        now: u64,
    },

    /// Requested cooldown exceeds [`MAX_HARVEST_COOLDOWN_SECS`].
    #[error("harvest cooldown of {requested}s exceeds maximum {max}s")]
    CooldownTooLong {
        /// Requested cooldown.
        requested: u64,
        /// Allowed maximum.
        max: u64,
    },

    /// Invalid configuration.
    #[error("invalid vault configuration: {0}")]
    InvalidConfig(String),

    /// The vault has no temporal amplifier tiers.
    #[error("locked commitments are not supported by this vault")]
    LocksUnsupported,

    /// No tier matches the requested commitment length.
    #[error("no amplifier tier for a {lock_secs}s commitment")]
    NoTemporalTier {
        /// Requested commitment length.
        lock_secs: u64,
    },

    /// Unknown commitment id.
    #[error("unknown commitment {0}")]
    UnknownCommitment(u64),

    /// The commitment's payout window is not open.
    #[error("commitment {id} is claimable from {unlock_at} until {claim_until}, now {now}")]
    CommitmentNotClaimable {
        /// Commitment id.
        id: u64,
        /// Start of the claim window.
        unlock_at: u64,
        /// End of the claim window (exclusive).
        claim_until: u64,
        /// The current time.
        now: u64,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in vault accounting")]
    Overflow,

    /// Missing capability.
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    /// Token movement failed.
    #[error(transparent)]
    Bank(#[from] BankError),

    /// The yield source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Routing the public-goods share failed.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Another vault operation is in flight.
    #[error(transparent)]
    Reentrant(#[from] Reentrant),
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
