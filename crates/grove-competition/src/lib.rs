//! # grove-competition
//!
//! Competition redistribution fed by swap fees.
//!
//! A swap venue reports each trade through [`CompetitionPool::on_swap`].
//! The derived fee is pulled from the reporter and either feeds an open
//! competition slot's amplifier pool (counting one attempt) or accrues to
//! the swap pool's fee bucket. A slot ends when a winner is declared; the
//! amplifier pool is then settled to the winner exactly once. Fee buckets
//! are swept through the yield router.
//!
//! ## Modules
//!
//! - [`config`]: Fee configuration
//! - [`slot`]: Competition slots
//! - [`pool`]: The competition pool

pub mod config;
pub mod pool;
pub mod slot;

use grove_router::RouterError;
use grove_types::{AccessError, BankError, PoolId, Reentrant, SlotId};

pub use config::CompetitionConfig;
pub use pool::CompetitionPool;
pub use slot::CompetitionSlot;

/// Error types for competition operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompetitionError {
    /// A slot with this id already exists.
    #[error("competition slot {0} already exists")]
    SlotExists(SlotId),

    /// No slot with this id.
    #[error("unknown competition slot {0}")]
    UnknownSlot(SlotId),

    /// The slot already has a winner.
    #[error("competition slot {0} is completed")]
    SlotCompleted(SlotId),

    /// Winner declared before any attempt.
    #[error("competition slot {0} has no attempts")]
    NoAttempts(SlotId),

    /// Winner is the null address.
    #[error("winner is the null address")]
    ZeroWinner,

    /// Settlement before a winner was declared.
    #[error("competition slot {0} has no winner yet")]
    NotCompleted(SlotId),

    /// The slot's payout was already settled.
    #[error("competition slot {0} is already settled")]
    AlreadySettled(SlotId),

    /// Fee sweep of an empty bucket.
    #[error("no fees accrued for pool {0}")]
    NoFees(PoolId),

    /// Fee rate above 10000 bps.
    #[error("fee of {fee_bps} bps exceeds 10000")]
    InvalidFee {
        /// Requested rate.
        fee_bps: u16,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in competition accounting")]
    Overflow,

    /// Missing capability.
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    /// Token movement failed.
    #[error(transparent)]
    Bank(#[from] BankError),

    /// Routing harvested fees failed.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Another pool operation is in flight.
    #[error(transparent)]
    Reentrant(#[from] Reentrant),
}

/// Convenience result type for competition operations.
pub type Result<T> = std::result::Result<T, CompetitionError>;
