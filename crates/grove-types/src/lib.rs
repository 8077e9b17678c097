//! # grove-types
//!
//! Shared primitives used across the Grove workspace.
//!
//! Every component of the yield-donation pipeline (vaults, the yield
//! router, the cascade and competition pools) moves tokens through the same
//! in-memory [`bank::Bank`] and gates administrative calls through the same
//! [`access::AccessControl`] capability model.
//!
//! ## Modules
//!
//! - [`address`]: 20-byte account identifiers
//! - [`bps`]: Basis-point arithmetic
//! - [`bank`]: Token balances with nested, journaled transactions
//! - [`access`]: Capability checks for administrative surfaces
//! - [`guard`]: Single-operation-in-flight guard
//! - [`events`]: Protocol events

pub mod access;
pub mod address;
pub mod bank;
pub mod bps;
pub mod events;
pub mod guard;

pub use access::{AccessControl, Role};
pub use address::{Address, AssetId};
pub use bank::Bank;
pub use events::{EventLog, Payout, ProtocolEvent};
pub use guard::{Entered, ReentrancyGuard};

/// Identifier of a project registered with a cascade pool.
pub type ProjectId = u64;

/// Identifier of a competition slot.
pub type SlotId = u64;

/// Identity of a swap pool reporting fees.
pub type PoolId = u64;

/// Seconds in one day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds in a (365-day) year, used for annualized rate estimates.
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Errors raised by the token bank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    /// The holder does not own enough of the asset.
    #[error("insufficient balance of {asset} for {holder}: need {required}, have {available}")]
    InsufficientBalance {
        /// Asset being moved.
        asset: AssetId,
        /// Account being debited.
        holder: Address,
        /// Amount requested.
        required: u64,
        /// Amount held.
        available: u64,
    },

    /// Balance or supply would exceed `u64::MAX`.
    #[error("balance overflow for {asset}")]
    Overflow {
        /// Asset whose balance overflowed.
        asset: AssetId,
    },

    /// Tokens cannot be moved to or minted for the null address.
    #[error("null address is not a valid counterparty")]
    ZeroAddress,
}

/// Errors raised by capability checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Caller is not the administrator.
    #[error("{caller} is not the administrator")]
    NotAdmin {
        /// The rejected caller.
        caller: Address,
    },

    /// Caller lacks the required role.
    #[error("{caller} lacks the {role} capability")]
    MissingRole {
        /// The rejected caller.
        caller: Address,
        /// The role that was required.
        role: Role,
    },

    /// The null address cannot hold a capability.
    #[error("null address cannot hold a capability")]
    ZeroAddress,
}

/// Another operation is already in flight on the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("re-entrant call rejected: an operation is already in flight")]
pub struct Reentrant;

/// Error returned when parsing an [`Address`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseAddressError {
    /// The text is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded byte length is not 20.
    #[error("expected 20 bytes, got {0}")]
    InvalidLength(usize),
}
