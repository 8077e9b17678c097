//! # grove-router
//!
//! Central yield dispatcher.
//!
//! Vaults and secondary pools hand harvested amounts to a [`YieldRouter`],
//! which fans them out according to the calling vault's
//! [`AllocationPolicy`] (weights in basis points summing to exactly 10000),
//! or forwards everything to a caller-supplied default recipient when the
//! vault has no active policy.
//!
//! Distributors never depend on the concrete router: they receive a boxed
//! [`YieldRouting`] at construction, which lets one router be shared behind
//! `Arc<Mutex<_>>` and lets tests substitute doubles.
//!
//! ## Modules
//!
//! - [`policy`]: Allocation policies and basis-point fan-out
//! - [`router`]: The router itself

pub mod policy;
pub mod router;

use std::sync::{Arc, Mutex, TryLockError};

use grove_types::{AccessError, Address, AssetId, Bank, BankError, Reentrant};

pub use policy::{AllocationPolicy, PolicyEntry, MAX_POLICY_RECIPIENTS};
pub use router::{RouteReceipt, YieldRouter};

/// Error types for routing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The routed amount is zero.
    #[error("routed amount is zero")]
    ZeroAmount,

    /// Weight and recipient arrays differ in length or are empty.
    #[error("invalid array length: {weights} weights, {recipients} recipients")]
    InvalidArrayLength {
        /// Number of weights supplied.
        weights: usize,
        /// Number of recipients supplied.
        recipients: usize,
    },

    /// Policy weights do not sum to 10000.
    #[error("policy weights must sum to 10000 bps, got {total}")]
    WeightSumMismatch {
        /// The actual total.
        total: u32,
    },

    /// A policy recipient (or the fallback recipient) is the null address.
    #[error("recipient at index {index} is the null address")]
    ZeroRecipient {
        /// Position of the offending recipient.
        index: usize,
    },

    /// The vault address is the null address.
    #[error("vault address is the null address")]
    ZeroVault,

    /// No dust is held for the asset.
    #[error("no rounding dust to sweep for {asset}")]
    NoDust {
        /// The asset that was swept.
        asset: AssetId,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in routing calculation")]
    Overflow,

    /// The shared router's lock was poisoned by a panicking holder.
    #[error("shared router is unavailable")]
    Unavailable,

    /// Missing capability.
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    /// Token movement failed.
    #[error(transparent)]
    Bank(#[from] BankError),

    /// Another routing call is in flight.
    #[error(transparent)]
    Reentrant(#[from] Reentrant),
}

/// Convenience result type for routing operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// The routing seam injected into every distributor.
pub trait YieldRouting: Send {
    /// Pull `amount` of `asset` from `caller` and fan it out.
    ///
    /// `default_recipient` receives everything when `caller` has no active
    /// policy. `metadata` is opaque and recorded with the routing event.
    fn route_yield(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        asset: AssetId,
        amount: u64,
        default_recipient: Address,
        metadata: &[u8],
    ) -> Result<RouteReceipt>;
}

/// Calls are serialized, so a shared router that is already locked is being
/// re-entered from inside one of its own calls. That is rejected with
/// [`RouterError::Reentrant`] instead of blocking.
impl<R: YieldRouting> YieldRouting for Arc<Mutex<R>> {
    fn route_yield(
        &mut self,
        bank: &mut Bank,
        caller: Address,
        asset: AssetId,
        amount: u64,
        default_recipient: Address,
        metadata: &[u8],
    ) -> Result<RouteReceipt> {
        let mut router = match self.try_lock() {
            Ok(router) => router,
            Err(TryLockError::WouldBlock) => return Err(Reentrant.into()),
            Err(TryLockError::Poisoned(_)) => return Err(RouterError::Unavailable),
        };
        router.route_yield(bank, caller, asset, amount, default_recipient, metadata)
    }
}
