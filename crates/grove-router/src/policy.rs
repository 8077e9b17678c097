//! Allocation policies and basis-point fan-out.
//!
//! A policy is an ordered list of `(recipient, weight_bps)` pairs whose
//! weights sum to exactly [`BPS_DENOMINATOR`]. Splitting uses integer
//! division per recipient; the remainder is returned as dust rather than
//! handed to any recipient.
//!
//! ## Bound
//!
//! For `n` recipients the dust is strictly less than `n` base units, since
//! each recipient's share loses less than one unit to truncation.

use serde::{Deserialize, Serialize};

use grove_types::bps::{apply_bps, BPS_DENOMINATOR};
use grove_types::{Address, Payout};

use crate::{Result, RouterError};

/// Maximum number of recipients in one policy.
pub const MAX_POLICY_RECIPIENTS: usize = 32;

/// One weighted recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Who receives the share.
    pub recipient: Address,
    /// Share in basis points.
    pub weight_bps: u16,
}

/// A vault's weighted recipient list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    entries: Vec<PolicyEntry>,
    active: bool,
}

impl AllocationPolicy {
    /// Build and validate an active policy from parallel arrays.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidArrayLength`] if the arrays are empty, differ
    ///   in length, or exceed [`MAX_POLICY_RECIPIENTS`]
    /// - [`RouterError::ZeroRecipient`] if any recipient is the null address
    /// - [`RouterError::WeightSumMismatch`] if weights do not sum to 10000
    pub fn new(weights: &[u16], recipients: &[Address]) -> Result<Self> {
        if weights.is_empty()
            || weights.len() != recipients.len()
            || weights.len() > MAX_POLICY_RECIPIENTS
        {
            return Err(RouterError::InvalidArrayLength {
                weights: weights.len(),
                recipients: recipients.len(),
            });
        }

        if let Some(index) = recipients.iter().position(Address::is_zero) {
            return Err(RouterError::ZeroRecipient { index });
        }

        let total: u32 = weights.iter().map(|w| u32::from(*w)).sum();
        if u64::from(total) != BPS_DENOMINATOR {
            return Err(RouterError::WeightSumMismatch { total });
        }

        let entries = recipients
            .iter()
            .zip(weights)
            .map(|(recipient, weight_bps)| PolicyEntry {
                recipient: *recipient,
                weight_bps: *weight_bps,
            })
            .collect();

        Ok(Self {
            entries,
            active: true,
        })
    }

    /// The weighted recipients, in declaration order.
    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    /// Whether the policy is used for routing.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop using this policy; routing falls back to the default recipient.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Sum of all weights, in basis points.
    pub fn total_weight(&self) -> u32 {
        self.entries.iter().map(|e| u32::from(e.weight_bps)).sum()
    }

    /// Split `amount` by weight.
    ///
    /// Returns one payout per entry (zero-amount payouts included, in
    /// order) and the undistributed rounding dust.
    ///
    /// # Errors
    ///
    /// - [`RouterError::Overflow`] on arithmetic overflow
    pub fn split(&self, amount: u64) -> Result<(Vec<Payout>, u64)> {
        let mut payouts = Vec::with_capacity(self.entries.len());
        let mut distributed: u64 = 0;
        for entry in &self.entries {
            let share =
                apply_bps(amount, u32::from(entry.weight_bps)).ok_or(RouterError::Overflow)?;
            distributed = distributed.checked_add(share).ok_or(RouterError::Overflow)?;
            payouts.push(Payout {
                recipient: entry.recipient,
                amount: share,
            });
        }
        let dust = amount.checked_sub(distributed).ok_or(RouterError::Overflow)?;
        Ok((payouts, dust))
    }
}
