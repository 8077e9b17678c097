//! Commitment-length multiplier table.
//!
//! Depositors may lock shares for a chosen period. The longest tier whose
//! `min_lock_secs` the period reaches supplies a payout multiplier and an
//! unlock window: once the lock expires, the amplified payout can be
//! claimed for `unlock_window_secs`.
//!
//! ```text
//! amplified = base * multiplier_bps / 10000
//! ```

use serde::{Deserialize, Serialize};

use grove_types::bps::{mul_div, BPS_DENOMINATOR};

use crate::{Result, VaultError};

/// Largest multiplier a tier may carry (3x).
pub const MAX_MULTIPLIER_BPS: u32 = 30_000;

/// One row of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalTier {
    /// Shortest commitment that qualifies for this tier.
    pub min_lock_secs: u64,
    /// Payout multiplier in basis points (10000 = 1x).
    pub multiplier_bps: u32,
    /// How long after unlock the amplified payout stays claimable.
    pub unlock_window_secs: u64,
}

/// Validated, ascending list of tiers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemporalAmplifier {
    tiers: Vec<TemporalTier>,
}

impl TemporalAmplifier {
    /// Validate and wrap a tier list.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidConfig`] if tiers are not strictly ascending by
    ///   `min_lock_secs`, a multiplier is below 1x or above
    ///   [`MAX_MULTIPLIER_BPS`], or an unlock window is zero
    pub fn new(tiers: Vec<TemporalTier>) -> Result<Self> {
        for pair in tiers.windows(2) {
            if pair[1].min_lock_secs <= pair[0].min_lock_secs {
                return Err(VaultError::InvalidConfig(
                    "temporal tiers must be strictly ascending by min_lock_secs".to_string(),
                ));
            }
        }
        for tier in &tiers {
            if u64::from(tier.multiplier_bps) < BPS_DENOMINATOR
                || tier.multiplier_bps > MAX_MULTIPLIER_BPS
            {
                return Err(VaultError::InvalidConfig(format!(
                    "tier multiplier {} bps outside {BPS_DENOMINATOR}..={MAX_MULTIPLIER_BPS}",
                    tier.multiplier_bps
                )));
            }
            if tier.unlock_window_secs == 0 {
                return Err(VaultError::InvalidConfig(
                    "tier unlock window must be non-zero".to_string(),
                ));
            }
        }
        Ok(Self { tiers })
    }

    /// Whether any tier is configured.
    pub fn is_enabled(&self) -> bool {
        !self.tiers.is_empty()
    }

    /// The tiers, ascending.
    pub fn tiers(&self) -> &[TemporalTier] {
        &self.tiers
    }

    /// The longest tier reached by a `lock_secs` commitment.
    pub fn lookup(&self, lock_secs: u64) -> Option<&TemporalTier> {
        self.tiers
            .iter()
            .rev()
            .find(|tier| lock_secs >= tier.min_lock_secs)
    }

    /// Amplify `base` by the tier matched for `lock_secs`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoTemporalTier`] if no tier matches
    /// - [`VaultError::Overflow`] if the result exceeds `u64::MAX`
    pub fn amplify(&self, base: u64, lock_secs: u64) -> Result<u64> {
        let tier = self
            .lookup(lock_secs)
            .ok_or(VaultError::NoTemporalTier { lock_secs })?;
        amplify_by(base, tier.multiplier_bps)
    }
}

/// `base * multiplier_bps / 10000`.
pub(crate) fn amplify_by(base: u64, multiplier_bps: u32) -> Result<u64> {
    mul_div(base, u64::from(multiplier_bps), BPS_DENOMINATOR).ok_or(VaultError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;

    fn table() -> TemporalAmplifier {
        TemporalAmplifier::new(vec![
            TemporalTier {
                min_lock_secs: 30 * DAY,
                multiplier_bps: 11_000,
                unlock_window_secs: 7 * DAY,
            },
            TemporalTier {
                min_lock_secs: 90 * DAY,
                multiplier_bps: 13_000,
                unlock_window_secs: 14 * DAY,
            },
            TemporalTier {
                min_lock_secs: 365 * DAY,
                multiplier_bps: 20_000,
                unlock_window_secs: 30 * DAY,
            },
        ])
        .expect("valid table")
    }

    #[test]
    fn test_lookup_picks_longest_reached_tier() {
        let amp = table();
        assert!(amp.lookup(29 * DAY).is_none());
        assert_eq!(amp.lookup(30 * DAY).map(|t| t.multiplier_bps), Some(11_000));
        assert_eq!(amp.lookup(89 * DAY).map(|t| t.multiplier_bps), Some(11_000));
        assert_eq!(amp.lookup(90 * DAY).map(|t| t.multiplier_bps), Some(13_000));
        assert_eq!(amp.lookup(10 * 365 * DAY).map(|t| t.multiplier_bps), Some(20_000));
    }

    #[test]
    fn test_amplify() {
        let amp = table();
        assert_eq!(amp.amplify(1_000, 90 * DAY).expect("amplify"), 1_300);
        assert_eq!(amp.amplify(1_000, 400 * DAY).expect("amplify"), 2_000);
        assert_eq!(
            amp.amplify(1_000, DAY),
            Err(VaultError::NoTemporalTier { lock_secs: DAY })
        );
    }

    #[test]
    fn test_unsorted_tiers_rejected() {
        let tier = TemporalTier {
            min_lock_secs: DAY,
            multiplier_bps: 11_000,
            unlock_window_secs: DAY,
        };
        assert!(TemporalAmplifier::new(vec![tier, tier]).is_err());
    }

    #[test]
    fn test_dampening_multiplier_rejected() {
        let tier = TemporalTier {
            min_lock_secs: DAY,
            multiplier_bps: 9_999,
            unlock_window_secs: DAY,
        };
        assert!(TemporalAmplifier::new(vec![tier]).is_err());
    }

    #[test]
    fn test_excessive_multiplier_rejected() {
        let tier = TemporalTier {
            min_lock_secs: DAY,
            multiplier_bps: MAX_MULTIPLIER_BPS + 1,
            unlock_window_secs: DAY,
        };
        assert!(TemporalAmplifier::new(vec![tier]).is_err());
    }

    #[test]
    fn test_empty_table_disabled() {
        let amp = TemporalAmplifier::new(Vec::new()).expect("empty ok");
        assert!(!amp.is_enabled());
        assert!(amp.lookup(u64::MAX).is_none());
    }
}
