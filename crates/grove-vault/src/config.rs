//! Vault configuration.
//!
//! Loaded from the `[vault]` table of the keeper's TOML file. Every field
//! has a default so a partial table is enough.
//!
//! The distribution table is a fixed four-way split of each distributed
//! yield amount. Unlike a router policy its shares need not sum to 10000;
//! whatever is left unallocated is put back into the yield source.

use serde::{Deserialize, Serialize};

use grove_types::bps::BPS_DENOMINATOR;
use grove_types::Address;

use crate::temporal::TemporalTier;
use crate::{Result, VaultError, MAX_HARVEST_COOLDOWN_SECS};

/// The four named distribution buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    /// Public-goods funding; dispatched through the router when one is wired.
    PublicGoods,
    /// Funding for the cascade pool.
    Cascade,
    /// Funding for the competition pool.
    Competition,
    /// Protocol treasury.
    Treasury,
}

/// A single bucket's recipient and share.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Where the share goes.
    #[serde(default)]
    pub recipient: Address,
    /// Share of distributed yield, in basis points.
    #[serde(default)]
    pub share_bps: u16,
}

/// The fixed four-way distribution table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBuckets {
    #[serde(default)]
    pub public_goods: Bucket,
    #[serde(default)]
    pub cascade: Bucket,
    #[serde(default)]
    pub competition: Bucket,
    #[serde(default)]
    pub treasury: Bucket,
}

impl DistributionBuckets {
    /// All buckets in payout order.
    pub fn iter(&self) -> [(BucketKind, Bucket); 4] {
        [
            (BucketKind::PublicGoods, self.public_goods),
            (BucketKind::Cascade, self.cascade),
            (BucketKind::Competition, self.competition),
            (BucketKind::Treasury, self.treasury),
        ]
    }

    /// Sum of all shares, in basis points.
    pub fn total_bps(&self) -> u32 {
        self.iter().iter().map(|(_, b)| u32::from(b.share_bps)).sum()
    }

    /// Whether any bucket receives a share.
    pub fn is_active(&self) -> bool {
        self.total_bps() > 0
    }

    /// # Errors
    ///
    /// - [`VaultError::InvalidConfig`] if shares exceed 10000 in total or a
    ///   bucket with a non-zero share has no recipient
    pub fn validate(&self) -> Result<()> {
        let total = self.total_bps();
        if u64::from(total) > BPS_DENOMINATOR {
            return Err(VaultError::InvalidConfig(format!(
                "bucket shares sum to {total} bps, maximum is {BPS_DENOMINATOR}"
            )));
        }
        for (kind, bucket) in self.iter() {
            if bucket.share_bps > 0 && bucket.recipient.is_zero() {
                return Err(VaultError::InvalidConfig(format!(
                    "{kind:?} bucket has a share but no recipient"
                )));
            }
        }
        Ok(())
    }
}

/// Vault tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Smallest accepted deposit.
    #[serde(default = "default_min_deposit")]
    pub min_deposit: u64,
    /// Maximum total principal. `None` = unlimited.
    #[serde(default)]
    pub deposit_cap: Option<u64>,
    /// Largest tolerated shortfall on withdrawals from the yield source.
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u16,
    /// Minimum time between permissionless harvests.
    #[serde(default = "default_harvest_cooldown")]
    pub harvest_cooldown_secs: u64,
    /// Distribution table.
    #[serde(default)]
    pub buckets: DistributionBuckets,
    /// Commitment tiers. Empty = locked commitments unsupported.
    #[serde(default)]
    pub temporal: Vec<TemporalTier>,
}

// Default value functions

fn default_min_deposit() -> u64 {
    1
}

fn default_max_slippage_bps() -> u16 {
    200
}

fn default_harvest_cooldown() -> u64 {
    3600
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            min_deposit: default_min_deposit(),
            deposit_cap: None,
            max_slippage_bps: default_max_slippage_bps(),
            harvest_cooldown_secs: default_harvest_cooldown(),
            buckets: DistributionBuckets::default(),
            temporal: Vec::new(),
        }
    }
}

impl VaultConfig {
    /// # Errors
    ///
    /// - [`VaultError::CooldownTooLong`] if the cooldown exceeds one day
    /// - [`VaultError::InvalidConfig`] for an out-of-range slippage tolerance,
    ///   an invalid bucket table, or invalid temporal tiers
    pub fn validate(&self) -> Result<()> {
        if self.harvest_cooldown_secs > MAX_HARVEST_COOLDOWN_SECS {
            return Err(VaultError::CooldownTooLong {
                requested: self.harvest_cooldown_secs,
                max: MAX_HARVEST_COOLDOWN_SECS,
            });
        }
        if u64::from(self.max_slippage_bps) > BPS_DENOMINATOR {
            return Err(VaultError::InvalidConfig(format!(
                "max_slippage_bps {} exceeds {BPS_DENOMINATOR}",
                self.max_slippage_bps
            )));
        }
        self.buckets.validate()?;
        crate::temporal::TemporalAmplifier::new(self.temporal.clone())?;
        Ok(())
    }
}
