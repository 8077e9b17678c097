//! Fee configuration.

use serde::{Deserialize, Serialize};

use grove_types::bps::is_valid_bps;
use grove_types::Address;

use crate::{CompetitionError, Result};

/// Competition pool tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionConfig {
    /// Fee taken from each reported swap, in basis points.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,

    /// Default recipient for swept fees when the pool has no router policy.
    #[serde(default)]
    pub fee_recipient: Address,
}

// Default value functions

fn default_fee_bps() -> u16 {
    30
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            fee_bps: default_fee_bps(),
            fee_recipient: Address::ZERO,
        }
    }
}

impl CompetitionConfig {
    /// # Errors
    ///
    /// - [`CompetitionError::InvalidFee`] above 10000 bps
    pub fn validate(&self) -> Result<()> {
        if !is_valid_bps(u32::from(self.fee_bps)) {
            return Err(CompetitionError::InvalidFee {
                fee_bps: self.fee_bps,
            });
        }
        Ok(())
    }
}
