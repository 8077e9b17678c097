//! Project records and registration rules.

use serde::{Deserialize, Serialize};

use grove_types::bps::apply_bps;
use grove_types::{Address, ProjectId};

use crate::{CascadeError, Result, MAX_CASCADE_MULTIPLIER_BPS, MAX_DEPENDENCIES};

/// A fundable project and its declared dependencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project id.
    pub id: ProjectId,
    /// Where primary and cascade payments go.
    pub funding_address: Address,
    /// Dependency project ids, in registration order.
    pub dependencies: Vec<ProjectId>,
    /// Share of the primary amount spread over dependencies.
    pub cascade_multiplier_bps: u16,
    /// Inactive projects neither trigger nor receive cascades.
    pub active: bool,
}

impl Project {
    /// Validate and build an active project.
    ///
    /// Dependencies may name projects that are not registered yet; they
    /// forfeit their share until they are. Cycles longer than a
    /// self-reference are accepted since cascades never recurse.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::ZeroFundingAddress`]
    /// - [`CascadeError::MultiplierTooHigh`] above 50%
    /// - [`CascadeError::TooManyDependencies`]
    /// - [`CascadeError::SelfDependency`] / [`CascadeError::DuplicateDependency`]
    pub fn new(
        id: ProjectId,
        funding_address: Address,
        dependencies: &[ProjectId],
        cascade_multiplier_bps: u16,
    ) -> Result<Self> {
        if funding_address.is_zero() {
            return Err(CascadeError::ZeroFundingAddress { project: id });
        }
        if cascade_multiplier_bps > MAX_CASCADE_MULTIPLIER_BPS {
            return Err(CascadeError::MultiplierTooHigh {
                multiplier_bps: cascade_multiplier_bps,
                max: MAX_CASCADE_MULTIPLIER_BPS,
            });
        }
        if dependencies.len() > MAX_DEPENDENCIES {
            return Err(CascadeError::TooManyDependencies {
                count: dependencies.len(),
                max: MAX_DEPENDENCIES,
            });
        }
        for (i, &dependency) in dependencies.iter().enumerate() {
            if dependency == id {
                return Err(CascadeError::SelfDependency(id));
            }
            if dependencies[..i].contains(&dependency) {
                return Err(CascadeError::DuplicateDependency {
                    project: id,
                    dependency,
                });
            }
        }

        Ok(Self {
            id,
            funding_address,
            dependencies: dependencies.to_vec(),
            cascade_multiplier_bps,
            active: true,
        })
    }

    /// `primary * multiplier / 10000`.
    pub fn cascade_amount(&self, primary: u64) -> Result<u64> {
        apply_bps(primary, u32::from(self.cascade_multiplier_bps)).ok_or(CascadeError::Overflow)
    }

    /// Equal per-dependency share of `cascade_amount`, rounded down.
    pub fn dependency_share(&self, cascade_amount: u64) -> u64 {
        match self.dependencies.len() {
            0 => 0,
            n => cascade_amount / n as u64,
        }
    }

    /// Whether this project can receive a cascade share.
    pub fn is_payable(&self) -> bool {
        self.active && !self.funding_address.is_zero()
    }
}
