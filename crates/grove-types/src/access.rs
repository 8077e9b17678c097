//! Capability checks for administrative surfaces.
//!
//! Each component owns an [`AccessControl`] and passes the caller's address
//! explicitly into every gated operation. The administrator implicitly
//! holds every [`Role`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AccessError, Address};

/// Capabilities that can be granted to non-admin addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May harvest a vault regardless of the cooldown.
    Keeper,
    /// May trigger payouts from a secondary pool.
    Distributor,
    /// May deliver swap-fee attributions.
    FeeReporter,
    /// May call `route_yield` on a router.
    YieldRouting,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Keeper => "keeper",
            Role::Distributor => "distributor",
            Role::FeeReporter => "fee-reporter",
            Role::YieldRouting => "yield-routing",
        };
        f.write_str(name)
    }
}

/// Administrator plus per-role grant sets.
#[derive(Clone, Debug)]
pub struct AccessControl {
    admin: Address,
    grants: HashMap<Role, HashSet<Address>>,
}

impl AccessControl {
    /// Create a control surface administered by `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            grants: HashMap::new(),
        }
    }

    /// The current administrator.
    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Whether `who` is the administrator.
    pub fn is_admin(&self, who: Address) -> bool {
        !who.is_zero() && who == self.admin
    }

    /// Whether `who` holds `role` (directly or as administrator).
    pub fn has_role(&self, role: Role, who: Address) -> bool {
        self.is_admin(who)
            || self
                .grants
                .get(&role)
                .is_some_and(|holders| holders.contains(&who))
    }

    /// # Errors
    ///
    /// - [`AccessError::NotAdmin`] unless `caller` is the administrator
    pub fn ensure_admin(&self, caller: Address) -> Result<(), AccessError> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(AccessError::NotAdmin { caller })
        }
    }

    /// # Errors
    ///
    /// - [`AccessError::MissingRole`] unless `caller` holds `role`
    pub fn ensure_role(&self, role: Role, caller: Address) -> Result<(), AccessError> {
        if self.has_role(role, caller) {
            Ok(())
        } else {
            Err(AccessError::MissingRole { caller, role })
        }
    }

    /// Grant `role` to `who`. Admin only.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NotAdmin`] unless `caller` is the administrator
    /// - [`AccessError::ZeroAddress`] if `who` is the null address
    pub fn grant(&mut self, caller: Address, role: Role, who: Address) -> Result<(), AccessError> {
        self.ensure_admin(caller)?;
        if who.is_zero() {
            return Err(AccessError::ZeroAddress);
        }
        self.grants.entry(role).or_default().insert(who);
        tracing::info!(%role, %who, "capability granted");
        Ok(())
    }

    /// Revoke `role` from `who`. Admin only. Returns whether it was held.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NotAdmin`] unless `caller` is the administrator
    pub fn revoke(
        &mut self,
        caller: Address,
        role: Role,
        who: Address,
    ) -> Result<bool, AccessError> {
        self.ensure_admin(caller)?;
        let removed = self
            .grants
            .get_mut(&role)
            .is_some_and(|holders| holders.remove(&who));
        if removed {
            tracing::info!(%role, %who, "capability revoked");
        }
        Ok(removed)
    }

    /// Hand administration to `new_admin`. Admin only.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NotAdmin`] unless `caller` is the administrator
    /// - [`AccessError::ZeroAddress`] if `new_admin` is the null address
    pub fn transfer_admin(
        &mut self,
        caller: Address,
        new_admin: Address,
    ) -> Result<(), AccessError> {
        self.ensure_admin(caller)?;
        if new_admin.is_zero() {
            return Err(AccessError::ZeroAddress);
        }
        tracing::warn!(from = %self.admin, to = %new_admin, "administrator transferred");
        self.admin = new_admin;
        Ok(())
    }
}
