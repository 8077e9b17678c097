//! Keeper configuration file.
//!
//! Read from the TOML file named by `GROVE_CONFIG`, or `grove.toml` in the
//! working directory. A missing file means defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use grove_competition::CompetitionConfig;
use grove_types::{Address, ProjectId};
use grove_vault::{Bucket, DistributionBuckets, VaultConfig};

use crate::deployment::{CASCADE_POOL, PUBLIC_GOODS, TREASURY};

/// Complete keeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Loop settings.
    #[serde(default)]
    pub keeper: KeeperSettings,
    /// Simulated participants.
    #[serde(default)]
    pub deployment: DeploymentConfig,
    /// The vault.
    #[serde(default = "default_vault")]
    pub vault: VaultConfig,
    /// The vault's router policy.
    #[serde(default = "default_router")]
    pub router: RouterConfig,
    /// Projects registered with the cascade pool.
    #[serde(default = "default_projects")]
    pub projects: Vec<ProjectConfig>,
    /// The competition pool.
    #[serde(default)]
    pub competition: CompetitionConfig,
}

/// Loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSettings {
    /// Seconds between rounds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Rounds to run. 0 = until Ctrl-C.
    #[serde(default)]
    pub rounds: u64,
    /// Log level for grove crates: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Simulated lending-market yield per round, in bps of principal.
    #[serde(default = "default_yield_bps")]
    pub simulated_yield_bps_per_round: u16,
    /// RNG seed for reproducible runs. Unset = OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Simulated participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Number of depositors.
    #[serde(default = "default_depositors")]
    pub depositors: u64,
    /// Deposit per depositor.
    #[serde(default = "default_initial_deposit")]
    pub initial_deposit: u64,
    /// Project whose cascade is triggered from the pool balance each round.
    #[serde(default = "default_cascade_project")]
    pub cascade_project: Option<ProjectId>,
    /// Largest simulated swap per round.
    #[serde(default = "default_max_swap")]
    pub max_swap_amount: u64,
    /// Rounds per competition slot before a winner is declared.
    #[serde(default = "default_slot_rounds")]
    pub slot_rounds: u64,
}

/// Router allocation policy for the vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Policy recipients. Empty = no policy, bucket recipient gets everything.
    #[serde(default)]
    pub recipients: Vec<Address>,
    /// Weights in bps, summing to 10000.
    #[serde(default)]
    pub weights_bps: Vec<u16>,
}

/// A cascade-pool project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project id.
    pub id: ProjectId,
    /// Where primary and dependency payouts are sent.
    pub funding_address: Address,
    /// Projects that share in this project's cascades.
    #[serde(default)]
    pub dependencies: Vec<ProjectId>,
    /// Cascade share of the primary payout, at most 5000.
    #[serde(default)]
    pub cascade_multiplier_bps: u16,
}

// Default value functions

fn default_tick_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_yield_bps() -> u16 {
    10
}

fn default_depositors() -> u64 {
    3
}

fn default_initial_deposit() -> u64 {
    1_000_000
}

fn default_cascade_project() -> Option<ProjectId> {
    Some(1)
}

fn default_max_swap() -> u64 {
    50_000
}

fn default_slot_rounds() -> u64 {
    10
}

fn default_vault() -> VaultConfig {
    VaultConfig {
        buckets: DistributionBuckets {
            public_goods: Bucket {
                recipient: PUBLIC_GOODS,
                share_bps: 5_000,
            },
            cascade: Bucket {
                recipient: CASCADE_POOL,
                share_bps: 3_000,
            },
            treasury: Bucket {
                recipient: TREASURY,
                share_bps: 2_000,
            },
            ..DistributionBuckets::default()
        },
        ..VaultConfig::default()
    }
}

fn default_router() -> RouterConfig {
    RouterConfig {
        recipients: vec![Address::from_low_u64(0x5001), Address::from_low_u64(0x5002)],
        weights_bps: vec![6_000, 4_000],
    }
}

fn default_projects() -> Vec<ProjectConfig> {
    vec![
        ProjectConfig {
            id: 1,
            funding_address: Address::from_low_u64(0x6001),
            dependencies: vec![2, 3],
            cascade_multiplier_bps: 2_000,
        },
        ProjectConfig {
            id: 2,
            funding_address: Address::from_low_u64(0x6002),
            dependencies: Vec::new(),
            cascade_multiplier_bps: 1_000,
        },
        ProjectConfig {
            id: 3,
            funding_address: Address::from_low_u64(0x6003),
            dependencies: vec![2],
            cascade_multiplier_bps: 0,
        },
    ]
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            keeper: KeeperSettings::default(),
            deployment: DeploymentConfig::default(),
            vault: default_vault(),
            router: default_router(),
            projects: default_projects(),
            competition: CompetitionConfig::default(),
        }
    }
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            rounds: 0,
            log_level: default_log_level(),
            simulated_yield_bps_per_round: default_yield_bps(),
            seed: None,
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            depositors: default_depositors(),
            initial_deposit: default_initial_deposit(),
            cascade_project: default_cascade_project(),
            max_swap_amount: default_max_swap(),
            slot_rounds: default_slot_rounds(),
        }
    }
}

impl KeeperConfig {
    /// Load configuration from the config file.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: KeeperConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> PathBuf {
        std::env::var("GROVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("grove.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KeeperConfig::default();
        assert_eq!(config.keeper.tick_secs, 5);
        assert_eq!(config.keeper.rounds, 0);
        assert_eq!(config.competition.fee_bps, 30);
        assert_eq!(config.vault.buckets.total_bps(), 10_000);
        config.vault.validate().expect("default vault config is valid");
    }

    #[test]
    fn test_config_serialization() {
        let config = KeeperConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: KeeperConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.vault, config.vault);
        assert_eq!(parsed.projects.len(), 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: KeeperConfig = toml::from_str(
            r#"
            [keeper]
            rounds = 4
            seed = 7

            [[projects]]
            id = 9
            funding_address = "0x0000000000000000000000000000000000000009"
            "#,
        )
        .expect("parse");
        assert_eq!(parsed.keeper.rounds, 4);
        assert_eq!(parsed.keeper.seed, Some(7));
        assert_eq!(parsed.keeper.tick_secs, 5);
        assert_eq!(parsed.projects.len(), 1);
        assert_eq!(parsed.projects[0].cascade_multiplier_bps, 0);
        assert_eq!(parsed.router.weights_bps, vec![6_000, 4_000]);
    }
}
