//! Engine configuration
//!
//! Oracle fee, trusted gateway identity, payoff policy and registry metadata.
//! Loaded from TOML; every field has a default so a partial file is valid.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::escrow::payoff::PayoffRule;
use crate::escrow::registry::RegistryMetadata;
use crate::escrow::types::{Amount, Identity};

/// Escrow engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fee paid to the oracle gateway per settle attempt (smallest unit)
    #[serde(default = "default_oracle_fee")]
    pub oracle_fee: u64,

    /// The only identity allowed to deliver oracle callbacks
    #[serde(default = "default_oracle_identity")]
    pub oracle_identity: Identity,

    /// Buffer size of the broadcast notification channel
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Comparison direction and failure fee allocation
    #[serde(default)]
    pub payoff: PayoffRule,

    /// Position registry metadata
    #[serde(default)]
    pub registry: RegistryMetadata,
}

fn default_oracle_fee() -> u64 {
    7_500_000_000_000_000
}

fn default_oracle_identity() -> Identity {
    Identity::from("oracle-gateway")
}

fn default_notification_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oracle_fee: default_oracle_fee(),
            oracle_identity: default_oracle_identity(),
            notification_capacity: default_notification_capacity(),
            payoff: PayoffRule::default(),
            registry: RegistryMetadata::default(),
        }
    }
}

impl EngineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing engine config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path = std::env::var("ESCROW_CONFIG_PATH")
            .unwrap_or_else(|_| "escrow_config.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default escrow config ({}): {:#}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.oracle_fee == 0 {
            bail!("oracle_fee must be positive");
        }
        if self.oracle_identity.as_str().is_empty() {
            bail!("oracle_identity must not be empty");
        }
        if self.notification_capacity == 0 {
            bail!("notification_capacity must be positive");
        }
        Ok(())
    }

    #[inline]
    pub fn oracle_fee_amount(&self) -> Amount {
        self.oracle_fee as Amount
    }
}
