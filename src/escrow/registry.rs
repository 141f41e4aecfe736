//! Position Registry Facade
//!
//! Assigns a display identity (owner, token metadata) to each derivative for a
//! fungible-token style view. Not load-bearing: the engine calls the hooks but
//! a failing hook never blocks a transition.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::types::{DerivativeId, Identity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyRegistered { id: DerivativeId },
    UnknownPosition { id: DerivativeId },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyRegistered { id } => {
                write!(f, "position {} already registered", id)
            }
            RegistryError::UnknownPosition { id } => write!(f, "position {} not registered", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Hooks the engine calls on mint and on close (cancel or settlement).
pub trait PositionRegistry: Send + Sync {
    fn on_mint(&self, id: DerivativeId, maker: &Identity) -> Result<(), RegistryError>;
    fn on_close(&self, id: DerivativeId) -> Result<(), RegistryError>;
}

/// Token metadata exposed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_name() -> String {
    "BTCFees by gastoken.io".to_string()
}

fn default_symbol() -> String {
    "BTCF".to_string()
}

fn default_decimals() -> u8 {
    2
}

impl Default for RegistryMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            symbol: default_symbol(),
            decimals: default_decimals(),
        }
    }
}

#[derive(Debug, Clone)]
struct PositionEntry {
    owner: Identity,
    active: bool,
}

/// In-memory registry. Supply counts every position ever minted.
#[derive(Debug, Default)]
pub struct InMemoryPositionRegistry {
    metadata: RegistryMetadata,
    positions: RwLock<HashMap<DerivativeId, PositionEntry>>,
}

impl InMemoryPositionRegistry {
    pub fn new(metadata: RegistryMetadata) -> Self {
        Self {
            metadata,
            positions: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    pub fn total_supply(&self) -> u64 {
        self.positions.read().len() as u64
    }

    pub fn active_count(&self) -> u64 {
        self.positions.read().values().filter(|p| p.active).count() as u64
    }

    pub fn owner_of(&self, id: DerivativeId) -> Option<Identity> {
        self.positions.read().get(&id).map(|p| p.owner.clone())
    }

    pub fn is_active(&self, id: DerivativeId) -> bool {
        self.positions
            .read()
            .get(&id)
            .map(|p| p.active)
            .unwrap_or(false)
    }
}

impl PositionRegistry for InMemoryPositionRegistry {
    fn on_mint(&self, id: DerivativeId, maker: &Identity) -> Result<(), RegistryError> {
        let mut positions = self.positions.write();
        if positions.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { id });
        }
        positions.insert(
            id,
            PositionEntry {
                owner: maker.clone(),
                active: true,
            },
        );
        Ok(())
    }

    fn on_close(&self, id: DerivativeId) -> Result<(), RegistryError> {
        let mut positions = self.positions.write();
        let entry = positions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownPosition { id })?;
        entry.active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_metadata() {
        let registry = InMemoryPositionRegistry::new(RegistryMetadata::default());
        assert_eq!(registry.name(), "BTCFees by gastoken.io");
        assert_eq!(registry.symbol(), "BTCF");
        assert_eq!(registry.decimals(), 2);
    }

    #[test]
    fn test_mint_increases_supply_and_close_deactivates() {
        let registry = InMemoryPositionRegistry::default();
        let maker = Identity::from("maker");
        registry.on_mint(0, &maker).unwrap();
        registry.on_mint(1, &maker).unwrap();
        assert_eq!(registry.total_supply(), 2);
        assert_eq!(registry.owner_of(1), Some(maker));

        registry.on_close(0).unwrap();
        assert!(!registry.is_active(0));
        assert!(registry.is_active(1));
        assert_eq!(registry.total_supply(), 2);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_hook_errors() {
        let registry = InMemoryPositionRegistry::default();
        assert_eq!(
            registry.on_close(5),
            Err(RegistryError::UnknownPosition { id: 5 })
        );
        registry.on_mint(5, &Identity::from("m")).unwrap();
        assert_eq!(
            registry.on_mint(5, &Identity::from("m")),
            Err(RegistryError::AlreadyRegistered { id: 5 })
        );
    }
}
