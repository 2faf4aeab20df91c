//! Generator configuration, read from TOML.
//!
//! ```toml
//! output_dir = "data"
//!
//! [[tokens]]
//! id = 1
//! address = "0x5e6CB7E728E1C320855587E1D9C6F7972ebdD6D5"
//! decimals = 18
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rewards_core::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{StaticTokenRegistry, TokenInfo, DEFAULT_DECIMALS, MAX_DECIMALS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("token id {0} is configured more than once")]
    DuplicateToken(u32),

    #[error("token id {id} has {decimals} decimals, at most {} supported", MAX_DECIMALS)]
    DecimalsTooLarge { id: u32, decimals: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub id: u32,
    pub address: Address,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Directory tree data files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Token registry: quest-store token id to on-chain token
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tokens: Vec::new(),
        }
    }
}

impl RewardsConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = BTreeSet::new();
        for token in &self.tokens {
            if !ids.insert(token.id) {
                return Err(ConfigError::DuplicateToken(token.id));
            }
            if token.decimals > MAX_DECIMALS {
                return Err(ConfigError::DecimalsTooLarge {
                    id: token.id,
                    decimals: token.decimals,
                });
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> StaticTokenRegistry {
        self.tokens
            .iter()
            .fold(StaticTokenRegistry::new(), |registry, t| {
                registry.with_token(
                    t.id,
                    TokenInfo {
                        address: t.address,
                        decimals: t.decimals,
                    },
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TokenRegistry;

    #[test]
    fn test_parse_config() {
        let config = RewardsConfig::from_toml(
            r#"
            output_dir = "out"

            [[tokens]]
            id = 1
            address = "0x5e6CB7E728E1C320855587E1D9C6F7972ebdD6D5"

            [[tokens]]
            id = 2
            address = "0x1111111111111111111111111111111111111111"
            decimals = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        let registry = config.registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve(1).unwrap().decimals, 18);
        assert_eq!(registry.resolve(2).unwrap().decimals, 6);
        assert!(registry.resolve(3).is_none());
    }

    #[test]
    fn test_defaults() {
        let config = RewardsConfig::from_toml("").unwrap();
        assert_eq!(config, RewardsConfig::default());
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let err = RewardsConfig::from_toml(
            r#"
            [[tokens]]
            id = 1
            address = "0x1111111111111111111111111111111111111111"
            [[tokens]]
            id = 1
            address = "0x2222222222222222222222222222222222222222"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateToken(1)));
    }

    #[test]
    fn test_bad_address_and_decimals() {
        let err = RewardsConfig::from_toml(
            r#"
            [[tokens]]
            id = 1
            address = "0x1234"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));

        let err = RewardsConfig::from_toml(
            r#"
            [[tokens]]
            id = 1
            address = "0x1111111111111111111111111111111111111111"
            decimals = 40
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DecimalsTooLarge { id: 1, decimals: 40 }));
    }
}
