//! Token registry: maps the quest store's token ids to on-chain tokens.

use std::collections::BTreeMap;

use rewards_core::{Address, U256};

/// Largest supported `decimals`; keeps `u64 points * 10^decimals` inside U256.
pub const MAX_DECIMALS: u8 = 36;

/// Default token precision (ERC-20 convention).
pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
}

impl TokenInfo {
    /// Smallest units per whole quest point.
    pub fn unit(&self) -> U256 {
        U256::exp10(usize::from(self.decimals.min(MAX_DECIMALS)))
    }
}

pub trait TokenRegistry {
    fn resolve(&self, token_id: u32) -> Option<TokenInfo>;
}

/// Registry backed by a fixed table, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenRegistry {
    tokens: BTreeMap<u32, TokenInfo>,
}

impl StaticTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token_id: u32, info: TokenInfo) -> Self {
        self.tokens.insert(token_id, info);
        self
    }

    pub fn insert(&mut self, token_id: u32, info: TokenInfo) -> Option<TokenInfo> {
        self.tokens.insert(token_id, info)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenRegistry for StaticTokenRegistry {
    fn resolve(&self, token_id: u32) -> Option<TokenInfo> {
        self.tokens.get(&token_id).copied()
    }
}
