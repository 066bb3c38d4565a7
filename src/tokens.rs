use anyhow::Result;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::address::is_address;

pub const NATIVE_DECIMALS: u8 = 18;
pub const NATIVE_SYMBOL: &str = "ETH";
pub const OVL_SYMBOL: &str = "OVL";

/// An ERC-20 token as listed in the static registry. The address is kept as
/// configured so that a bad registry entry can be filtered out downstream
/// instead of failing the whole list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub chain_id: u64,
    pub address: String,
    pub decimals: u8,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl TokenIdentity {
    pub fn new(chain_id: u64, address: impl Into<String>, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            chain_id,
            address: address.into(),
            decimals,
            symbol: symbol.into(),
            name: None,
        }
    }

    pub fn parsed_address(&self) -> Option<Address> {
        is_address(&self.address)
    }
}

impl PartialEq for TokenIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address.eq_ignore_ascii_case(&other.address)
    }
}

impl Eq for TokenIdentity {}

impl Hash for TokenIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.to_ascii_lowercase().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Currency {
    Native { chain_id: u64 },
    Token(TokenIdentity),
}

impl Currency {
    pub fn decimals(&self) -> u8 {
        match self {
            Currency::Native { .. } => NATIVE_DECIMALS,
            Currency::Token(token) => token.decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Currency::Native { .. } => NATIVE_SYMBOL,
            Currency::Token(token) => &token.symbol,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Currency::Native { .. })
    }

    pub fn as_token(&self) -> Option<&TokenIdentity> {
        match self {
            Currency::Token(token) => Some(token),
            Currency::Native { .. } => None,
        }
    }
}

/// Known tokens keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<u64, Vec<TokenIdentity>>,
}

impl TokenRegistry {
    /// Builds a registry from a flat JSON token list.
    pub fn from_json(json: &str) -> Result<Self> {
        let list: Vec<TokenIdentity> = serde_json::from_str(json)?;
        let mut registry = Self::default();
        for token in list {
            registry.insert(token);
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Adds a token unless an equal one is already listed.
    pub fn insert(&mut self, token: TokenIdentity) {
        let entries = self.tokens.entry(token.chain_id).or_default();
        if !entries.contains(&token) {
            entries.push(token);
        }
    }

    pub fn tokens(&self, chain_id: u64) -> &[TokenIdentity] {
        self.tokens.get(&chain_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_symbol(&self, chain_id: u64, symbol: &str) -> Option<&TokenIdentity> {
        self.tokens(chain_id)
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn ovl(&self, chain_id: u64) -> Option<&TokenIdentity> {
        self.by_symbol(chain_id, OVL_SYMBOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"[
        {"chain_id": 1, "address": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", "decimals": 18, "symbol": "OVL"},
        {"chain_id": 1, "address": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", "decimals": 18, "symbol": "OVL"},
        {"chain_id": 4, "address": "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359", "decimals": 6, "symbol": "USDC", "name": "USD Coin"}
    ]"#;

    #[test]
    fn identities_compare_by_chain_and_address() {
        let a = TokenIdentity::new(1, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", 18, "OVL");
        let b = TokenIdentity::new(1, "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", 6, "X");
        let c = TokenIdentity::new(4, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", 18, "OVL");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn registry_groups_and_deduplicates_by_chain() {
        let registry = TokenRegistry::from_json(LIST).unwrap();
        assert_eq!(registry.tokens(1).len(), 1);
        assert_eq!(registry.ovl(1).unwrap().decimals, 18);
        assert!(registry.ovl(4).is_none());
        assert_eq!(registry.by_symbol(4, "usdc").unwrap().name.as_deref(), Some("USD Coin"));
        assert!(registry.tokens(137).is_empty());
    }

    #[test]
    fn native_currency_uses_ether_precision() {
        let eth = Currency::Native { chain_id: 1 };
        assert_eq!(eth.decimals(), 18);
        assert_eq!(eth.symbol(), "ETH");
        assert!(eth.as_token().is_none());
    }
}
