use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use std::env;
use std::time::Duration;

use crate::address::is_address;
use crate::multicall::MULTICALL3_ADDRESS;
use crate::position::{TxnSettings, DEFAULT_SLIPPAGE, DEFAULT_TXN_DEADLINE};

#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub account: Option<Address>,
    pub private_key: Option<String>,
    pub market_address: Option<Address>,
    pub multicall_address: Address,
    pub ovl_token_address: Option<String>,
    pub token_list_path: Option<String>,
    pub db_path: String,
    pub blocks_per_fetch: u64,
    pub poll_interval: Duration,
    pub persist_debounce: Duration,
    pub txn_defaults: TxnSettings,
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    is_address(value).ok_or_else(|| anyhow!("{name} is not a valid address: {value}"))
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(v) => v.parse().with_context(|| format!("{key} must be a number, got {v:?}")),
                None => Ok(default),
            }
        };

        Ok(Self {
            rpc_url: get("RPC_URL").ok_or_else(|| anyhow!("RPC_URL must be set"))?,
            account: get("ACCOUNT").map(|v| parse_address("ACCOUNT", &v)).transpose()?,
            private_key: get("PRIVATE_KEY"),
            market_address: get("MARKET_ADDRESS")
                .map(|v| parse_address("MARKET_ADDRESS", &v))
                .transpose()?,
            multicall_address: parse_address(
                "MULTICALL_ADDRESS",
                &get("MULTICALL_ADDRESS").unwrap_or_else(|| MULTICALL3_ADDRESS.to_string()),
            )?,
            ovl_token_address: get("OVL_TOKEN_ADDRESS"),
            token_list_path: get("TOKEN_LIST_PATH"),
            db_path: get("DB_PATH").unwrap_or_else(|| "./db".to_string()),
            blocks_per_fetch: number("BLOCKS_PER_FETCH", 1)?,
            poll_interval: Duration::from_millis(number("POLL_INTERVAL_MS", 12_000)?),
            persist_debounce: Duration::from_millis(number("PERSIST_DEBOUNCE_MS", 1_000)?),
            txn_defaults: TxnSettings {
                slippage: get("DEFAULT_SLIPPAGE").unwrap_or_else(|| DEFAULT_SLIPPAGE.to_string()),
                deadline: get("DEFAULT_TXN_DEADLINE").unwrap_or_else(|| DEFAULT_TXN_DEADLINE.to_string()),
            },
        })
    }
}
