use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::contract::Multicall;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockNumber, U256};
use std::sync::Arc;

use crate::contracts::Erc20;

/// Multicall3, deployed at the same address on every supported chain.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// One batched read. Results come back index-aligned with `targets`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BatchRequest {
    /// `balanceOf(owner)` on every token contract.
    TokenBalances { owner: Address, tokens: Vec<Address> },
    /// `getEthBalance(account)` on the multicall contract for every account.
    EthBalances { accounts: Vec<Address> },
}

impl BatchRequest {
    pub fn targets(&self) -> &[Address] {
        match self {
            BatchRequest::TokenBalances { tokens, .. } => tokens,
            BatchRequest::EthBalances { accounts } => accounts,
        }
    }

    pub fn len(&self) -> usize {
        self.targets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets().is_empty()
    }

    pub fn method(&self) -> &'static str {
        match self {
            BatchRequest::TokenBalances { .. } => "balanceOf",
            BatchRequest::EthBalances { .. } => "getEthBalance",
        }
    }
}

/// Outcome of a single call inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Failed,
    Resolved(U256),
}

impl CallState {
    pub fn value(&self) -> Option<U256> {
        match self {
            CallState::Resolved(value) => Some(*value),
            _ => None,
        }
    }
}

/// The batching channel balances are read through.
#[async_trait]
pub trait BatchReader: Send + Sync {
    /// Issues one batched read. The returned vector must have one entry per
    /// request target, in order.
    async fn read(&self, request: &BatchRequest, block: Option<u64>) -> Result<Vec<CallState>>;
}

#[async_trait]
impl<T: BatchReader + ?Sized> BatchReader for Arc<T> {
    async fn read(&self, request: &BatchRequest, block: Option<u64>) -> Result<Vec<CallState>> {
        (**self).read(request, block).await
    }
}

/// `BatchReader` backed by an on-chain Multicall3 contract.
pub struct EthersBatchReader<M> {
    client: Arc<M>,
    multicall_address: Address,
}

impl<M: Middleware + 'static> EthersBatchReader<M> {
    pub fn new(client: Arc<M>, multicall_address: Address) -> Self {
        Self {
            client,
            multicall_address,
        }
    }

    async fn multicall(&self, block: Option<u64>) -> Result<Multicall<M>> {
        let multicall = Multicall::new(Arc::clone(&self.client), Some(self.multicall_address))
            .await
            .map_err(|e| anyhow!("multicall setup failed: {e}"))?;
        Ok(match block {
            Some(number) => multicall.block(BlockNumber::Number(number.into())),
            None => multicall,
        })
    }
}

#[async_trait]
impl<M: Middleware + 'static> BatchReader for EthersBatchReader<M> {
    async fn read(&self, request: &BatchRequest, block: Option<u64>) -> Result<Vec<CallState>> {
        if request.is_empty() {
            return Ok(Vec::new());
        }

        let mut multicall = self.multicall(block).await?;
        match request {
            BatchRequest::TokenBalances { owner, tokens } => {
                for token in tokens {
                    let contract = Erc20::new(*token, Arc::clone(&self.client));
                    multicall.add_call(contract.balance_of(*owner), true);
                }
            }
            BatchRequest::EthBalances { accounts } => {
                for account in accounts {
                    multicall.add_get_eth_balance(*account, true);
                }
            }
        }

        let raw = multicall
            .call_raw()
            .await
            .map_err(|e| anyhow!("{} batch of {} failed: {e}", request.method(), request.len()))?;

        Ok(raw
            .into_iter()
            .map(|result| match result {
                Ok(Token::Uint(value)) => CallState::Resolved(value),
                _ => CallState::Failed,
            })
            .collect())
    }
}
