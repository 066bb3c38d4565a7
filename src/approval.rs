use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;

use crate::amount::CurrencyAmount;
use crate::contracts::Erc20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Unknown,
    NotApproved,
    Pending,
    Approved,
}

/// Whether `spender` may already pull `amount`. Native currency never needs
/// an approval.
pub fn approval_state(amount: Option<&CurrencyAmount>, allowance: Option<U256>, pending: bool) -> ApprovalState {
    let Some(amount) = amount else {
        return ApprovalState::Unknown;
    };
    if amount.currency().is_native() {
        return ApprovalState::Approved;
    }
    let Some(allowance) = allowance else {
        return ApprovalState::Unknown;
    };
    if allowance < amount.raw() {
        if pending {
            ApprovalState::Pending
        } else {
            ApprovalState::NotApproved
        }
    } else {
        ApprovalState::Approved
    }
}

/// Sends ERC-20 approvals for one token/spender pair from one signer.
#[async_trait]
pub trait ApprovalSubmitter: Send + Sync {
    fn token(&self) -> Address;
    fn spender(&self) -> Address;
    fn owner(&self) -> Address;
    async fn allowance(&self) -> Result<U256>;
    async fn approve(&self, amount: U256) -> Result<H256>;
}

pub struct Erc20Approver<M> {
    token: Erc20<M>,
    spender: Address,
    owner: Address,
}

impl<M: Middleware + 'static> Erc20Approver<M> {
    pub fn new(client: Arc<M>, token: Address, spender: Address, owner: Address) -> Self {
        Self {
            token: Erc20::new(token, client),
            spender,
            owner,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ApprovalSubmitter for Erc20Approver<M> {
    fn token(&self) -> Address {
        self.token.address()
    }

    fn spender(&self) -> Address {
        self.spender
    }

    fn owner(&self) -> Address {
        self.owner
    }

    async fn allowance(&self) -> Result<U256> {
        self.token
            .allowance(self.owner, self.spender)
            .call()
            .await
            .map_err(|e| anyhow!("allowance read failed: {e}"))
    }

    async fn approve(&self, amount: U256) -> Result<H256> {
        let call = self.token.approve(self.spender, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| anyhow!("approve transaction rejected: {e}"))?;
        Ok(pending.tx_hash())
    }
}
