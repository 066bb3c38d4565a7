use ethers::types::Address;
use std::collections::BTreeMap;

use crate::address::is_address;
use crate::amount::CurrencyAmount;
use crate::multicall::{BatchReader, BatchRequest, CallState};
use crate::tokens::{Currency, TokenIdentity};

/// Resolved balances keyed by account (native) or token contract (ERC-20).
/// A missing key means unresolved or failed, never zero.
pub type BalanceRecord = BTreeMap<Address, CurrencyAmount>;

/// The wallet/network the UI is currently connected to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletContext {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
}

/// Drops tokens with invalid addresses and duplicates, ordered by address so
/// the same set always produces the same batch.
pub fn validated_tokens<'a, I>(tokens: I) -> Vec<(Address, TokenIdentity)>
where
    I: IntoIterator<Item = Option<&'a TokenIdentity>>,
{
    let mut by_address: BTreeMap<Address, TokenIdentity> = BTreeMap::new();
    for token in tokens.into_iter().flatten() {
        match token.parsed_address() {
            Some(address) => {
                by_address.entry(address).or_insert_with(|| token.clone());
            }
            None => tracing::debug!("dropping token {} with invalid address {:?}", token.symbol, token.address),
        }
    }
    by_address.into_iter().collect()
}

/// Parses, deduplicates and sorts raw account addresses.
pub fn validated_addresses<'a, I>(unchecked: I) -> Vec<Address>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut addresses: Vec<Address> = unchecked.into_iter().flatten().filter_map(is_address).collect();
    addresses.sort();
    addresses.dedup();
    addresses
}

/// Maps index-aligned call results back onto their keys. A result vector of
/// the wrong length cannot be trusted and counts as a failed batch.
fn merge_results<F>(keys: &[Address], results: &[CallState], mut amount_for: F) -> Option<BalanceRecord>
where
    F: FnMut(usize, ethers::types::U256) -> Option<CurrencyAmount>,
{
    if keys.len() != results.len() {
        tracing::warn!(
            "batch returned {} results for {} calls; discarding",
            results.len(),
            keys.len()
        );
        return None;
    }

    Some(
        keys.iter()
            .zip(results)
            .enumerate()
            .filter_map(|(i, (key, state))| {
                let value = state.value()?;
                amount_for(i, value).map(|amount| (*key, amount))
            })
            .collect(),
    )
}

/// Turns lists of tokens/accounts into one batched read and a keyed record.
pub struct BalanceAggregator<R> {
    reader: R,
}

impl<R: BatchReader> BalanceAggregator<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    async fn read(&self, request: &BatchRequest, block: Option<u64>) -> Option<Vec<CallState>> {
        match self.reader.read(request, block).await {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!("{} read failed: {}", request.method(), e);
                None
            }
        }
    }

    /// ERC-20 balances of `owner` for every valid token. Issues at most one
    /// batched read; nothing is read without an owner or a valid token.
    pub async fn resolve_balances<'a, I>(
        &self,
        owner: Option<Address>,
        tokens: I,
        block: Option<u64>,
    ) -> BalanceRecord
    where
        I: IntoIterator<Item = Option<&'a TokenIdentity>>,
    {
        self.resolve_balances_checked(owner, tokens, block)
            .await
            .unwrap_or_default()
    }

    /// Like [`resolve_balances`](Self::resolve_balances), but a failed or
    /// misaligned batch gives `None` instead of an empty record.
    pub async fn resolve_balances_checked<'a, I>(
        &self,
        owner: Option<Address>,
        tokens: I,
        block: Option<u64>,
    ) -> Option<BalanceRecord>
    where
        I: IntoIterator<Item = Option<&'a TokenIdentity>>,
    {
        let Some(owner) = owner else {
            return Some(BalanceRecord::new());
        };
        let validated = validated_tokens(tokens);
        if validated.is_empty() {
            return Some(BalanceRecord::new());
        }

        let keys: Vec<Address> = validated.iter().map(|(address, _)| *address).collect();
        let request = BatchRequest::TokenBalances {
            owner,
            tokens: keys.clone(),
        };
        let results = self.read(&request, block).await?;

        merge_results(&keys, &results, |i, value| {
            Some(CurrencyAmount::from_raw(Currency::Token(validated[i].1.clone()), value))
        })
    }

    /// Native balances for every valid account. Without a chain id there is
    /// no currency to attach, so nothing is returned.
    pub async fn resolve_native_balances<'a, I>(
        &self,
        chain_id: Option<u64>,
        unchecked: I,
        block: Option<u64>,
    ) -> BalanceRecord
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let accounts = validated_addresses(unchecked);
        if accounts.is_empty() {
            return BalanceRecord::new();
        }

        let request = BatchRequest::EthBalances {
            accounts: accounts.clone(),
        };
        let Some(results) = self.read(&request, block).await else {
            return BalanceRecord::new();
        };

        merge_results(&accounts, &results, |_, value| {
            chain_id.map(|chain_id| CurrencyAmount::from_raw(Currency::Native { chain_id }, value))
        })
        .unwrap_or_default()
    }

    /// Balance of a single token for a single account.
    pub async fn token_balance(&self, owner: Option<Address>, token: Option<&TokenIdentity>) -> Option<CurrencyAmount> {
        let token = token?;
        let address = token.parsed_address()?;
        self.resolve_balances(owner, [Some(token)], None).await.remove(&address)
    }
}
