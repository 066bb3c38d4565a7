use ethers::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::amount::CurrencyAmount;
use crate::balances::{BalanceAggregator, BalanceRecord, WalletContext};
use crate::multicall::BatchReader;
use crate::tokens::TokenIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New balances were stored.
    Committed,
    /// A read for the same account and token set is still running.
    InFlight,
    /// The last result is younger than `blocks_per_fetch`.
    Fresh,
    /// The account, chain or token set changed while the read was running.
    Discarded,
    /// The batch failed. The previous record is kept and the next block
    /// retries.
    Failed,
}

const IDLE: u64 = 0;

/// Marks a read as running for one generation and clears the mark when the
/// read ends, including when the refresh future is dropped mid-read.
struct InFlightMark<'a> {
    slot: &'a AtomicU64,
    tag: u64,
}

impl Drop for InFlightMark<'_> {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.tag, IDLE, Ordering::SeqCst, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Watch {
    context: WalletContext,
    tokens: Vec<TokenIdentity>,
    generation: u64,
    fetched_at: Option<u64>,
    balances: BalanceRecord,
}

/// Keeps the token balances of the active account up to date.
///
/// Every change of account, chain or token set starts a new generation and
/// clears the record. A read is tagged with the generation it was issued
/// for, and its result is only committed if that generation is still
/// current, so a slow read for a previous account can never leak into the
/// record of the new one.
pub struct BalanceTracker<R> {
    aggregator: BalanceAggregator<R>,
    blocks_per_fetch: u64,
    watch: Mutex<Watch>,
    // generation + 1 of the running read, or IDLE
    in_flight: AtomicU64,
}

impl<R: BatchReader> BalanceTracker<R> {
    pub fn new(reader: R, blocks_per_fetch: u64) -> Self {
        Self {
            aggregator: BalanceAggregator::new(reader),
            blocks_per_fetch: blocks_per_fetch.max(1),
            watch: Mutex::new(Watch::default()),
            in_flight: AtomicU64::new(IDLE),
        }
    }

    pub fn aggregator(&self) -> &BalanceAggregator<R> {
        &self.aggregator
    }

    pub async fn context(&self) -> WalletContext {
        self.watch.lock().await.context
    }

    /// Points the tracker at a wallet context and token set. Returns whether
    /// anything changed (and the record was reset).
    pub async fn set_watch(&self, context: WalletContext, tokens: Vec<TokenIdentity>) -> bool {
        let mut watch = self.watch.lock().await;
        if watch.context == context && watch.tokens == tokens {
            return false;
        }
        tracing::debug!(
            "balance watch changed: account {:?} chain {:?}, {} token(s)",
            context.account,
            context.chain_id,
            tokens.len()
        );
        watch.context = context;
        watch.tokens = tokens;
        watch.generation += 1;
        self.in_flight.store(IDLE, Ordering::SeqCst);
        watch.fetched_at = None;
        watch.balances.clear();
        true
    }

    pub async fn set_context(&self, context: WalletContext) -> bool {
        let tokens = self.watch.lock().await.tokens.clone();
        self.set_watch(context, tokens).await
    }

    /// Reads balances as of `block` unless a read is already running or the
    /// stored result is still fresh. A failed read leaves the record and its
    /// age untouched.
    pub async fn refresh(&self, block: u64) -> RefreshOutcome {
        let (mark, generation, context, tokens) = {
            let watch = self.watch.lock().await;
            let tag = watch.generation + 1;
            if self.in_flight.load(Ordering::SeqCst) == tag {
                return RefreshOutcome::InFlight;
            }
            if let Some(fetched_at) = watch.fetched_at {
                if block < fetched_at + self.blocks_per_fetch {
                    return RefreshOutcome::Fresh;
                }
            }
            self.in_flight.store(tag, Ordering::SeqCst);
            let mark = InFlightMark {
                slot: &self.in_flight,
                tag,
            };
            (mark, watch.generation, watch.context, watch.tokens.clone())
        };

        let balances = self
            .aggregator
            .resolve_balances_checked(context.account, tokens.iter().map(Some), Some(block))
            .await;

        let mut watch = self.watch.lock().await;
        drop(mark);
        if watch.generation != generation {
            tracing::debug!(
                "discarding balances read at block {} for stale account {:?}",
                block,
                context.account
            );
            return RefreshOutcome::Discarded;
        }
        let Some(balances) = balances else {
            tracing::warn!("balance read at block {} failed; keeping block {:?}", block, watch.fetched_at);
            return RefreshOutcome::Failed;
        };
        watch.fetched_at = Some(block);
        watch.balances = balances;
        RefreshOutcome::Committed
    }

    pub async fn balances(&self) -> BalanceRecord {
        self.watch.lock().await.balances.clone()
    }

    pub async fn token_balance(&self, token: &TokenIdentity) -> Option<CurrencyAmount> {
        let address: Address = token.parsed_address()?;
        self.watch.lock().await.balances.get(&address).cloned()
    }

    /// True until the first read for the current account and tokens lands,
    /// and while a read is running.
    pub async fn is_loading(&self) -> bool {
        let watch = self.watch.lock().await;
        self.in_flight.load(Ordering::SeqCst) == watch.generation + 1 || watch.fetched_at.is_none()
    }
}
