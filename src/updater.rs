use anyhow::Result;
use ethers::providers::Middleware;
use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::multicall::BatchReader;
use crate::store::{AppAction, Store};
use crate::tracker::{BalanceTracker, RefreshOutcome};
use crate::transactions::{ReceiptSummary, TransactionAction};

/// Checks every pending transaction once and records receipts that landed.
pub async fn check_pending_transactions<M: Middleware>(
    client: &M,
    store: &Store,
    chain_id: u64,
    block_number: u64,
) {
    let pending: Vec<H256> = store.with_state(|s| s.transactions.pending(chain_id));
    if pending.is_empty() {
        return;
    }

    let lookups = pending.iter().map(|hash| client.get_transaction_receipt(*hash));
    let receipts = futures::future::join_all(lookups).await;

    for (hash, receipt) in pending.into_iter().zip(receipts) {
        match receipt {
            Ok(Some(receipt)) => {
                let status = receipt.status.map(|s| s.as_u64());
                tracing::info!("transaction {:#x} confirmed (status {:?})", hash, status);
                store.dispatch(TransactionAction::Finalize {
                    chain_id,
                    hash,
                    receipt: ReceiptSummary {
                        block_number: receipt.block_number.map_or(block_number, |b| b.as_u64()),
                        status,
                    },
                    confirmed_time: chrono::Utc::now().timestamp_millis(),
                });
            }
            Ok(None) => store.dispatch(TransactionAction::Checked {
                chain_id,
                hash,
                block_number,
            }),
            Err(e) => tracing::warn!("receipt lookup for {:#x} failed: {}", hash, e),
        }
    }
}

/// One updater tick: records the chain head, refreshes balances as of the
/// latest block the store has seen and checks pending transactions.
pub async fn poll_once<M, R>(client: &M, store: &Store, tracker: &BalanceTracker<R>, chain_id: u64) -> Result<RefreshOutcome>
where
    M: Middleware + 'static,
    R: BatchReader,
{
    let head = client.get_block_number().await?.as_u64();
    store.dispatch(AppAction::UpdateBlockNumber {
        chain_id,
        block_number: head,
    });
    let block_number = store
        .with_state(|s| s.application.block_number(chain_id))
        .unwrap_or(head);

    let outcome = tracker.refresh(block_number).await;
    match outcome {
        RefreshOutcome::Committed => tracing::debug!("balances updated at block {}", block_number),
        outcome => tracing::trace!("balance refresh at block {}: {:?}", block_number, outcome),
    }
    check_pending_transactions(client, store, chain_id, block_number).await;
    Ok(outcome)
}

/// Polls the chain head every `poll_interval`. RPC failures are logged and
/// retried on the next tick.
pub async fn run_updater<M, R>(
    client: Arc<M>,
    store: Store,
    tracker: Arc<BalanceTracker<R>>,
    chain_id: u64,
    poll_interval: Duration,
) -> Result<()>
where
    M: Middleware + 'static,
    R: BatchReader,
{
    tracing::info!("👂 Polling chain {} every {:?}", chain_id, poll_interval);
    loop {
        if let Err(e) = poll_once(client.as_ref(), &store, &tracker, chain_id).await {
            tracing::error!("failed to get latest block number: {}", e);
        }
        sleep(poll_interval).await;
    }
}
