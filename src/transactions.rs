use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transactions older than this no longer count as pending approvals.
pub const RECENT_TRANSACTION_MS: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInfo {
    pub token_address: Address,
    pub spender: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub block_number: u64,
    /// 1 for success, 0 for revert; absent on pre-Byzantium chains.
    pub status: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub hash: H256,
    pub from: Address,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub approval: Option<ApprovalInfo>,
    pub added_time: i64,
    #[serde(default)]
    pub last_checked_block_number: Option<u64>,
    #[serde(default)]
    pub confirmed_time: Option<i64>,
    #[serde(default)]
    pub receipt: Option<ReceiptSummary>,
}

impl TransactionDetails {
    pub fn is_pending(&self) -> bool {
        self.receipt.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAction {
    Add {
        chain_id: u64,
        hash: H256,
        from: Address,
        approval: Option<ApprovalInfo>,
        summary: Option<String>,
        added_time: i64,
    },
    Checked {
        chain_id: u64,
        hash: H256,
        block_number: u64,
    },
    Finalize {
        chain_id: u64,
        hash: H256,
        receipt: ReceiptSummary,
        confirmed_time: i64,
    },
    ClearAll {
        chain_id: u64,
    },
}

fn hash_key(hash: &H256) -> String {
    format!("{hash:#x}")
}

/// Submitted transactions, by chain id then hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionState(pub BTreeMap<u64, BTreeMap<String, TransactionDetails>>);

impl TransactionState {
    pub fn reduce(&mut self, action: TransactionAction) {
        match action {
            TransactionAction::Add {
                chain_id,
                hash,
                from,
                approval,
                summary,
                added_time,
            } => {
                let txs = self.0.entry(chain_id).or_default();
                let key = hash_key(&hash);
                if txs.contains_key(&key) {
                    tracing::warn!("attempted to add existing transaction {}", key);
                    return;
                }
                txs.insert(
                    key,
                    TransactionDetails {
                        hash,
                        from,
                        summary,
                        approval,
                        added_time,
                        last_checked_block_number: None,
                        confirmed_time: None,
                        receipt: None,
                    },
                );
            }
            TransactionAction::Checked {
                chain_id,
                hash,
                block_number,
            } => {
                if let Some(tx) = self.get_mut(chain_id, &hash) {
                    tx.last_checked_block_number = Some(
                        tx.last_checked_block_number
                            .map_or(block_number, |prev| prev.max(block_number)),
                    );
                }
            }
            TransactionAction::Finalize {
                chain_id,
                hash,
                receipt,
                confirmed_time,
            } => {
                if let Some(tx) = self.get_mut(chain_id, &hash) {
                    tx.receipt = Some(receipt);
                    tx.confirmed_time = Some(confirmed_time);
                }
            }
            TransactionAction::ClearAll { chain_id } => {
                self.0.remove(&chain_id);
            }
        }
    }

    fn get_mut(&mut self, chain_id: u64, hash: &H256) -> Option<&mut TransactionDetails> {
        self.0.get_mut(&chain_id)?.get_mut(&hash_key(hash))
    }

    pub fn get(&self, chain_id: u64, hash: &H256) -> Option<&TransactionDetails> {
        self.0.get(&chain_id)?.get(&hash_key(hash))
    }

    pub fn all(&self, chain_id: u64) -> impl Iterator<Item = &TransactionDetails> {
        self.0.get(&chain_id).into_iter().flat_map(|txs| txs.values())
    }

    pub fn pending(&self, chain_id: u64) -> Vec<H256> {
        self.all(chain_id).filter(|tx| tx.is_pending()).map(|tx| tx.hash).collect()
    }

    /// A recent, unconfirmed approval of `token` for `spender`.
    pub fn has_pending_approval(&self, chain_id: u64, token: Address, spender: Address, now: i64) -> bool {
        self.all(chain_id).any(|tx| {
            tx.is_pending()
                && now - tx.added_time < RECENT_TRANSACTION_MS
                && tx
                    .approval
                    .as_ref()
                    .is_some_and(|a| a.token_address == token && a.spender == spender)
        })
    }
}
