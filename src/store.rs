use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::position::{PositionAction, PositionState, TxnSettings};
use crate::transactions::{TransactionAction, TransactionState};
use crate::user::UserState;

/// Chain-level facts the updater keeps current. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationState {
    pub block_number: BTreeMap<u64, u64>,
}

impl ApplicationState {
    pub fn block_number(&self, chain_id: u64) -> Option<u64> {
        self.block_number.get(&chain_id).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub application: ApplicationState,
    pub user: UserState,
    pub position: PositionState,
    pub transactions: TransactionState,
}

impl AppState {
    /// Fresh state around the slices restored from storage.
    pub fn preloaded(user: UserState, transactions: TransactionState, defaults: &TxnSettings) -> Self {
        Self {
            application: ApplicationState::default(),
            user,
            position: PositionState::new(defaults),
            transactions,
        }
    }

    fn reduce(&mut self, action: AppAction, defaults: &TxnSettings) {
        match action {
            AppAction::UpdateVersion { timestamp } => self.user.update_version(timestamp),
            AppAction::UpdateBlockNumber {
                chain_id,
                block_number,
            } => {
                let current = self.application.block_number.entry(chain_id).or_insert(block_number);
                *current = (*current).max(block_number);
            }
            AppAction::Position(action) => self.position.reduce(action, defaults),
            AppAction::Transaction(action) => self.transactions.reduce(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    UpdateVersion { timestamp: i64 },
    UpdateBlockNumber { chain_id: u64, block_number: u64 },
    Position(PositionAction),
    Transaction(TransactionAction),
}

impl From<PositionAction> for AppAction {
    fn from(action: PositionAction) -> Self {
        AppAction::Position(action)
    }
}

impl From<TransactionAction> for AppAction {
    fn from(action: TransactionAction) -> Self {
        AppAction::Transaction(action)
    }
}

struct Inner {
    state: watch::Sender<AppState>,
    txn_defaults: TxnSettings,
}

/// The single mutable application state. Cheap to clone; every clone sees
/// the same state. Mutation only happens through [`Store::dispatch`].
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    pub fn new(initial: AppState, txn_defaults: TxnSettings) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner { state, txn_defaults }),
        }
    }

    /// Applies an action. Subscribers are only woken when the state actually
    /// changed.
    pub fn dispatch(&self, action: impl Into<AppAction>) {
        let action = action.into();
        tracing::trace!(?action, "dispatch");
        let defaults = &self.inner.txn_defaults;
        self.inner.state.send_if_modified(|state| {
            let before = state.clone();
            state.reduce(action, defaults);
            *state != before
        });
    }

    pub fn state(&self) -> AppState {
        self.inner.state.borrow().clone()
    }

    /// Reads the state without cloning all of it.
    pub fn with_state<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        f(&self.inner.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.inner.state.subscribe()
    }

    pub fn txn_defaults(&self) -> &TxnSettings {
        &self.inner.txn_defaults
    }
}
