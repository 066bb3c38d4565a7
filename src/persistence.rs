use anyhow::Result;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::store::{AppState, Store};
use crate::transactions::TransactionState;
use crate::user::UserState;

pub const USER_KEY: &str = "user";
pub const TRANSACTIONS_KEY: &str = "transactions";

/// The only slices that are written to storage.
pub const PERSISTED_KEYS: [&str; 2] = [USER_KEY, TRANSACTIONS_KEY];

/// Opaque key/value storage for serialized slices.
pub trait StateStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, key: &str, value: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub user: UserState,
    pub transactions: TransactionState,
}

fn load_slice<T: DeserializeOwned + Default>(storage: &dyn StateStorage, key: &str) -> T {
    let bytes = match storage.read(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return T::default(),
        Err(e) => {
            tracing::warn!("could not read persisted {}: {}; using defaults", key, e);
            return T::default();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        tracing::warn!("persisted {} is corrupt: {}; using defaults", key, e);
        T::default()
    })
}

/// Restores the whitelisted slices. Never fails: anything missing or
/// unreadable falls back to that slice's default.
pub fn load_persisted(storage: &dyn StateStorage) -> PersistedState {
    PersistedState {
        user: load_slice(storage, USER_KEY),
        transactions: load_slice(storage, TRANSACTIONS_KEY),
    }
}

/// Serializes the whitelisted slices of `state`, one entry per key.
pub fn snapshot(state: &AppState) -> Result<Vec<(&'static str, Vec<u8>)>> {
    Ok(vec![
        (USER_KEY, serde_json::to_vec(&state.user)?),
        (TRANSACTIONS_KEY, serde_json::to_vec(&state.transactions)?),
    ])
}

fn save(storage: &dyn StateStorage, state: &AppState) {
    let entries = match snapshot(state) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("failed to serialize state: {}", e);
            return;
        }
    };
    for (key, bytes) in entries {
        if let Err(e) = storage.write(key, &bytes) {
            tracing::error!("failed to persist {}: {}", key, e);
        }
    }
}

/// Writes the whitelisted slices back to storage after every burst of
/// changes. Each change restarts the `debounce` timer, so a burst produces a
/// single write of the latest state. The task ends (after a final write of
/// any pending change) once every handle to the store is dropped.
pub fn spawn_saver(store: &Store, storage: Arc<dyn StateStorage>, debounce: Duration) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            if rx.changed().await.is_err() {
                break;
            }

            let mut closed = false;
            loop {
                tokio::select! {
                    _ = sleep(debounce) => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            closed = true;
                            break;
                        }
                    }
                }
            }

            let state = rx.borrow_and_update().clone();
            save(storage.as_ref(), &state);
            tracing::debug!("persisted {:?}", PERSISTED_KEYS);

            if closed {
                break;
            }
        }
    })
}

/// Aborts the tasks still holding store handles, then waits for the saver
/// to write whatever change is pending and exit. Callers must have dropped
/// their own handles first.
pub async fn flush_on_shutdown<T>(holders: impl IntoIterator<Item = JoinHandle<T>>, saver: JoinHandle<()>) -> Result<()> {
    for holder in holders {
        holder.abort();
        let _ = holder.await;
    }
    saver.await?;
    Ok(())
}
