use anyhow::Result;
use sled::{Db, Tree};
use std::sync::Arc;

use crate::persistence::StateStorage;

#[derive(Clone)]
pub struct Database {
    _db: Arc<Db>,
    // K: slice name, V: serialized slice (json)
    pub persisted_state: Tree,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway database, removed when dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let _db = Arc::new(db);
        Ok(Self {
            persisted_state: _db.open_tree("persisted_state")?,
            _db,
        })
    }
}

impl StateStorage for Database {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.persisted_state.get(key)?.map(|v| v.to_vec()))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.persisted_state.insert(key, value)?;
        self.persisted_state.flush()?;
        Ok(())
    }
}
