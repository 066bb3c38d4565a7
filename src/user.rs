use serde::{Deserialize, Serialize};

/// Per-user preferences that survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// Millisecond timestamp of the last `UpdateVersion` dispatch.
    #[serde(default)]
    pub last_update_version_timestamp: Option<i64>,
    /// Millisecond timestamp of the last change to this slice.
    #[serde(default)]
    pub timestamp: i64,
}

impl UserState {
    pub fn update_version(&mut self, now: i64) {
        self.last_update_version_timestamp = Some(now);
        self.timestamp = now;
    }
}
