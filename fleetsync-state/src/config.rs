use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common_types::UserId;
use crate::util::json::{deserialize_duration_from_ms, serialize_duration_to_ms};

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

/// Configuration of the sync engine
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Period of the incremental update cycle
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub poll_interval: Duration,

    /// User the preferences belong to
    #[serde(default)]
    pub user_id: UserId,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            user_id: UserId::default(),
        }
    }
}
