use serde::{Deserialize, Serialize};

use crate::api::LocalAddress;
use crate::cli::Cli;
use crate::remote::RemoteConfig;
use crate::state::SyncConfig;
use crate::util::config::StoredConfig;

/// Daemon configuration persisted between runs
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DaemonConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_api_address: Option<LocalAddress>,
}

impl StoredConfig for DaemonConfig {
    fn kind() -> &'static str {
        "fleetsync"
    }
}

impl DaemonConfig {
    /// Apply command line overrides on top of this config
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(api_endpoint) = &cli.api_endpoint {
            self.remote.api_endpoint = api_endpoint.clone();
        }
        if let Some(timeout) = cli.request_timeout {
            self.remote.request_timeout = timeout;
        }
        if let Some(user_id) = &cli.user_id {
            self.sync.user_id = user_id.clone();
        }
        if let Some(interval) = cli.poll_interval {
            self.sync.poll_interval = interval;
        }
        if let Some(address) = &cli.local_api_address {
            self.local_api_address = Some(address.clone());
        }
        self
    }
}
