use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::http::Uri;
use crate::util::json::{deserialize_duration_from_ms, serialize_duration_to_ms};

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Remote API configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RemoteConfig {
    /// Base URI of the device backend, without the `/api` prefix. A path
    /// on the URI is kept as a prefix of every request path
    pub api_endpoint: Uri,

    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_endpoint: Uri::from_static("http://localhost:8080"),
            request_timeout: default_request_timeout(),
        }
    }
}
