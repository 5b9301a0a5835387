/*
This module is home to everything related to the device backend that owns
the device records.

It implements the engine's `Remote` interface on top of the backend REST
API: bulk device listing, incremental update envelopes, device, settings
and preference writes, and icon management.
*/

mod client;
mod config;

pub use client::HttpRemote;
pub use config::RemoteConfig;

use fleetsync_state as state;
use fleetsync_util as util;
