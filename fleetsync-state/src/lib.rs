mod config;
mod draft;
mod engine;
mod icon;
mod merge;
mod notify;
mod poll;
mod preferences;
mod replica;
mod selection;

#[cfg(test)]
mod testing;

pub mod envelope;
pub mod models;
pub mod path;
pub mod remote;

pub use config::SyncConfig;
pub use draft::CommitError;
pub use engine::Engine;
pub use envelope::{Cursor, DeviceUpdate, EnvelopeError, UpdateEnvelope, decode};
pub use icon::{IconError, IconSource};
pub use merge::{MergeReport, merge};
pub use notify::{Level, Notification};
pub use path::{FieldPath, Selector};
pub use poll::PollOutcome;
pub use preferences::PreferencesError;
pub use remote::{IconAsset, IconUpdate, IconUpload, RawEnvelope, Remote, RemoteError};
pub use replica::Replica;
pub use selection::{Selection, SettingsError};

use fleetsync_util as util;
use fleetsync_util::types as common_types;
