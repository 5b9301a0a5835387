use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::store::{Store, StoreError};

pub trait StoredConfig
where
    Self: Serialize,
    Self: DeserializeOwned,
{
    fn kind() -> &'static str;

    /// This config's preferred file name exluding the extension.
    fn default_name() -> &'static str {
        Self::kind()
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct GetConfigError(#[from] StoreError);

/// Load and decode a config from the root of the given store.
///
/// Returns `None` if the config has never been stored.
pub async fn get<C: StoredConfig>(store: &Store) -> Result<Option<C>, GetConfigError> {
    debug!("reading {} config", C::kind());
    let value = store.read("/", C::default_name()).await?;
    Ok(value)
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct StoreConfigError(#[from] StoreError);

/// Encode and store a config at the root of the given store.
///
/// All stored configs automatically get a `.json` extension.
pub async fn store<C: StoredConfig>(store: &Store, config: &C) -> Result<(), StoreConfigError> {
    debug!("storing {} config", C::kind());
    store.write("/", C::default_name(), config).await?;
    Ok(())
}
