use std::sync::atomic::Ordering;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::engine::{Engine, FlagGuard};
use crate::models::{Unit, UserPreferences};
use crate::notify::{CLIENT_OUTDATED, Notification};
use crate::remote::{Remote, RemoteError};

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl<R: Remote> Engine<R> {
    pub fn preferences(&self) -> UserPreferences {
        self.inner.preferences.borrow().clone()
    }

    /// Fetch the preferences of the configured user.
    ///
    /// Only the first successful call reaches the remote. A user without
    /// stored preferences gets the defaults.
    #[instrument(skip_all, fields(user_id = %self.inner.config.user_id))]
    pub async fn load_preferences(&self) -> UserPreferences {
        if self.inner.preferences_loaded.load(Ordering::Acquire) {
            return self.preferences();
        }
        let Some(_guard) = FlagGuard::acquire(&self.inner.preferences_loading) else {
            debug!("preferences already loading");
            return self.preferences();
        };

        let user_id = &self.inner.config.user_id;
        let prefs = match self.inner.remote.fetch_user_preferences(user_id).await {
            Ok(prefs) => prefs,
            Err(RemoteError::NotFound(_)) => {
                info!("no preferences found, using defaults");
                UserPreferences::new(user_id.clone())
            }
            Err(e) => {
                warn!("failed to load preferences: {e}");
                return self.preferences();
            }
        };

        self.inner.preferences.send_replace(prefs.clone());
        self.inner.preferences_loaded.store(true, Ordering::Release);
        prefs
    }

    /// Store the current preferences on the remote
    #[instrument(skip_all, err)]
    pub async fn save_preferences(&self) -> Result<UserPreferences, PreferencesError> {
        let prefs = self.preferences();
        let saved = match self.inner.remote.submit_user_preferences(&prefs).await {
            Ok(saved) => saved,
            Err(e @ RemoteError::Conflict(_)) => {
                self.notify(Notification::warning(CLIENT_OUTDATED));
                return Err(e.into());
            }
            Err(e) => {
                self.notify(Notification::negative(format!(
                    "Failed to save preferences: {e}"
                )));
                return Err(e.into());
            }
        };

        // keep local changes made while saving, only take the new version
        self.inner.preferences.send_modify(|current| {
            if *current == prefs {
                *current = saved.clone();
            } else {
                current.version = saved.version;
            }
        });
        Ok(saved)
    }

    pub async fn set_unit(&self, unit: Unit) -> Result<UserPreferences, PreferencesError> {
        self.inner.preferences.send_modify(|prefs| prefs.unit = unit);
        self.save_preferences().await
    }

    pub async fn set_device_list_width(
        &self,
        width: u32,
    ) -> Result<UserPreferences, PreferencesError> {
        self.inner
            .preferences
            .send_modify(|prefs| prefs.device_list_width = width);
        self.save_preferences().await
    }
}
