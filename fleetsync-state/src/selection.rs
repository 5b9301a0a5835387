use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::common_types::DeviceId;
use crate::engine::Engine;
use crate::models::DeviceSettings;
use crate::notify::{CLIENT_OUTDATED, Notification};
use crate::remote::{Remote, RemoteError};

/// Devices the user is currently focused on
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub selected: Option<DeviceId>,
    pub hovered: Option<DeviceId>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl<R: Remote> Engine<R> {
    pub fn selection(&self) -> Selection {
        self.inner.selection.borrow().clone()
    }

    /// Focus a device. Settings loaded for another device are dropped.
    pub fn select_device(&self, id: impl Into<DeviceId>) {
        let id = id.into();
        self.inner.selection.send_if_modified(|selection| {
            if selection.selected.as_ref() == Some(&id) {
                return false;
            }
            selection.selected = Some(id.clone());
            true
        });
        self.inner.settings.send_if_modified(|settings| {
            if settings.as_ref().is_some_and(|s| s.device_id != id) {
                *settings = None;
                return true;
            }
            false
        });
    }

    /// Clear the focus, dropping the draft and the loaded settings
    pub fn deselect_device(&self) {
        self.inner
            .selection
            .send_if_modified(|selection| selection.selected.take().is_some());
        self.inner
            .settings
            .send_if_modified(|settings| settings.take().is_some());
        self.discard();
    }

    pub fn set_hovered(&self, id: Option<DeviceId>) {
        self.inner.selection.send_if_modified(|selection| {
            if selection.hovered == id {
                return false;
            }
            selection.hovered = id;
            true
        });
    }

    /// The loaded settings, if any
    pub fn settings(&self) -> Option<DeviceSettings> {
        self.inner.settings.borrow().clone()
    }

    /// Get the settings of a device, fetching them if not loaded yet.
    ///
    /// A device without settings gets the defaults. Returns `None` if the
    /// remote cannot be reached.
    #[instrument(skip_all, fields(device_id = %id))]
    pub async fn load_settings(&self, id: &DeviceId) -> Option<DeviceSettings> {
        if let Some(cached) = self.settings().filter(|s| s.device_id == *id) {
            return Some(cached);
        }

        let settings = match self.inner.remote.fetch_device_settings(id).await {
            Ok(settings) => settings,
            Err(RemoteError::NotFound(_)) => {
                info!("no settings found, using defaults");
                DeviceSettings::new(id.clone())
            }
            Err(e) => {
                warn!("failed to load settings: {e}");
                return None;
            }
        };

        // the user may have moved on while the request was in flight
        let selected = self.selection().selected;
        if selected.is_none() || selected.as_ref() == Some(id) {
            self.inner.settings.send_replace(Some(settings.clone()));
        } else {
            debug!("device no longer selected, not caching settings");
        }

        Some(settings)
    }

    /// Send settings to the remote, which assigns the next version.
    ///
    /// Settings based on an outdated version are rejected by the remote.
    #[instrument(skip_all, fields(device_id = %settings.device_id), err)]
    pub async fn save_settings(
        &self,
        settings: DeviceSettings,
    ) -> Result<DeviceSettings, SettingsError> {
        let saved = match self.inner.remote.submit_device_settings(&settings).await {
            Ok(saved) => saved,
            Err(e @ RemoteError::Conflict(_)) => {
                self.notify(Notification::warning(CLIENT_OUTDATED));
                return Err(e.into());
            }
            Err(e) => {
                self.notify(Notification::negative(format!(
                    "Failed to save settings: {e}"
                )));
                return Err(e.into());
            }
        };

        self.inner.settings.send_if_modified(|current| {
            let replaces = match current {
                Some(current) => current.device_id == saved.device_id,
                None => self.inner.selection.borrow().selected.as_ref() == Some(&saved.device_id),
            };
            if replaces {
                *current = Some(saved.clone());
            }
            replaces
        });
        info!(version = saved.version, "settings saved");

        Ok(saved)
    }
}
