use thiserror::Error;
use tracing::{info, instrument};

use crate::common_types::DeviceId;
use crate::engine::Engine;
use crate::notify::Notification;
use crate::remote::{IconAsset, IconUpdate, IconUpload, Remote, RemoteError};

/// The icon to show for a device
#[derive(Debug, Clone, PartialEq)]
pub enum IconSource {
    /// Upload a custom image
    Upload(IconAsset),
    /// Use one of the built-in icons
    Default(String),
    /// Go back to no icon
    Remove,
}

#[derive(Debug, Error)]
pub enum IconError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl<R: Remote> Engine<R> {
    /// Change the icon of a device.
    ///
    /// On success the new icon is applied to the replica, the draft and the
    /// loaded settings of that device, and a poll is triggered so other
    /// changes made by the remote are picked up.
    #[instrument(skip_all, fields(device_id = %device_id), err)]
    pub async fn set_icon(
        &self,
        device_id: &DeviceId,
        source: IconSource,
    ) -> Result<IconUpdate, IconError> {
        let remote = &self.inner.remote;
        let res = match source {
            IconSource::Upload(asset) => {
                remote
                    .upload_icon(device_id, IconUpload::Asset(asset))
                    .await
            }
            IconSource::Default(name) => {
                remote
                    .upload_icon(device_id, IconUpload::Default(name))
                    .await
            }
            IconSource::Remove => remote.remove_icon(device_id).await,
        };

        let mut update = match res {
            Ok(update) => update,
            Err(e) => {
                self.notify(Notification::negative(format!(
                    "Failed to update icon of device {device_id}: {e}"
                )));
                return Err(e.into());
            }
        };
        // an empty url means no icon
        update.icon_url = update.icon_url.filter(|url| !url.is_empty());

        self.inner.settings.send_if_modified(|settings| match settings {
            Some(settings) if settings.device_id == *device_id => {
                settings.icon_url = update.icon_url.clone();
                if let Some(version) = update.version {
                    settings.version = version;
                }
                true
            }
            _ => false,
        });

        self.inner
            .replica
            .send_if_modified(|replica| replica.set_icon_url(device_id, update.icon_url.clone()));

        self.inner.draft.send_if_modified(|draft| match draft {
            Some(draft) if draft.device_id == *device_id => {
                draft.icon_url = update.icon_url.clone();
                true
            }
            _ => false,
        });

        info!(icon_url = ?update.icon_url, "device icon updated");
        self.trigger_poll();

        Ok(update)
    }
}
