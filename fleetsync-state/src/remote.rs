use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::common_types::{DeviceId, UserId};
use crate::envelope::Cursor;
use crate::models::{Device, DeviceSettings, UserPreferences};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("remote responded with status {0}: {1}")]
    Status(u16, String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Incremental update response as received from the remote
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    #[serde(default)]
    pub needs_update: bool,

    #[serde(default)]
    pub last_update: String,

    #[serde(default)]
    pub updated_devices: Option<Vec<Value>>,

    #[serde(default, alias = "icon_map")]
    pub icon_map: Option<HashMap<String, String>>,
}

/// An image file to be used as device icon
#[derive(Debug, Clone, PartialEq)]
pub struct IconAsset {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Icon payload for the remote
#[derive(Debug, Clone, PartialEq)]
pub enum IconUpload {
    /// A custom image
    Asset(IconAsset),
    /// Reference to one of the built-in icons
    Default(String),
}

/// Result of an icon change
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct IconUpdate {
    /// The new icon, `None` if the icon was removed
    #[serde(rename = "iconUrl", default)]
    pub icon_url: Option<String>,

    /// Settings version after the change, if the remote tracks one
    #[serde(default)]
    pub version: Option<i64>,
}

/// The source of truth for device records.
///
/// All methods fail with a [`RemoteError`]. Callers only distinguish
/// `NotFound` and `Conflict`, every other variant is reported as is.
pub trait Remote: Send + Sync + 'static {
    /// Fetch the full list of device documents
    fn fetch_all_devices(&self) -> impl Future<Output = Result<Vec<Value>, RemoteError>> + Send;

    /// Fetch the changes since the given cursor
    fn fetch_updates(
        &self,
        since: &Cursor,
    ) -> impl Future<Output = Result<RawEnvelope, RemoteError>> + Send;

    fn submit_device_update(
        &self,
        id: &DeviceId,
        device: &Device,
    ) -> impl Future<Output = Result<Device, RemoteError>> + Send;

    fn fetch_device_settings(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<DeviceSettings, RemoteError>> + Send;

    fn submit_device_settings(
        &self,
        settings: &DeviceSettings,
    ) -> impl Future<Output = Result<DeviceSettings, RemoteError>> + Send;

    fn upload_icon(
        &self,
        id: &DeviceId,
        icon: IconUpload,
    ) -> impl Future<Output = Result<IconUpdate, RemoteError>> + Send;

    fn remove_icon(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<IconUpdate, RemoteError>> + Send;

    fn fetch_user_preferences(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<UserPreferences, RemoteError>> + Send;

    fn submit_user_preferences(
        &self,
        prefs: &UserPreferences,
    ) -> impl Future<Output = Result<UserPreferences, RemoteError>> + Send;
}

impl<T: Remote> Remote for Arc<T> {
    fn fetch_all_devices(&self) -> impl Future<Output = Result<Vec<Value>, RemoteError>> + Send {
        (**self).fetch_all_devices()
    }

    fn fetch_updates(
        &self,
        since: &Cursor,
    ) -> impl Future<Output = Result<RawEnvelope, RemoteError>> + Send {
        (**self).fetch_updates(since)
    }

    fn submit_device_update(
        &self,
        id: &DeviceId,
        device: &Device,
    ) -> impl Future<Output = Result<Device, RemoteError>> + Send {
        (**self).submit_device_update(id, device)
    }

    fn fetch_device_settings(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<DeviceSettings, RemoteError>> + Send {
        (**self).fetch_device_settings(id)
    }

    fn submit_device_settings(
        &self,
        settings: &DeviceSettings,
    ) -> impl Future<Output = Result<DeviceSettings, RemoteError>> + Send {
        (**self).submit_device_settings(settings)
    }

    fn upload_icon(
        &self,
        id: &DeviceId,
        icon: IconUpload,
    ) -> impl Future<Output = Result<IconUpdate, RemoteError>> + Send {
        (**self).upload_icon(id, icon)
    }

    fn remove_icon(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<IconUpdate, RemoteError>> + Send {
        (**self).remove_icon(id)
    }

    fn fetch_user_preferences(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<UserPreferences, RemoteError>> + Send {
        (**self).fetch_user_preferences(user)
    }

    fn submit_user_preferences(
        &self,
        prefs: &UserPreferences,
    ) -> impl Future<Output = Result<UserPreferences, RemoteError>> + Send {
        (**self).submit_user_preferences(prefs)
    }
}
