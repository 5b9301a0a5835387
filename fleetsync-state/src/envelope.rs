//! Validation of incremental update envelopes
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::common_types::DeviceId;
use crate::models::{DevicePoint, ValidationError, validate_id};
use crate::remote::RawEnvelope;
use crate::util::json::deserialize_lenient;

/// A point in server time from which incremental changes are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(DateTime<Utc>);

impl Cursor {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl From<DateTime<Utc>> for Cursor {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error)]
#[error("invalid cursor '{0}'")]
pub struct InvalidCursor(String);

impl FromStr for Cursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|_| InvalidCursor(s.to_owned()))
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // second precision, as expected by the remote
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true).fmt(f)
    }
}

/// Partial device record carrying live fields only.
///
/// Absent fields mean "no change".
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub device_id: DeviceId,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub updated_at: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub online: Option<bool>,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub active_state: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub latest_device_point: Option<DevicePoint>,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub latest_accurate_device_point: Option<DevicePoint>,
}

impl DeviceUpdate {
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            updated_at: None,
            online: None,
            active_state: None,
            latest_device_point: None,
            latest_accurate_device_point: None,
        }
    }

    pub fn from_document(doc: Value) -> Result<Self, ValidationError> {
        validate_id(&doc)?;
        let update = serde_json::from_value(doc)?;
        Ok(update)
    }
}

/// A validated update envelope
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEnvelope {
    pub needs_update: bool,

    /// Server time the envelope was produced at
    pub last_update: Cursor,

    pub updated_devices: Vec<DeviceUpdate>,

    /// Icon per device id, `None` meaning the device has no icon
    pub icon_map: Option<HashMap<DeviceId, Option<String>>>,
}

impl UpdateEnvelope {
    pub fn new(last_update: Cursor) -> Self {
        Self {
            needs_update: false,
            last_update,
            updated_devices: Vec::new(),
            icon_map: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    InvalidCursor(#[from] InvalidCursor),
}

/// Validate a raw envelope.
///
/// The envelope is rejected as a whole only if its cursor cannot be read.
/// Malformed device entries are skipped.
pub fn decode(raw: RawEnvelope) -> Result<UpdateEnvelope, EnvelopeError> {
    let RawEnvelope {
        needs_update,
        last_update,
        updated_devices,
        icon_map,
    } = raw;

    let last_update: Cursor = last_update.parse()?;

    let updated_devices = updated_devices
        .unwrap_or_default()
        .into_iter()
        .filter_map(|doc| match DeviceUpdate::from_document(doc) {
            Ok(update) => Some(update),
            Err(e) => {
                warn!("skipping device update: {e}");
                None
            }
        })
        .collect();

    let icon_map = icon_map.map(|icons| {
        icons
            .into_iter()
            .filter(|(id, _)| !id.is_empty())
            .map(|(id, url)| (DeviceId::from(id), Some(url).filter(|u| !u.is_empty())))
            .collect()
    });

    Ok(UpdateEnvelope {
        needs_update,
        last_update,
        updated_devices,
        icon_map,
    })
}

impl TryFrom<RawEnvelope> for UpdateEnvelope {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        decode(raw)
    }
}
