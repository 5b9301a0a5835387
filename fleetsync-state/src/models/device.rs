use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::common_types::DeviceId;
use crate::util::json::deserialize_lenient;

/// Reason a device record coming from the remote was rejected
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("record is missing a non-empty device_id")]
    MissingId,

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn default_visible() -> bool {
    true
}

/// A tracked device as held by the local replica
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    /// Unique identity, immutable for the lifetime of the record
    pub device_id: DeviceId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_state: Option<String>,

    #[serde(default)]
    pub online: bool,

    /// Server timestamp of the last change to the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub latest_device_point: Option<DevicePoint>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub latest_accurate_device_point: Option<DevicePoint>,

    #[serde(rename = "iconUrl", default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    #[serde(default)]
    pub groups: Vec<String>,

    /// Local display flag. It is never sent to nor received from the remote.
    #[serde(skip, default = "default_visible")]
    pub visible: bool,

    /// Fields the replica does not interpret but must carry along
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Device {
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            display_name: None,
            name: None,
            active_state: None,
            online: false,
            updated_at: None,
            latest_device_point: None,
            latest_accurate_device_point: None,
            icon_url: None,
            groups: Vec::new(),
            visible: true,
            extra: BTreeMap::new(),
        }
    }

    /// Build a device from a document received from the remote
    pub fn from_document(doc: Value) -> Result<Self, ValidationError> {
        validate_id(&doc)?;
        let mut device: Device = serde_json::from_value(doc)?;

        // the visibility flag is local only
        device.extra.remove("visible");
        Ok(device)
    }
}

/// Check that a document is an object with a non-empty string `device_id`
pub(crate) fn validate_id(doc: &Value) -> Result<(), ValidationError> {
    let obj = doc.as_object().ok_or(ValidationError::NotAnObject)?;
    match obj.get("device_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(()),
        _ => Err(ValidationError::MissingId),
    }
}

/// A single telemetry sample reported by a device
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DevicePoint {
    pub lat: f64,
    pub lng: f64,

    #[serde(default)]
    pub speed: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt_tracker: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_state: Option<DeviceState>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Derived driving state attached to a telemetry sample
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_percent: Option<f64>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
