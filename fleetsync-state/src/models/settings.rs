use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::common_types::DeviceId;

/// A value with a unit and a human readable rendering
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Measure {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub display: String,
}

impl Measure {
    fn new(value: f64, unit: &str, display: &str) -> Self {
        Self {
            value,
            unit: unit.to_owned(),
            display: display.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FuelConsumption {
    #[serde(default)]
    pub calculation_method: String,
    #[serde(default)]
    pub measurement: String,
    #[serde(default)]
    pub fuel_type: String,
    #[serde(default)]
    pub fuel_cost: f64,
    #[serde(default)]
    pub fuel_economy: f64,
}

/// Per-device configuration record.
///
/// The remote owns `version` and advances it on every accepted write. A
/// write carrying a stale version is rejected as a conflict.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub device_id: DeviceId,

    #[serde(rename = "iconUrl", default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    #[serde(default)]
    pub version: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub begin_moving_speed: Measure,
    #[serde(default)]
    pub begin_stopped_speed: Measure,
    #[serde(default)]
    pub max_drift_distance: Measure,
    #[serde(default)]
    pub min_num_satellites: u32,
    #[serde(default)]
    pub ignore_unset_min_num_sats: bool,
    #[serde(default)]
    pub max_hdop: f64,
    #[serde(default)]
    pub drive_timeout: Measure,
    #[serde(default)]
    pub stop_timeout: Measure,
    #[serde(default)]
    pub offline_timeout: Measure,
    #[serde(default)]
    pub history_calc_duration: Measure,
    #[serde(default)]
    pub fuel_consumption: FuelConsumption,
    #[serde(default)]
    pub initial_device_point_delete_cutoff_time: String,
    #[serde(default)]
    pub engine_hours_counter_config: String,
    #[serde(default)]
    pub use_v3_engine_hours: bool,
    #[serde(default)]
    pub history_retention_days: u32,
    #[serde(default)]
    pub harsh_event_min_speed: Measure,
}

impl DeviceSettings {
    /// Settings the remote would create for a device that has none
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            icon_url: None,
            version: 1,
            updated_at: Some(Utc::now().to_rfc3339()),
            begin_moving_speed: Measure::new(0.0, "mph", "0 mph"),
            begin_stopped_speed: Measure::new(0.0, "mph", "0 mph"),
            max_drift_distance: Measure::new(350.0, "m", "350 m"),
            min_num_satellites: 8,
            ignore_unset_min_num_sats: true,
            max_hdop: 3.5,
            drive_timeout: Measure::new(1800.0, "s", "30m"),
            stop_timeout: Measure::new(14400.0, "s", "4h"),
            offline_timeout: Measure::new(3900.0, "s", "1h 5m"),
            history_calc_duration: Measure::new(86400.0, "s", "24h"),
            fuel_consumption: FuelConsumption {
                calculation_method: "fuel_sensor".to_owned(),
                measurement: "mpg".to_owned(),
                ..Default::default()
            },
            initial_device_point_delete_cutoff_time: "2024-06-21T17:45:09.284403Z".to_owned(),
            engine_hours_counter_config: "best".to_owned(),
            use_v3_engine_hours: true,
            history_retention_days: 1095,
            harsh_event_min_speed: Measure::new(0.0, "mph", "0 mph"),
        }
    }
}
