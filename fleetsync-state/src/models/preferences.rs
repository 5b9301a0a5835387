use serde::{Deserialize, Serialize};

use crate::common_types::UserId;

/// Unit system used to render measures
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Keep whatever unit the device reports
    #[default]
    Original,
    Metric,
    Imperial,
}

fn default_device_list_width() -> u32 {
    400
}

/// Per-user display preferences
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserPreferences {
    #[serde(default)]
    pub version: i64,

    #[serde(rename = "userId")]
    pub user_id: UserId,

    #[serde(rename = "DeviceListWidth", default = "default_device_list_width")]
    pub device_list_width: u32,

    #[serde(default)]
    pub unit: Unit,
}

impl UserPreferences {
    pub fn new(user_id: UserId) -> Self {
        Self {
            version: 0,
            user_id,
            device_list_width: default_device_list_width(),
            unit: Unit::default(),
        }
    }
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self::new(UserId::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_uses_the_remote_field_names() {
        let prefs: UserPreferences = serde_json::from_value(json!({
            "userId": "alice",
            "version": 3,
            "DeviceListWidth": 520,
            "unit": "metric"
        }))
        .unwrap();
        assert_eq!(prefs.device_list_width, 520);
        assert_eq!(prefs.unit, Unit::Metric);

        let value = serde_json::to_value(UserPreferences::new("bob".into())).unwrap();
        assert_eq!(
            value,
            json!({"version": 0, "userId": "bob", "DeviceListWidth": 400, "unit": "original"})
        );
    }
}
