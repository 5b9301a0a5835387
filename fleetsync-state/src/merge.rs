use std::collections::HashMap;

use tracing::{debug, trace};

use crate::common_types::DeviceId;
use crate::envelope::{DeviceUpdate, UpdateEnvelope};
use crate::models::Device;
use crate::replica::Replica;

/// Summary of an envelope merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Devices whose live fields changed
    pub updated: usize,
    /// Devices whose icon changed
    pub icons: usize,
    /// Updates for devices the replica does not know
    pub ignored: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.updated > 0 || self.icons > 0
    }
}

/// Overwrite `slot` if the update carries a different value
fn coalesce<T: PartialEq>(slot: &mut T, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) if *slot != value => {
            *slot = value;
            true
        }
        _ => false,
    }
}

/// Overwrite an optional field if the update carries a value
fn coalesce_opt<T: PartialEq>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) if slot.as_ref() != Some(&value) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

/// Apply the live fields of an update, returns `true` if anything changed
fn apply(device: &mut Device, update: DeviceUpdate) -> bool {
    let DeviceUpdate {
        updated_at,
        online,
        active_state,
        latest_device_point,
        latest_accurate_device_point,
        ..
    } = update;

    let mut changed = coalesce_opt(&mut device.updated_at, updated_at);
    changed |= coalesce(&mut device.online, online);
    changed |= coalesce_opt(&mut device.active_state, active_state);
    changed |= coalesce_opt(&mut device.latest_device_point, latest_device_point);
    changed |= coalesce_opt(
        &mut device.latest_accurate_device_point,
        latest_accurate_device_point,
    );
    changed
}

/// Merge an envelope into the replica.
///
/// Only devices already in the replica are touched. Live fields present in
/// an update replace the current values, absent fields are kept. Icons
/// from the envelope icon map always replace the current icon. Fields not
/// carried by the envelope, including the local visibility flag, are never
/// modified. Merging the same envelope twice has no further effect.
pub fn merge(replica: &mut Replica, envelope: UpdateEnvelope) -> MergeReport {
    let UpdateEnvelope {
        updated_devices,
        icon_map,
        ..
    } = envelope;

    // later entries for the same id win
    let mut updates: HashMap<DeviceId, DeviceUpdate> = updated_devices
        .into_iter()
        .map(|u| (u.device_id.clone(), u))
        .collect();
    let icons = icon_map.unwrap_or_default();

    let mut report = MergeReport::default();
    for device in replica.iter_mut() {
        if let Some(update) = updates.remove(device.device_id.as_str()) {
            if apply(device, update) {
                trace!(device_id = %device.device_id, "device updated");
                report.updated += 1;
            }
        }

        if let Some(icon_url) = icons.get(device.device_id.as_str()) {
            if device.icon_url != *icon_url {
                device.icon_url = icon_url.clone();
                report.icons += 1;
            }
        }
    }

    report.ignored = updates.len();
    if report.ignored > 0 {
        debug!(
            "ignored updates for unknown devices: {:?}",
            updates.keys().collect::<Vec<_>>()
        );
    }

    report
}
