use std::collections::HashSet;
use std::ops::Deref;

use serde_json::Value;
use tracing::warn;

use crate::models::Device;

/// Ordered local copy of the known devices.
///
/// Device ids are unique. Order is the order of the last bulk load and
/// positional replacement keeps it stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replica {
    devices: Vec<Device>,
}

impl Replica {
    pub fn new(devices: Vec<Device>) -> Self {
        let mut seen = HashSet::new();
        let devices = devices
            .into_iter()
            .filter(|d| seen.insert(d.device_id.clone()))
            .collect();
        Self { devices }
    }

    /// Build a replica from the documents of a bulk load.
    ///
    /// Documents without a usable id are skipped and only the first
    /// occurrence of an id is kept. Devices already present in `previous`
    /// keep their visibility.
    pub fn from_documents(docs: Vec<Value>, previous: &Replica) -> Self {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(docs.len());

        for doc in docs {
            let mut device = match Device::from_document(doc) {
                Ok(device) => device,
                Err(e) => {
                    warn!("skipping device: {e}");
                    continue;
                }
            };

            if !seen.insert(device.device_id.clone()) {
                warn!(device_id = %device.device_id, "skipping duplicate device");
                continue;
            }

            if let Some(known) = previous.get(&device.device_id) {
                device.visible = known.visible;
            }
            devices.push(device);
        }

        Self { devices }
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.device_id == id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    /// Replace the device with the same id in place.
    ///
    /// Returns `false` if the device is not part of the replica.
    pub fn replace(&mut self, device: Device) -> bool {
        match self.get_mut(&device.device_id) {
            Some(slot) => {
                *slot = device;
                true
            }
            None => false,
        }
    }

    /// Set the visibility flag, returns `true` if it changed
    pub fn set_visibility(&mut self, id: &str, visible: bool) -> bool {
        match self.get_mut(id) {
            Some(device) if device.visible != visible => {
                device.visible = visible;
                true
            }
            _ => false,
        }
    }

    /// Set the icon of a device, returns `true` if it changed
    pub fn set_icon_url(&mut self, id: &str, icon_url: Option<String>) -> bool {
        match self.get_mut(id) {
            Some(device) if device.icon_url != icon_url => {
                device.icon_url = icon_url;
                true
            }
            _ => false,
        }
    }

    pub fn into_inner(self) -> Vec<Device> {
        self.devices
    }
}

impl Deref for Replica {
    type Target = [Device];

    fn deref(&self) -> &Self::Target {
        &self.devices
    }
}
