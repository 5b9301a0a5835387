//! Addressing and in-place mutation of nested device fields
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Device, DevicePoint, DeviceState};

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Key(String),
    Index(usize),
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::Key(value.to_owned())
    }
}

impl From<usize> for Selector {
    fn from(value: usize) -> Self {
        Selector::Index(value)
    }
}

#[derive(Debug, Error)]
#[error("invalid field path '{0}'")]
pub struct InvalidFieldPath(String);

/// A sequence of selectors addressing a field inside a device.
///
/// The textual form uses dots between keys and brackets for list
/// indices, e.g. `latest_device_point.device_state.drive_status` or
/// `groups[1]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(Vec<Selector>);

impl FieldPath {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self(selectors)
    }

    /// Parse each segment of a list in textual form
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self, InvalidFieldPath> {
        let mut selectors = Vec::new();
        for segment in segments {
            let FieldPath(mut parsed) = segment.as_ref().parse()?;
            selectors.append(&mut parsed);
        }
        Ok(Self(selectors))
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Selector>> for FieldPath {
    fn from(value: Vec<Selector>) -> Self {
        Self(value)
    }
}

impl FromStr for FieldPath {
    type Err = InvalidFieldPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidFieldPath(s.to_owned());
        let mut selectors = Vec::new();

        for segment in s.split('.') {
            let (key, mut rest) = match segment.find('[') {
                Some(pos) => segment.split_at(pos),
                None => (segment, ""),
            };

            if !key.is_empty() {
                selectors.push(Selector::Key(key.to_owned()));
            } else if rest.is_empty() {
                return Err(invalid());
            }

            while !rest.is_empty() {
                let inner = rest.strip_prefix('[').ok_or_else(invalid)?;
                let end = inner.find(']').ok_or_else(invalid)?;
                let index = inner[..end].parse::<usize>().map_err(|_| invalid())?;
                selectors.push(Selector::Index(index));
                rest = &inner[end + 1..];
            }
        }

        Ok(Self(selectors))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, selector) in self.0.iter().enumerate() {
            match selector {
                Selector::Key(key) if i == 0 => write!(f, "{key}")?,
                Selector::Key(key) => write!(f, ".{key}")?,
                Selector::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// Set the value addressed by a path.
///
/// Returns `false` and leaves the target untouched if the path does not
/// resolve or the value does not fit the addressed field.
pub(crate) trait SetPath {
    fn set_path(&mut self, path: &[Selector], value: Value) -> bool;
}

/// Replace a typed leaf, the path must end here
fn set_leaf<T: DeserializeOwned>(slot: &mut T, rest: &[Selector], value: Value) -> bool {
    if !rest.is_empty() {
        return false;
    }
    match serde_json::from_value(value) {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

/// Replace an optional record or descend into it if present
fn set_nested<T>(slot: &mut Option<T>, rest: &[Selector], value: Value) -> bool
where
    T: SetPath + DeserializeOwned,
{
    if rest.is_empty() {
        return set_leaf(slot, rest, value);
    }
    match slot {
        Some(inner) => inner.set_path(rest, value),
        None => false,
    }
}

/// Replace a list or one of its existing elements
fn set_indexed<T: DeserializeOwned>(list: &mut Vec<T>, rest: &[Selector], value: Value) -> bool {
    match rest {
        [] => set_leaf(list, rest, value),
        [Selector::Index(idx), tail @ ..] => list
            .get_mut(*idx)
            .is_some_and(|item| set_leaf(item, tail, value)),
        _ => false,
    }
}

/// Write into an open map, inserting the final key if needed
fn set_extra(
    extra: &mut BTreeMap<String, Value>,
    key: &str,
    rest: &[Selector],
    value: Value,
) -> bool {
    if rest.is_empty() {
        extra.insert(key.to_owned(), value);
        return true;
    }
    extra
        .get_mut(key)
        .is_some_and(|inner| inner.set_path(rest, value))
}

impl SetPath for Value {
    fn set_path(&mut self, path: &[Selector], value: Value) -> bool {
        let Some((first, rest)) = path.split_first() else {
            *self = value;
            return true;
        };

        match (self, first) {
            (Value::Object(map), Selector::Key(key)) => {
                if rest.is_empty() {
                    map.insert(key.clone(), value);
                    return true;
                }
                map.get_mut(key)
                    .is_some_and(|inner| inner.set_path(rest, value))
            }
            (Value::Array(list), Selector::Index(idx)) => list
                .get_mut(*idx)
                .is_some_and(|inner| inner.set_path(rest, value)),
            _ => false,
        }
    }
}

impl SetPath for DeviceState {
    fn set_path(&mut self, path: &[Selector], value: Value) -> bool {
        let Some((Selector::Key(key), rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            "drive_status" => set_leaf(&mut self.drive_status, rest, value),
            "fuel_percent" => set_leaf(&mut self.fuel_percent, rest, value),
            other => set_extra(&mut self.extra, other, rest, value),
        }
    }
}

impl SetPath for DevicePoint {
    fn set_path(&mut self, path: &[Selector], value: Value) -> bool {
        let Some((Selector::Key(key), rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            "lat" => set_leaf(&mut self.lat, rest, value),
            "lng" => set_leaf(&mut self.lng, rest, value),
            "speed" => set_leaf(&mut self.speed, rest, value),
            "dt_tracker" => set_leaf(&mut self.dt_tracker, rest, value),
            "device_state" => set_nested(&mut self.device_state, rest, value),
            other => set_extra(&mut self.extra, other, rest, value),
        }
    }
}

impl SetPath for Device {
    fn set_path(&mut self, path: &[Selector], value: Value) -> bool {
        let Some((Selector::Key(key), rest)) = path.split_first() else {
            return false;
        };
        match key.as_str() {
            // identity is immutable
            "device_id" => false,
            "display_name" => set_leaf(&mut self.display_name, rest, value),
            "name" => set_leaf(&mut self.name, rest, value),
            "active_state" => set_leaf(&mut self.active_state, rest, value),
            "online" => set_leaf(&mut self.online, rest, value),
            "updated_at" => set_leaf(&mut self.updated_at, rest, value),
            "latest_device_point" => set_nested(&mut self.latest_device_point, rest, value),
            "latest_accurate_device_point" => {
                set_nested(&mut self.latest_accurate_device_point, rest, value)
            }
            "iconUrl" => set_leaf(&mut self.icon_url, rest, value),
            "groups" => set_indexed(&mut self.groups, rest, value),
            "visible" => set_leaf(&mut self.visible, rest, value),
            other => set_extra(&mut self.extra, other, rest, value),
        }
    }
}
