//! In-memory remote used by the engine tests
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::common_types::{DeviceId, UserId};
use crate::config::SyncConfig;
use crate::engine::Engine;
use crate::envelope::Cursor;
use crate::models::{Device, DeviceSettings, UserPreferences};
use crate::remote::{IconUpdate, IconUpload, RawEnvelope, Remote, RemoteError};

pub fn before() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(fmt::format().pretty().with_target(false)),
        )
        .try_init()
        .unwrap_or(());
}

pub fn envelope(last_update: &str, devices: Value) -> RawEnvelope {
    serde_json::from_value(serde_json::json!({
        "needsUpdate": true,
        "lastUpdate": last_update,
        "updatedDevices": devices,
    }))
    .unwrap()
}

pub fn engine_with(remote: FakeRemote) -> (Engine<Arc<FakeRemote>>, Arc<FakeRemote>) {
    let remote = Arc::new(remote);
    let config = SyncConfig {
        poll_interval: Duration::from_secs(60),
        user_id: UserId::from("alice"),
    };
    (Engine::new(remote.clone(), config), remote)
}

/// Remote keeping its records in memory.
///
/// Settings and preferences follow the version rules of the real remote,
/// a write with a stale version is a conflict.
#[derive(Default)]
pub struct FakeRemote {
    pub devices: Mutex<Vec<Value>>,
    pub envelopes: Mutex<VecDeque<RawEnvelope>>,
    pub settings: Mutex<HashMap<DeviceId, DeviceSettings>>,
    pub preferences: Mutex<Option<UserPreferences>>,

    pub fetch_all_calls: AtomicUsize,
    pub cursors: Mutex<Vec<Cursor>>,
    pub submitted: Mutex<Vec<Device>>,
    pub icon_requests: Mutex<Vec<(DeviceId, Option<IconUpload>)>>,

    pub load_delay: Duration,
    pub update_delay: Duration,
    pub failing: Mutex<Option<RemoteError>>,
    fail_fetch_all: AtomicBool,
}

impl FakeRemote {
    pub fn with_devices(devices: Vec<Value>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn push_envelope(&self, envelope: RawEnvelope) {
        self.envelopes.lock().unwrap().push_back(envelope);
    }

    pub fn requested_cursors(&self) -> Vec<Cursor> {
        self.cursors.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<Device> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fail_fetch_all(&self, fail: bool) {
        self.fail_fetch_all.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with the given error
    pub fn fail_with(&self, err: Option<RemoteError>) {
        *self.failing.lock().unwrap() = err;
    }

    fn check_failing(&self) -> Result<(), RemoteError> {
        match self.failing.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bump_settings(&self, id: &DeviceId, icon_url: Option<String>) -> Option<i64> {
        let mut settings = self.settings.lock().unwrap();
        let current = settings.get_mut(id)?;
        current.icon_url = icon_url;
        current.version += 1;
        Some(current.version)
    }

    fn set_icon(&self, id: &DeviceId, icon_url: Option<String>) -> IconUpdate {
        let version = self.bump_settings(id, icon_url.clone());
        IconUpdate { icon_url, version }
    }
}

impl Remote for FakeRemote {
    async fn fetch_all_devices(&self) -> Result<Vec<Value>, RemoteError> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        if self.fail_fetch_all.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_owned()));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn fetch_updates(&self, since: &Cursor) -> Result<RawEnvelope, RemoteError> {
        self.cursors.lock().unwrap().push(*since);
        tokio::time::sleep(self.update_delay).await;
        let next = self.envelopes.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| RawEnvelope {
            last_update: since.to_string(),
            ..Default::default()
        }))
    }

    async fn submit_device_update(
        &self,
        _id: &DeviceId,
        device: &Device,
    ) -> Result<Device, RemoteError> {
        self.check_failing()?;
        self.submitted.lock().unwrap().push(device.clone());
        Ok(device.clone())
    }

    async fn fetch_device_settings(&self, id: &DeviceId) -> Result<DeviceSettings, RemoteError> {
        self.settings
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("settings for {id}")))
    }

    async fn submit_device_settings(
        &self,
        settings: &DeviceSettings,
    ) -> Result<DeviceSettings, RemoteError> {
        self.check_failing()?;
        let mut stored = self.settings.lock().unwrap();
        if let Some(current) = stored.get(&settings.device_id) {
            if current.version != settings.version {
                return Err(RemoteError::Conflict("version mismatch".to_owned()));
            }
        }
        let mut saved = settings.clone();
        saved.version += 1;
        stored.insert(saved.device_id.clone(), saved.clone());
        Ok(saved)
    }

    async fn upload_icon(
        &self,
        id: &DeviceId,
        icon: IconUpload,
    ) -> Result<IconUpdate, RemoteError> {
        self.icon_requests
            .lock()
            .unwrap()
            .push((id.clone(), Some(icon.clone())));
        self.check_failing()?;
        let icon_url = match icon {
            IconUpload::Asset(asset) => format!("/uploads/{}", asset.file_name),
            IconUpload::Default(name) => name,
        };
        Ok(self.set_icon(id, Some(icon_url)))
    }

    async fn remove_icon(&self, id: &DeviceId) -> Result<IconUpdate, RemoteError> {
        self.icon_requests.lock().unwrap().push((id.clone(), None));
        self.check_failing()?;
        Ok(self.set_icon(id, None))
    }

    async fn fetch_user_preferences(&self, user: &UserId) -> Result<UserPreferences, RemoteError> {
        self.preferences
            .lock()
            .unwrap()
            .clone()
            .filter(|p| p.user_id == *user)
            .ok_or_else(|| RemoteError::NotFound(format!("preferences for {user}")))
    }

    async fn submit_user_preferences(
        &self,
        prefs: &UserPreferences,
    ) -> Result<UserPreferences, RemoteError> {
        self.check_failing()?;
        let mut stored = self.preferences.lock().unwrap();
        if let Some(current) = stored.as_ref() {
            if current.version != prefs.version {
                return Err(RemoteError::Conflict("version mismatch".to_owned()));
            }
        }
        let mut saved = prefs.clone();
        saved.version += 1;
        *stored = Some(saved.clone());
        Ok(saved)
    }
}
