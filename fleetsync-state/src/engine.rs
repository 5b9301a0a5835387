use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::models::{Device, DeviceSettings, UserPreferences};
use crate::notify::{Level, Notification};
use crate::poll::PollState;
use crate::remote::Remote;
use crate::replica::Replica;
use crate::selection::Selection;

/// Clears a flag when dropped.
///
/// Acquiring fails if the flag is already set, which makes the flag usable
/// as a guard against re-entrant operations.
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct Inner<R> {
    pub remote: R,
    pub config: SyncConfig,
    pub replica: watch::Sender<Replica>,
    pub draft: watch::Sender<Option<Device>>,
    pub selection: watch::Sender<Selection>,
    pub settings: watch::Sender<Option<DeviceSettings>>,
    pub preferences: watch::Sender<UserPreferences>,
    pub notifications: broadcast::Sender<Notification>,
    pub poll: PollState,
    pub preferences_loading: AtomicBool,
    pub preferences_loaded: AtomicBool,
}

/// Client side replica of the remote device list.
///
/// An engine is bound to a single remote. Clones share the same state,
/// changes are observable through the `subscribe_*` receivers.
pub struct Engine<R> {
    pub(crate) inner: Arc<Inner<R>>,
}

impl<R> Clone for Engine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Remote> Engine<R> {
    pub fn new(remote: R, config: SyncConfig) -> Self {
        let (notifications, _) = broadcast::channel(32);
        let preferences = UserPreferences::new(config.user_id.clone());
        Self {
            inner: Arc::new(Inner {
                remote,
                config,
                replica: watch::Sender::new(Replica::default()),
                draft: watch::Sender::new(None),
                selection: watch::Sender::new(Selection::default()),
                settings: watch::Sender::new(None),
                preferences: watch::Sender::new(preferences),
                notifications,
                poll: PollState::default(),
                preferences_loading: AtomicBool::new(false),
                preferences_loaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    /// Snapshot of the replica
    pub fn replica(&self) -> Replica {
        self.inner.replica.borrow().clone()
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        self.inner.replica.borrow().get(id).cloned()
    }

    pub fn subscribe_replica(&self) -> watch::Receiver<Replica> {
        self.inner.replica.subscribe()
    }

    pub fn subscribe_draft(&self) -> watch::Receiver<Option<Device>> {
        self.inner.draft.subscribe()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<Selection> {
        self.inner.selection.subscribe()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<Option<DeviceSettings>> {
        self.inner.settings.subscribe()
    }

    pub fn subscribe_preferences(&self) -> watch::Receiver<UserPreferences> {
        self.inner.preferences.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Publish a user visible notification
    pub(crate) fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Info => info!("{}", notification.message),
            Level::Warning | Level::Negative => warn!("{}", notification.message),
        }
        // nobody listening is fine
        let _ = self.inner.notifications.send(notification);
    }

    /// Hide or show a device locally
    pub fn set_visibility(&self, id: &str, visible: bool) -> bool {
        self.inner
            .replica
            .send_if_modified(|replica| replica.set_visibility(id, visible))
    }

    /// Flip the local visibility of a device
    pub fn toggle_visibility(&self, id: &str) -> bool {
        self.inner.replica.send_if_modified(|replica| {
            let Some(visible) = replica.get(id).map(|d| d.visible) else {
                return false;
            };
            replica.set_visibility(id, !visible)
        })
    }
}
