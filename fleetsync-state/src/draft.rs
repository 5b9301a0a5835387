use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::engine::Engine;
use crate::models::Device;
use crate::notify::Notification;
use crate::path::{FieldPath, SetPath};
use crate::remote::{Remote, RemoteError};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("no device is being edited")]
    NoDraft,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl<R: Remote> Engine<R> {
    /// The device currently being edited
    pub fn draft(&self) -> Option<Device> {
        self.inner.draft.borrow().clone()
    }

    /// Start editing a copy of a device.
    ///
    /// The copy is independent from the replica, live updates merged while
    /// editing do not reach it. Returns `None` if the device is unknown.
    pub fn begin_edit(&self, id: &str) -> Option<Device> {
        let Some(device) = self.device(id) else {
            debug!(device_id = id, "cannot edit unknown device");
            return None;
        };
        self.inner.draft.send_replace(Some(device.clone()));
        Some(device)
    }

    /// Set a nested field of the draft.
    ///
    /// Returns `false` without changing anything if there is no draft or the
    /// path cannot be applied.
    pub fn update_path(&self, path: &FieldPath, value: Value) -> bool {
        self.inner.draft.send_if_modified(|draft| {
            let Some(current) = draft.as_ref() else {
                return false;
            };

            let mut next = current.clone();
            if !next.set_path(path.selectors(), value) {
                debug!(%path, "ignoring update");
                return false;
            }
            *draft = Some(next);
            true
        })
    }

    /// Write the draft into the replica and send it to the remote.
    ///
    /// The local change is kept even if the remote rejects it.
    #[instrument(skip_all, err)]
    pub async fn commit(&self) -> Result<Device, CommitError> {
        let device = self.draft().ok_or(CommitError::NoDraft)?;

        let replaced = self
            .inner
            .replica
            .send_if_modified(|replica| replica.replace(device.clone()));
        if !replaced {
            warn!(device_id = %device.device_id, "device is no longer in the replica");
        }

        if let Err(e) = self
            .inner
            .remote
            .submit_device_update(&device.device_id, &device)
            .await
        {
            self.notify(Notification::negative(format!(
                "Failed to save device {}: {e}",
                device.device_id
            )));
            return Err(e.into());
        }

        // keep any edit started while the request was in flight
        self.inner
            .draft
            .send_if_modified(|draft| match draft {
                Some(current) if *current == device => {
                    *draft = None;
                    true
                }
                _ => false,
            });
        info!(device_id = %device.device_id, "device saved");

        Ok(device)
    }

    /// Drop the draft, leaving the replica untouched
    pub fn discard(&self) {
        self.inner.draft.send_if_modified(|draft| draft.take().is_some());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeRemote, before, engine_with, envelope};

    fn path(s: &str) -> FieldPath {
        s.parse().unwrap()
    }

    fn devices() -> FakeRemote {
        FakeRemote::with_devices(vec![
            json!({"device_id": "d1", "display_name": "Truck", "online": false,
                   "latest_device_point": {"lat": 1.0, "lng": 1.0, "speed": 10.0}}),
            json!({"device_id": "d2", "display_name": "Van", "latest_device_point": null}),
            json!({"device_id": "d3"}),
        ])
    }

    #[tokio::test]
    async fn it_returns_none_when_editing_an_unknown_device() {
        before();
        let (engine, _remote) = engine_with(devices());
        engine.load_devices().await;

        assert_eq!(engine.begin_edit("missing"), None);
        assert_eq!(engine.draft(), None);
    }

    #[tokio::test]
    async fn it_isolates_the_draft_from_live_updates() {
        before();
        let remote = devices();
        remote.push_envelope(envelope("2030-01-01T00:00:00Z", json!([])));
        remote.push_envelope(envelope(
            "2030-01-01T00:00:10Z",
            json!([{"device_id": "d1", "online": true,
                    "latest_device_point": {"lat": 5.0, "lng": 5.0, "speed": 50.0}}]),
        ));
        let (engine, _remote) = engine_with(remote);
        engine.start_polling().await;

        let copy = engine.begin_edit("d1").unwrap();
        engine.poll_once().await;

        assert_eq!(engine.draft(), Some(copy.clone()));
        assert!(!copy.online);
        assert!(engine.device("d1").unwrap().online);

        engine.stop_polling();
    }

    #[tokio::test]
    async fn it_updates_the_draft_copy_on_write() {
        before();
        let (engine, _remote) = engine_with(devices());
        engine.load_devices().await;
        engine.begin_edit("d1");

        let mut rx = engine.subscribe_draft();
        assert!(engine.update_path(&path("display_name"), json!("Big truck")));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        assert!(!engine.update_path(&path("device_id"), json!("d9")));
        assert!(!engine.update_path(&path("online"), json!("yes")));
        assert!(!rx.has_changed().unwrap());

        assert_eq!(
            engine.draft().unwrap().display_name.as_deref(),
            Some("Big truck")
        );
        // the replica keeps the original until commit
        assert_eq!(
            engine.device("d1").unwrap().display_name.as_deref(),
            Some("Truck")
        );
    }

    #[tokio::test]
    async fn it_ignores_paths_through_missing_telemetry() {
        before();
        let (engine, _remote) = engine_with(devices());
        engine.load_devices().await;
        let copy = engine.begin_edit("d2").unwrap();

        assert!(!engine.update_path(&path("latest_device_point.speed"), json!(42)));
        assert_eq!(engine.draft(), Some(copy));
    }

    #[tokio::test]
    async fn it_ignores_updates_without_a_draft() {
        before();
        let (engine, _remote) = engine_with(devices());
        engine.load_devices().await;

        assert!(!engine.update_path(&path("display_name"), json!("x")));
        assert!(matches!(engine.commit().await, Err(CommitError::NoDraft)));
    }

    #[tokio::test]
    async fn it_commits_in_place_and_submits() {
        before();
        let (engine, remote) = engine_with(devices());
        engine.load_devices().await;
        engine.set_visibility("d2", false);

        engine.begin_edit("d2");
        engine.update_path(&path("display_name"), json!("Red van"));
        let committed = engine.commit().await.unwrap();

        let ids: Vec<_> = engine
            .replica()
            .iter()
            .map(|d| d.device_id.to_string())
            .collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);

        let d2 = engine.device("d2").unwrap();
        assert_eq!(d2, committed);
        assert_eq!(d2.display_name.as_deref(), Some("Red van"));
        assert!(!d2.visible);

        assert_eq!(engine.draft(), None);
        assert_eq!(remote.submitted(), vec![committed]);
    }

    #[tokio::test]
    async fn it_keeps_the_local_change_when_the_remote_fails() {
        before();
        let (engine, remote) = engine_with(devices());
        engine.load_devices().await;
        let mut notifications = engine.notifications();
        remote.fail_with(Some(RemoteError::Status(500, "boom".to_owned())));

        engine.begin_edit("d1");
        engine.update_path(&path("display_name"), json!("Renamed"));
        let res = engine.commit().await;

        assert!(matches!(res, Err(CommitError::Remote(_))));
        assert_eq!(
            engine.device("d1").unwrap().display_name.as_deref(),
            Some("Renamed")
        );
        // the draft stays so the user can retry
        assert!(engine.draft().is_some());

        let notification = notifications.try_recv().unwrap();
        assert!(notification.message.contains("boom"));
    }

    #[tokio::test]
    async fn it_discards_the_draft() {
        before();
        let (engine, _remote) = engine_with(devices());
        engine.load_devices().await;
        let before_edit = engine.replica();

        engine.begin_edit("d1");
        engine.update_path(&path("display_name"), json!("Renamed"));
        engine.discard();

        assert_eq!(engine.draft(), None);
        assert_eq!(engine.replica(), before_edit);
    }
}
