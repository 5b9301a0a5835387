use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::state::models::{Device, DeviceSettings, UserPreferences};
use crate::state::{Cursor, IconUpdate, IconUpload, RawEnvelope, Remote, RemoteError};
use crate::util::http::{Client, ClientError, Form, InvalidUriError, Part, StatusCode, Uri};
use crate::util::types::{DeviceId, UserId};

use super::config::RemoteConfig;

fn into_remote_error(err: ClientError) -> RemoteError {
    match err {
        ClientError::Response(StatusCode::NOT_FOUND, reason) => RemoteError::NotFound(reason),
        ClientError::Response(StatusCode::CONFLICT, reason) => RemoteError::Conflict(reason),
        ClientError::Response(status, reason) => RemoteError::Status(status.as_u16(), reason),
        ClientError::Server(e) if e.is_decode() => RemoteError::Decode(e.to_string()),
        err => RemoteError::Transport(err.to_string()),
    }
}

fn invalid_uri(err: InvalidUriError) -> RemoteError {
    RemoteError::Transport(format!("invalid uri: {err}"))
}

/// Version of a device record.
///
/// The backend lists records without a stored version as version 0.
fn record_version(device: &Device) -> i64 {
    device
        .extra
        .get("version")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    result_list: Option<Vec<Value>>,
}

/// [`Remote`] backed by the device backend REST API
#[derive(Debug, Clone)]
pub struct HttpRemote {
    endpoint: Uri,
    client: Client,
}

impl HttpRemote {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            endpoint: config.api_endpoint,
            client: Client::new(Some(config.request_timeout)),
        }
    }

    /// Build a backend URI, keeping any path prefix of the endpoint
    fn uri(&self, path: &str, query: Option<&str>) -> Result<Uri, RemoteError> {
        let prefix = self.endpoint.path().trim_end_matches('/');
        Uri::from_parts(self.endpoint.clone(), &format!("{prefix}/api{path}"), query)
            .map_err(invalid_uri)
    }
}

impl Remote for HttpRemote {
    #[instrument(skip_all, err)]
    async fn fetch_all_devices(&self) -> Result<Vec<Value>, RemoteError> {
        let uri = self.uri("/devices", None)?;
        let list: DeviceList = self.client.get(&uri).await.map_err(into_remote_error)?;
        let devices = list.result_list.unwrap_or_default();
        debug!(total = devices.len(), "fetched devices");
        Ok(devices)
    }

    #[instrument(skip_all, fields(since = %since), err)]
    async fn fetch_updates(&self, since: &Cursor) -> Result<RawEnvelope, RemoteError> {
        let query = format!("lastUpdate={since}");
        let uri = self.uri("/devices/check-updates", Some(&query))?;
        let envelope: RawEnvelope = self.client.get(&uri).await.map_err(into_remote_error)?;
        trace!(needs_update = envelope.needs_update, "fetched updates");
        Ok(envelope)
    }

    #[instrument(skip_all, fields(device_id = %id), err)]
    async fn submit_device_update(
        &self,
        id: &DeviceId,
        device: &Device,
    ) -> Result<Device, RemoteError> {
        // the backend addresses device records by their document key and
        // rejects writes based on an outdated record version
        let key = device
            .extra
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or(id.as_str());
        let version = record_version(device);
        let uri = self.uri(&format!("/devices/{key}"), Some(&format!("version={version}")))?;

        let res: Value = self
            .client
            .put(&uri, device)
            .await
            .map_err(into_remote_error)?;

        // the backend may reply with the stored record or just a message
        Ok(Device::from_document(res).unwrap_or_else(|_| {
            let mut saved = device.clone();
            saved.extra.insert("version".to_owned(), Value::from(version + 1));
            saved
        }))
    }

    #[instrument(skip_all, fields(device_id = %id), err)]
    async fn fetch_device_settings(&self, id: &DeviceId) -> Result<DeviceSettings, RemoteError> {
        let uri = self.uri(&format!("/devices/{id}/settings"), None)?;
        self.client.get(&uri).await.map_err(into_remote_error)
    }

    #[instrument(skip_all, fields(device_id = %settings.device_id), err)]
    async fn submit_device_settings(
        &self,
        settings: &DeviceSettings,
    ) -> Result<DeviceSettings, RemoteError> {
        let uri = self.uri(&format!("/devices/{}/settings", settings.device_id), None)?;
        self.client
            .put(&uri, settings)
            .await
            .map_err(into_remote_error)
    }

    #[instrument(skip_all, fields(device_id = %id), err)]
    async fn upload_icon(&self, id: &DeviceId, icon: IconUpload) -> Result<IconUpdate, RemoteError> {
        let uri = self.uri(&format!("/devices/{id}/icon"), None)?;
        let form = match icon {
            IconUpload::Asset(asset) => {
                let mut part = Part::bytes(asset.bytes).file_name(asset.file_name);
                if let Some(content_type) = asset.content_type {
                    part = part
                        .mime_str(&content_type)
                        .map_err(|e| RemoteError::Transport(e.to_string()))?;
                }
                Form::new().part("file", part)
            }
            IconUpload::Default(name) => Form::new().text("defaultIcon", name),
        };

        self.client
            .post_form(&uri, form)
            .await
            .map_err(into_remote_error)
    }

    #[instrument(skip_all, fields(device_id = %id), err)]
    async fn remove_icon(&self, id: &DeviceId) -> Result<IconUpdate, RemoteError> {
        let uri = self.uri(&format!("/devices/{id}/icon"), Some("remove=true"))?;
        self.client
            .post_form(&uri, Form::new())
            .await
            .map_err(into_remote_error)
    }

    #[instrument(skip_all, fields(user_id = %user), err)]
    async fn fetch_user_preferences(&self, user: &UserId) -> Result<UserPreferences, RemoteError> {
        let uri = self.uri(&format!("/users/{user}/preferences"), None)?;
        self.client.get(&uri).await.map_err(into_remote_error)
    }

    #[instrument(skip_all, fields(user_id = %prefs.user_id), err)]
    async fn submit_user_preferences(
        &self,
        prefs: &UserPreferences,
    ) -> Result<UserPreferences, RemoteError> {
        let uri = self.uri(&format!("/users/{}/preferences", prefs.user_id), None)?;
        self.client
            .post(&uri, prefs)
            .await
            .map_err(into_remote_error)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::state::IconAsset;
    use crate::state::models::Unit;

    fn remote(server: &Server) -> HttpRemote {
        HttpRemote::new(RemoteConfig {
            api_endpoint: server.url().parse().unwrap(),
            request_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn it_fetches_all_devices() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/devices")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"result_list": [{"device_id": "d1"}, {"device_id": "d2"}]}).to_string(),
            )
            .create_async()
            .await;

        let devices = remote(&server).fetch_all_devices().await.unwrap();

        assert_eq!(devices, vec![json!({"device_id": "d1"}), json!({"device_id": "d2"})]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_keeps_the_endpoint_path_prefix() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/backend/api/devices")
            .with_status(200)
            .with_body(r#"{"result_list": [{"device_id": "d1"}]}"#)
            .create_async()
            .await;

        let remote = HttpRemote::new(RemoteConfig {
            api_endpoint: format!("{}/backend/", server.url()).parse().unwrap(),
            request_timeout: Duration::from_secs(5),
        });
        let devices = remote.fetch_all_devices().await.unwrap();

        assert_eq!(devices, vec![json!({"device_id": "d1"})]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_reads_an_empty_device_list() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/devices")
            .with_status(200)
            .with_body(r#"{"result_list": null}"#)
            .create_async()
            .await;

        let devices = remote(&server).fetch_all_devices().await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn it_fetches_updates_since_the_cursor() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/devices/check-updates")
            .match_query(Matcher::UrlEncoded(
                "lastUpdate".into(),
                "2024-05-01T08:20:30Z".into(),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "needsUpdate": true,
                    "lastUpdate": "2024-05-01T08:21:00Z",
                    "updatedDevices": [{"device_id": "d1", "online": true}],
                    "iconMap": {"d1": "/icons/d1.png"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let since: Cursor = "2024-05-01T08:20:30Z".parse().unwrap();
        let envelope = remote(&server).fetch_updates(&since).await.unwrap();

        assert!(envelope.needs_update);
        assert_eq!(envelope.last_update, "2024-05-01T08:21:00Z");
        assert_eq!(envelope.updated_devices.map(|d| d.len()), Some(1));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_submits_device_updates_with_the_record_version() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/devices/66a0aaaaaaaaaaaaaaaaaaaa")
            .match_query(Matcher::UrlEncoded("version".into(), "3".into()))
            .match_body(Matcher::PartialJson(
                json!({"device_id": "d1", "display_name": "Truck"}),
            ))
            .with_status(200)
            .with_body(r#"{"message": "Device updated successfully"}"#)
            .create_async()
            .await;

        let mut device = Device::new("d1");
        device.display_name = Some("Truck".to_owned());
        device
            .extra
            .insert("_id".to_owned(), json!("66a0aaaaaaaaaaaaaaaaaaaa"));
        device.extra.insert("version".to_owned(), json!(3));

        let saved = remote(&server)
            .submit_device_update(&device.device_id, &device)
            .await
            .unwrap();

        // the backend bumps the version of the stored record
        assert_eq!(saved.extra.get("version"), Some(&json!(4)));
        assert_eq!(saved.display_name.as_deref(), Some("Truck"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_falls_back_to_the_device_id_and_version_zero() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/devices/d1")
            .match_query(Matcher::UrlEncoded("version".into(), "0".into()))
            .with_status(200)
            .with_body(json!({"device_id": "d1", "display_name": "Van", "version": 1}).to_string())
            .create_async()
            .await;

        let device = Device::new("d1");
        let saved = remote(&server)
            .submit_device_update(&device.device_id, &device)
            .await
            .unwrap();

        assert_eq!(saved.display_name.as_deref(), Some("Van"));
        assert_eq!(saved.extra.get("version"), Some(&json!(1)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_reads_the_icon_map_under_the_backend_key() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/devices/check-updates")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "needsUpdate": false,
                    "lastUpdate": "2024-05-01T08:21:00Z",
                    "icon_map": {"d1": "/icons/d1.png"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let since: Cursor = "2024-05-01T08:20:30Z".parse().unwrap();
        let envelope = remote(&server).fetch_updates(&since).await.unwrap();

        let icons = envelope.icon_map.unwrap();
        assert_eq!(icons.get("d1").map(String::as_str), Some("/icons/d1.png"));
        assert_eq!(envelope.updated_devices, None);
    }

    #[tokio::test]
    async fn it_maps_missing_settings_to_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/devices/d1/settings")
            .with_status(404)
            .with_body(r#"{"error": "not found"}"#)
            .create_async()
            .await;

        let err = remote(&server)
            .fetch_device_settings(&"d1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn it_maps_version_mismatches_to_conflicts() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/api/devices/d1/settings")
            .with_status(409)
            .with_body(r#"{"error": "Outdated settings version"}"#)
            .create_async()
            .await;

        let err = remote(&server)
            .submit_device_settings(&DeviceSettings::new("d1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(_)));
    }

    #[tokio::test]
    async fn it_reports_other_failures_with_their_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/devices")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = remote(&server).fetch_all_devices().await.unwrap_err();
        assert_eq!(err, RemoteError::Status(500, "boom".to_owned()));
    }

    #[tokio::test]
    async fn it_reports_malformed_responses_as_decode_errors() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/devices/d1/settings")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = remote(&server)
            .fetch_device_settings(&"d1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn it_uploads_icon_files() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/devices/d1/icon")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".into()),
            )
            .match_body(Matcher::Regex(r#"name="file"; filename="truck.png""#.into()))
            .with_status(200)
            .with_body(r#"{"iconUrl": "/uploads/d1.png", "version": 4, "message": "ok"}"#)
            .create_async()
            .await;

        let update = remote(&server)
            .upload_icon(
                &"d1".into(),
                IconUpload::Asset(IconAsset {
                    file_name: "truck.png".to_owned(),
                    content_type: Some("image/png".to_owned()),
                    bytes: b"png".to_vec(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            update,
            IconUpdate {
                icon_url: Some("/uploads/d1.png".to_owned()),
                version: Some(4)
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_selects_default_icons() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/devices/d1/icon")
            .match_body(Matcher::Regex(r#"name="defaultIcon""#.into()))
            .with_status(200)
            .with_body(r#"{"iconUrl": "/icons/bus.png", "message": "Default icon set successfully"}"#)
            .create_async()
            .await;

        let update = remote(&server)
            .upload_icon(&"d1".into(), IconUpload::Default("/icons/bus.png".to_owned()))
            .await
            .unwrap();

        assert_eq!(update.icon_url.as_deref(), Some("/icons/bus.png"));
        assert_eq!(update.version, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_removes_icons() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/devices/d1/icon")
            .match_query(Matcher::UrlEncoded("remove".into(), "true".into()))
            .with_status(200)
            .with_body(r#"{"message": "Icon removed successfully"}"#)
            .create_async()
            .await;

        let update = remote(&server).remove_icon(&"d1".into()).await.unwrap();

        assert_eq!(update, IconUpdate::default());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_stores_user_preferences() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/users/alice/preferences")
            .match_body(Matcher::PartialJson(json!({"userId": "alice", "unit": "metric"})))
            .with_status(200)
            .with_body(
                json!({"userId": "alice", "version": 1, "DeviceListWidth": 400, "unit": "metric"})
                    .to_string(),
            )
            .create_async()
            .await;

        let mut prefs = UserPreferences::new("alice".into());
        prefs.unit = Unit::Metric;
        let saved = remote(&server)
            .submit_user_preferences(&prefs)
            .await
            .unwrap();

        assert_eq!(saved.version, 1);
        assert_eq!(saved.unit, Unit::Metric);
        mock.assert_async().await;
    }
}
