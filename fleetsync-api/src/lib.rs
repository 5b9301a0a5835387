use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, Response, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::io;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};
use std::path;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tower_http::trace::TraceLayer;
use tracing::{
    Span, debug_span,
    field::{Empty, display},
    info, instrument,
};

use fleetsync_state::models::Device;
use fleetsync_state::{Cursor, Engine, Remote};

pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// Local API listen address
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum LocalAddress {
    Tcp(SocketAddr),
    Unix(path::PathBuf),
}

impl Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddress::Tcp(socket_addr) => socket_addr.fmt(f),
            LocalAddress::Unix(path) => path.as_path().display().fmt(f),
        }
    }
}

impl FromStr for LocalAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(LocalAddress::Tcp)
            .or_else(|_| Ok(LocalAddress::Unix(path::Path::new(s).to_path_buf())))
    }
}

impl Default for LocalAddress {
    fn default() -> Self {
        LocalAddress::Tcp(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            48485,
        ))
    }
}

impl LocalAddress {
    /// Bind a listener to this address
    pub async fn bind(&self) -> io::Result<Listener> {
        match self {
            LocalAddress::Tcp(addr) => TcpListener::bind(addr).await.map(Listener::Tcp),
            LocalAddress::Unix(path) => UnixListener::bind(path).map(Listener::Unix),
        }
    }
}

/// A replica entry as exposed by the API, including the local
/// visibility flag
#[derive(Serialize, Debug)]
struct DeviceView {
    #[serde(flatten)]
    device: Device,
    visible: bool,
}

impl From<Device> for DeviceView {
    fn from(device: Device) -> Self {
        let visible = device.visible;
        Self { device, visible }
    }
}

#[derive(Serialize, Debug)]
struct SyncStatus {
    polling: bool,
    loading: bool,
    devices: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
}

/// Start the API
///
/// Receives a listener already bound to the right address and the engine
/// whose replica is exposed.
#[instrument(name = "api", skip_all)]
pub async fn start<R: Remote>(listener: Listener, engine: Engine<R>) -> io::Result<()> {
    let api_span = Span::current();
    let app = Router::new()
        .route("/v1/ping", get(|| async { "OK" }))
        .route("/v1/status", get(sync_status::<R>))
        .route("/v1/devices", get(list_devices::<R>))
        .route("/v1/devices/{id}", get(get_device::<R>))
        .route("/v1/poll", post(trigger_poll::<R>));

    // Enable tracing
    let app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(move |request: &Request<Body>| {
                debug_span!(parent: &api_span, "request",
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                    status = Empty,
                )
            })
            .on_response(|response: &Response<Body>, _: Duration, span: &Span| {
                span.record("status", display(response.status()));
            }),
    );

    let app = app.with_state(engine);

    info!("ready");

    match listener {
        Listener::Tcp(listener) => axum::serve(listener, app).await,
        Listener::Unix(listener) => axum::serve(listener, app).await,
    }
}

/// Handle `GET /v1/status`
async fn sync_status<R: Remote>(State(engine): State<Engine<R>>) -> Json<SyncStatus> {
    Json(SyncStatus {
        polling: engine.is_polling(),
        loading: engine.is_loading(),
        devices: engine.replica().len(),
        cursor: engine.cursor().as_ref().map(Cursor::to_string),
    })
}

/// Handle `GET /v1/devices`
///
/// Returns the replica in order
async fn list_devices<R: Remote>(State(engine): State<Engine<R>>) -> Json<Vec<DeviceView>> {
    let devices = engine.replica().into_inner();
    Json(devices.into_iter().map(DeviceView::from).collect())
}

/// Handle `GET /v1/devices/{id}`
async fn get_device<R: Remote>(
    State(engine): State<Engine<R>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    engine
        .device(&id)
        .map(|device| Json(device.into()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Handle `POST /v1/poll`
///
/// Runs a poll cycle in the background
async fn trigger_poll<R: Remote>(State(engine): State<Engine<R>>) -> StatusCode {
    if !engine.is_polling() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    engine.trigger_poll();
    StatusCode::ACCEPTED
}
