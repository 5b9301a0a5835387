use clap::Parser;
use std::num::ParseIntError;
use std::time::Duration;

use crate::api::LocalAddress;
use crate::util::http::Uri;
use crate::util::types::UserId;

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Device backend endpoint URI, requests go to `<uri>/api/...`
    #[arg(
        env = "FLEETSYNC_API_ENDPOINT",
        long = "api-endpoint",
        value_name = "uri"
    )]
    pub api_endpoint: Option<Uri>,

    /// User whose preferences are synchronized
    #[arg(env = "FLEETSYNC_USER_ID", long = "user-id", value_name = "id")]
    pub user_id: Option<UserId>,

    /// Incremental update poll interval in milliseconds
    #[arg(
        env = "FLEETSYNC_POLL_INTERVAL_MS",
        long = "poll-interval-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub poll_interval: Option<Duration>,

    /// Backend request timeout in milliseconds
    #[arg(
        env = "FLEETSYNC_REQUEST_TIMEOUT_MS",
        long = "request-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub request_timeout: Option<Duration>,

    /// Local API listen address
    #[arg(
        env = "FLEETSYNC_LOCAL_API_ADDRESS",
        long = "local-api-address",
        value_name = "addr"
    )]
    pub local_api_address: Option<LocalAddress>,

    /// Do not persist the resulting configuration
    #[arg(long = "no-store")]
    pub no_store: bool,
}

pub fn parse() -> Cli {
    Parser::parse()
}
