//! Process configuration from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crcon::BackoffConfig;

use crate::{Error, Result};

const STORE_PATH: &str = "VOTEWHEEL_STORE_PATH";
const MAX_WS_CONNECTION_ATTEMPTS: &str = "VOTEWHEEL_MAX_WS_CONNECTION_ATTEMPTS";
const BACKOFF_INITIAL_DELAY: &str = "VOTEWHEEL_BACKOFF_INITIAL_DELAY";
const BACKOFF_MIN_DELAY: &str = "VOTEWHEEL_BACKOFF_MIN_DELAY";
const BACKOFF_MAX_DELAY: &str = "VOTEWHEEL_BACKOFF_MAX_DELAY";
const BACKOFF_FACTOR: &str = "VOTEWHEEL_BACKOFF_FACTOR";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where the server records live.
    pub store_path: PathBuf,
    pub max_websocket_connection_attempts: Option<u32>,
    /// Reconnect pacing for the log-stream clients.
    pub backoff: BackoffConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let store_path = match env::var(STORE_PATH) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => default_store_path()?,
        };

        let max_attempts = parse_var::<u32>(MAX_WS_CONNECTION_ATTEMPTS)?;

        let mut backoff = BackoffConfig::default();
        if let Some(value) = parse_var::<f64>(BACKOFF_INITIAL_DELAY)? {
            backoff.initial_delay = value;
        }
        if let Some(value) = parse_var::<f64>(BACKOFF_MIN_DELAY)? {
            backoff.min_delay = value;
        }
        if let Some(value) = parse_var::<f64>(BACKOFF_MAX_DELAY)? {
            backoff.max_delay = value;
        }
        if let Some(value) = parse_var::<f64>(BACKOFF_FACTOR)? {
            backoff.factor = value;
        }
        backoff.max_attempts = max_attempts;

        Ok(Self {
            store_path,
            max_websocket_connection_attempts: max_attempts,
            backoff,
        })
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::validation(format!("{name}={value} is not a valid value"))),
        _ => Ok(None),
    }
}

fn default_store_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("votewheel").join("servers.json"))
        .ok_or_else(|| {
            Error::validation(format!(
                "no data directory available; set {STORE_PATH}"
            ))
        })
}
