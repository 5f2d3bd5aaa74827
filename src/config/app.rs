//! Node configuration built from the key-value store

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracker_shared::{limits, FrameworkError, FrameworkResult};

use super::store::ConfigStore;
use crate::connection::ConnectionConfig;
use crate::logging::LogLevel;

pub const DEFAULT_CONFIG_FILE: &str = "tracker.cfg";
pub const CONFIG_ENV: &str = "TRACKER_CONFIG";

/// Configuration for the tracker node
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Device identity; scopes every topic
    pub device_id: String,
    /// Broker address (`host:port`)
    pub broker_address: String,
    /// Directory holding the log file
    pub data_dir: PathBuf,
    /// Pause of the application loop between telemetry requests
    pub app_dwell: Duration,
    pub log_level: LogLevel,
    /// Mirror log records on stdout as well as the log file
    pub log_stdout: bool,
    pub reconnect_delay: Duration,
    pub keep_alive: Duration,
    pub subscribe_retry: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_id: "tracker-001".into(),
            broker_address: "127.0.0.1:1883".into(),
            data_dir: PathBuf::from("data"),
            app_dwell: Duration::from_millis(limits::APP_DWELL_DEFAULT_MS as u64),
            log_level: LogLevel::Info,
            log_stdout: true,
            reconnect_delay: Duration::from_secs(1),
            keep_alive: Duration::from_secs(10),
            subscribe_retry: Duration::from_millis(limits::SUBSCRIBE_RETRY_MS),
        }
    }
}

impl AppConfig {
    /// Read settings from `store`, keeping defaults for anything unset
    ///
    /// Malformed values fall back to their default. The broker address is
    /// kept as given and checked by [`validate`](Self::validate), so logging
    /// can come up before the settings are judged.
    pub fn read(store: &ConfigStore) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            store
                .get_int(key)
                .filter(|v| *v > 0)
                .map(|v| Duration::from_millis(v as u64))
                .unwrap_or(default)
        };

        let broker_address = store
            .get("BROKER_ADDRESS")
            .map(str::to_string)
            .unwrap_or(defaults.broker_address);

        let app_dwell = store
            .get_int("APP_DWELL_TIME_MS")
            .filter(|v| {
                (i64::from(limits::APP_DWELL_MIN_MS)..=i64::from(limits::APP_DWELL_MAX_MS))
                    .contains(v)
            })
            .map(|v| Duration::from_millis(v as u64))
            .unwrap_or(defaults.app_dwell);

        Self {
            device_id: store
                .get("DEVICE_ID")
                .map(str::to_string)
                .unwrap_or(defaults.device_id),
            broker_address,
            data_dir: store.get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            app_dwell,
            log_level: store
                .get("LOG_LEVEL")
                .and_then(LogLevel::parse)
                .unwrap_or(defaults.log_level),
            log_stdout: store.get("LOG_STDOUT").is_none() || store.get_bool("LOG_STDOUT", "TRUE"),
            reconnect_delay: millis("RECONNECT_DELAY_MS", defaults.reconnect_delay),
            keep_alive: millis("KEEP_ALIVE_MS", defaults.keep_alive),
            subscribe_retry: millis("SUBSCRIBE_RETRY_MS", defaults.subscribe_retry),
        }
    }

    /// A broker address without a valid port is `Fatal`
    pub fn validate(&self) -> FrameworkResult {
        validate_address(&self.broker_address)
    }

    /// Key-value pairs that reproduce this configuration when loaded
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DEVICE_ID", self.device_id.clone()),
            ("BROKER_ADDRESS", self.broker_address.clone()),
            ("DATA_DIR", self.data_dir.display().to_string()),
            ("APP_DWELL_TIME_MS", self.app_dwell.as_millis().to_string()),
            ("LOG_LEVEL", self.log_level.to_string()),
            ("LOG_STDOUT", if self.log_stdout { "TRUE" } else { "FALSE" }.to_string()),
            ("RECONNECT_DELAY_MS", self.reconnect_delay.as_millis().to_string()),
            ("KEEP_ALIVE_MS", self.keep_alive.as_millis().to_string()),
            ("SUBSCRIBE_RETRY_MS", self.subscribe_retry.as_millis().to_string()),
        ]
    }

    /// Transport settings for this node
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            client_id: self.device_id.clone(),
            broker_address: self.broker_address.clone(),
            reconnect_delay: self.reconnect_delay,
            keep_alive: self.keep_alive,
            read_timeout: self.keep_alive * 2 + Duration::from_secs(5),
            ..Default::default()
        }
    }
}

fn validate_address(address: &str) -> FrameworkResult {
    let valid = address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());

    if valid {
        Ok(())
    } else {
        Err(FrameworkError::fatal(format!(
            "broker address '{}' is not host:port",
            address
        )))
    }
}

/// Configuration file from the first argument, then `TRACKER_CONFIG`
pub fn config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE).to_path_buf())
}
