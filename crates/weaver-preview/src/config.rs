use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Preview pacing and sync configuration.
///
/// All durations are stored in milliseconds so the file formats stay plain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Poll cadence of the local render runner.
    pub refresh_rate_ms: u64,
    /// Poll cadence of the server render runner.
    pub server_refresh_rate_ms: u64,
    /// Busy indicator delay for local renders.
    pub view_busy_delay_ms: u64,
    /// Busy indicator delay for server renders (default: twice the server refresh rate).
    pub server_busy_delay_ms: u64,
    pub sync_busy_delay_ms: u64,
    pub export_busy_delay_ms: u64,
    /// Hold off local renders while the user is still typing.
    pub delayed_update: bool,
    pub delayed_update_threshold_ms: u64,
    pub disable_server: bool,
    /// Start with the local runner paused.
    pub disable_auto_update: bool,
    pub auto_sync: bool,
    pub auto_sync_tick_ms: u64,
    /// Minimum time between automatic syncs.
    pub auto_sync_interval_ms: u64,
    /// Required quiet time since the last edit before an automatic sync.
    pub auto_sync_idle_ms: u64,
    pub merge_expiry_ms: u64,
    /// Byte cap of the persisted session snapshot.
    pub snapshot_limit: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 500,
            server_refresh_rate_ms: 2500,
            view_busy_delay_ms: 750,
            server_busy_delay_ms: 5000,
            sync_busy_delay_ms: 100,
            export_busy_delay_ms: 1000,
            delayed_update: false,
            delayed_update_threshold_ms: 1000,
            disable_server: false,
            disable_auto_update: false,
            auto_sync: true,
            auto_sync_tick_ms: 5000,
            auto_sync_interval_ms: 30_000,
            auto_sync_idle_ms: 5000,
            merge_expiry_ms: 60_000,
            snapshot_limit: 1024 * 1024,
        }
    }
}

macro_rules! duration_getters {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) -> Duration {
                Duration::from_millis(self.$field)
            }
        )*
    };
}

impl PreviewConfig {
    duration_getters! {
        refresh_rate => refresh_rate_ms,
        server_refresh_rate => server_refresh_rate_ms,
        view_busy_delay => view_busy_delay_ms,
        server_busy_delay => server_busy_delay_ms,
        sync_busy_delay => sync_busy_delay_ms,
        export_busy_delay => export_busy_delay_ms,
        delayed_update_threshold => delayed_update_threshold_ms,
        auto_sync_tick => auto_sync_tick_ms,
        auto_sync_interval => auto_sync_interval_ms,
        auto_sync_idle => auto_sync_idle_ms,
        merge_expiry => merge_expiry_ms,
    }

    /// Defaults overridden by environment variables.
    ///
    /// Optional env vars:
    /// - `PREVIEW_REFRESH_MS`, `PREVIEW_SERVER_REFRESH_MS`
    /// - `PREVIEW_DELAYED_UPDATE` (`true`/`false`)
    /// - `PREVIEW_DISABLE_SERVER` (`true`/`false`)
    /// - `PREVIEW_AUTO_SYNC` (`true`/`false`)
    /// - `PREVIEW_AUTO_SYNC_INTERVAL_MS`
    /// - `PREVIEW_SNAPSHOT_LIMIT` (bytes)
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env(self) -> Self {
        fn env<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok().and_then(|s| s.parse().ok())
        }

        Self {
            refresh_rate_ms: env("PREVIEW_REFRESH_MS").unwrap_or(self.refresh_rate_ms),
            server_refresh_rate_ms: env("PREVIEW_SERVER_REFRESH_MS")
                .unwrap_or(self.server_refresh_rate_ms),
            delayed_update: env("PREVIEW_DELAYED_UPDATE").unwrap_or(self.delayed_update),
            disable_server: env("PREVIEW_DISABLE_SERVER").unwrap_or(self.disable_server),
            auto_sync: env("PREVIEW_AUTO_SYNC").unwrap_or(self.auto_sync),
            auto_sync_interval_ms: env("PREVIEW_AUTO_SYNC_INTERVAL_MS")
                .unwrap_or(self.auto_sync_interval_ms),
            snapshot_limit: env("PREVIEW_SNAPSHOT_LIMIT").unwrap_or(self.snapshot_limit),
            ..self
        }
    }

    /// Load from a `.json` or `.toml` file. Missing keys take their defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(path, &data)
    }

    /// Parse file contents, picking the format from the extension of `path`.
    pub fn parse(path: &Path, data: &str) -> Result<Self, ConfigError> {
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(data).map_err(|e| parse_err(e.to_string())),
            Some("toml") => toml::from_str(data).map_err(|e| parse_err(e.to_string())),
            _ => Err(ConfigError::Format {
                path: path.to_path_buf(),
            }),
        }
    }
}
