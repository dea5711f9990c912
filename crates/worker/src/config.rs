//! Worker configuration loaded from environment variables.

use std::time::Duration;

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: inspection server bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory storage when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `TASK_POLL_INTERVAL_MS`: how often each task name is polled (default `500`)
/// - `TASK_EXPORT_INTERVAL_MS`: how often finished transactions are exported (default `500`)
/// - `TASK_RETRY_INTERVAL_SECS`: idle time before a Running task is retried (default `600`)
/// - `TASK_ABORT_INTERVAL_SECS`: idle time before an exhausted task is aborted (default `600`)
/// - `REEXPORT_INTERVAL_SECS`: age of a stuck export claim before it is released (default `600`)
/// - `SWEEP_INTERVAL_SECS`: cadence of the expire/retry/abort/re-export sweep (default `60`)
/// - `RETURN_WINDOW_DAYS`: how long after the order date a return is accepted (default `30`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub task_poll_interval: Duration,
    pub task_export_interval: Duration,
    pub task_retry_interval: Duration,
    pub task_abort_interval: Duration,
    pub reexport_interval: Duration,
    pub sweep_interval: Duration,
    pub return_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup; unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|value| value.parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            task_poll_interval: millis("TASK_POLL_INTERVAL_MS", defaults.task_poll_interval),
            task_export_interval: millis("TASK_EXPORT_INTERVAL_MS", defaults.task_export_interval),
            task_retry_interval: secs("TASK_RETRY_INTERVAL_SECS", defaults.task_retry_interval),
            task_abort_interval: secs("TASK_ABORT_INTERVAL_SECS", defaults.task_abort_interval),
            reexport_interval: secs("REEXPORT_INTERVAL_SECS", defaults.reexport_interval),
            sweep_interval: secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            return_window: parsed("RETURN_WINDOW_DAYS")
                .map(|days| Duration::from_secs(days * 24 * 60 * 60))
                .unwrap_or(defaults.return_window),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            task_poll_interval: Duration::from_millis(500),
            task_export_interval: Duration::from_millis(500),
            task_retry_interval: Duration::from_secs(600),
            task_abort_interval: Duration::from_secs(600),
            reexport_interval: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            return_window: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}
