use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a query server instance.
///
/// This structure defines where the server binds, how long shutdown waits for
/// active connections, and how the HTTP surface is routed. All fields have
/// sensible defaults, so a configuration file only needs to name the settings
/// it overrides.
///
/// # JSON Schema
///
/// The configuration follows this JSON schema (all keys optional):
///
/// ```json
/// {
///   "host": "127.0.0.1",
///   "port": 4000,
///   "stopGracePeriodMillis": 10000,
///   "corsOrigin": "*",
///   "queryPath": "/query",
///   "healthCheckPath": "/.well-known/server-health"
/// }
/// ```
///
/// `stopGracePeriodMillis` accepts `null` to mean an infinite grace period:
/// shutdown then waits indefinitely for active connections to finish and never
/// destroys a socket. A value of `0` destroys all active connections
/// immediately on stop.
///
/// # Examples
///
/// ```
/// use query_host::config::ServerConfig;
///
/// let config = ServerConfig::parse_from_str(r#"{"port": 0}"#).unwrap();
/// assert_eq!(config.stop_grace_period_millis, Some(10_000));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host or IP address to bind the listener to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind. `0` asks the OS for an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long `stop` waits for an active connection before destroying its
    /// socket, in milliseconds. `None` means wait forever.
    #[serde(default = "default_grace", rename = "stopGracePeriodMillis")]
    pub stop_grace_period_millis: Option<u64>,

    /// Value reflected in the `access-control-allow-origin` response header.
    #[serde(default = "default_cors_origin", rename = "corsOrigin")]
    pub cors_origin: String,

    /// Route that accepts query requests (and serves the landing page to
    /// HTML-preferring clients).
    #[serde(default = "default_query_path", rename = "queryPath")]
    pub query_path: String,

    /// Route that answers health-check probes.
    #[serde(default = "default_health_check_path", rename = "healthCheckPath")]
    pub health_check_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_grace() -> Option<u64> {
    Some(10_000)
}

fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_query_path() -> String {
    "/query".to_string()
}

fn default_health_check_path() -> String {
    "/.well-known/server-health".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stop_grace_period_millis: default_grace(),
            cors_origin: default_cors_origin(),
            query_path: default_query_path(),
            health_check_path: default_health_check_path(),
        }
    }
}

impl ServerConfig {
    /// Loads a configuration from a file path.
    ///
    /// This method reads the file at the specified path and parses its contents
    /// as a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON
    /// * The parsed values fail validation (see [`validate_config`])
    ///
    /// [`validate_config`]: crate::config::validate_config
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The string is not valid JSON
    /// * The parsed values fail validation (see [`validate_config`])
    ///
    /// [`validate_config`]: crate::config::validate_config
    pub fn parse_from_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))?;

        super::validator::validate_config(&config)?;
        Ok(config)
    }

    /// The grace period as a [`Duration`], or `None` for an infinite grace
    /// period.
    pub fn grace_period(&self) -> Option<Duration> {
        self.stop_grace_period_millis.map(Duration::from_millis)
    }
}
