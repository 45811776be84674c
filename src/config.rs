//! Client configuration.
//!
//! [`ConnectionConfig`] is the validated set of connection parameters the
//! client works from. [`Config`] is the TOML file layout used by the
//! `cachelink` binary.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Timeout for establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must be non-zero")]
    InvalidPort,
}

/// Connection parameters for a single cache server.
///
/// An empty password is treated as no password, so no AUTH is sent.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    password: Option<String>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let host = host.into();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        Ok(Self {
            host,
            port,
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            connect_timeout: CONNECT_TIMEOUT,
            command_timeout: None,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound each read and write on the connection. `None` blocks indefinitely.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// Configuration file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Cache server to connect to.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Cache server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Password sent with AUTH after connecting.
    #[serde(default)]
    pub password: Option<String>,

    /// Connection timeout in milliseconds.
    #[serde(default = "ServerConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read/write timeout in milliseconds. Unset means no timeout.
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            password: None,
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            command_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        6379
    }

    fn default_connect_timeout_ms() -> u64 {
        CONNECT_TIMEOUT.as_millis() as u64
    }

    /// Validate and convert into connection parameters.
    pub fn connection(&self) -> Result<ConnectionConfig, ConfigError> {
        Ok(
            ConnectionConfig::new(self.host.as_str(), self.port, self.password.as_deref())?
                .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
                .with_command_timeout(self.command_timeout_ms.map(Duration::from_millis)),
        )
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Log format: "pretty", "compact", or "json".
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn connection_config_defaults() {
        let config = ConnectionConfig::new("localhost", 6379, None).unwrap();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 6379);
        assert_eq!(config.password(), None);
        assert_eq!(config.connect_timeout(), Duration::from_millis(1500));
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn connection_config_rejects_empty_host() {
        assert!(matches!(
            ConnectionConfig::new("", 6379, None),
            Err(ConfigError::EmptyHost)
        ));
    }

    #[test]
    fn connection_config_rejects_port_zero() {
        assert!(matches!(
            ConnectionConfig::new("localhost", 0, None),
            Err(ConfigError::InvalidPort)
        ));
    }

    #[test]
    fn empty_password_is_no_password() {
        let config = ConnectionConfig::new("localhost", 6379, Some("")).unwrap();
        assert_eq!(config.password(), None);

        let config = ConnectionConfig::new("localhost", 6379, Some("secret")).unwrap();
        assert_eq!(config.password(), Some("secret"));
    }

    #[test]
    fn debug_redacts_password() {
        let config = ConnectionConfig::new("localhost", 6379, Some("secret")).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 6379);
        assert_eq!(config.server.connect_timeout_ms, 1500);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "cache.internal"
            port = 6380
            password = "hunter2"
            connect_timeout_ms = 250
            command_timeout_ms = 1000

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        let conn = config.server.connection().unwrap();
        assert_eq!(conn.host(), "cache.internal");
        assert_eq!(conn.port(), 6380);
        assert_eq!(conn.password(), Some("hunter2"));
        assert_eq!(conn.connect_timeout(), Duration::from_millis(250));
        assert_eq!(conn.command_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        assert!(toml::from_str::<Config>("[server]\nhostname = \"x\"\n").is_err());
    }

    #[test]
    fn server_config_validates() {
        let server = ServerConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(server.connection(), Err(ConfigError::EmptyHost)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 7000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
