//! Connection configuration
//!
//! Plain serde-deriving structs; how they are loaded (JSON file, env,
//! hardcoded) is the embedding application's concern. All durations are
//! stored as milliseconds with `Duration` accessors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for a sentinel-backed connection
///
/// # Example
///
/// ```rust
/// use sentinel_client::{ConnectionConfig, SentinelEndpoint};
///
/// let config = ConnectionConfig::new("mymaster")
///     .with_sentinel(SentinelEndpoint::new("sentinel-1.internal"))
///     .with_sentinel(SentinelEndpoint::new("sentinel-2.internal").with_port(26380))
///     .with_retry_attempts(10)
///     .with_retry_delay(std::time::Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Sentinel endpoints, tried in declared order during discovery
    #[serde(default)]
    pub sentinels: Vec<SentinelEndpoint>,

    /// Service name the sentinels track (default: "mymaster")
    #[serde(default = "default_service")]
    pub service: String,

    /// Username for the resolved master, if ACLs are in use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for the resolved master
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database index selected after connecting (default: 0)
    #[serde(default)]
    pub database: i64,

    /// TLS options for the master connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,

    /// Timeout for connecting to the resolved master, in milliseconds
    /// (default: 5000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Retry attempts for data-plane commands (default: 20)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between data-plane retries, in milliseconds (default: 1000)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Retry attempts for the initial connect (default: 20)
    ///
    /// Kept separate from `retry_attempts`: at first connect the backend
    /// may still be electing a master, so a larger budget can make sense.
    #[serde(default = "default_retry_attempts")]
    pub connector_retry_attempts: u32,

    /// Delay between initial-connect retries, in milliseconds
    /// (default: 1000)
    #[serde(default = "default_retry_delay_ms")]
    pub connector_retry_delay_ms: u64,
}

/// A single sentinel endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelEndpoint {
    /// Host name or IP address
    pub host: String,

    /// Port (default: 26379)
    #[serde(default = "default_sentinel_port")]
    pub port: u16,

    /// Per-query timeout in milliseconds (default: 200)
    ///
    /// Deliberately short and independent of the data-plane retry delay so
    /// a single discovery attempt cannot hang indefinitely.
    #[serde(default = "default_sentinel_timeout_ms")]
    pub timeout_ms: u64,

    /// Username for sentinel authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for sentinel authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// TLS options for the sentinel connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
}

/// TLS settings for a sentinel or master connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Skip certificate verification (default: false)
    #[serde(default)]
    pub insecure: bool,
}

fn default_service() -> String {
    "mymaster".to_string()
}

fn default_sentinel_port() -> u16 {
    26379
}

fn default_sentinel_timeout_ms() -> u64 {
    200
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    20
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            sentinels: Vec::new(),
            service: default_service(),
            username: None,
            password: None,
            database: 0,
            tls: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            connector_retry_attempts: default_retry_attempts(),
            connector_retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for the given sentinel service name
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    /// Append a sentinel endpoint (endpoints are tried in insertion order)
    pub fn with_sentinel(mut self, endpoint: SentinelEndpoint) -> Self {
        self.sentinels.push(endpoint);
        self
    }

    /// Set master credentials
    pub fn with_auth(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    /// Set the database index
    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Set TLS options for the master connection
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the master connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the data-plane retry attempt count
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the data-plane retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the initial-connect retry attempt count
    pub fn with_connector_retry_attempts(mut self, attempts: u32) -> Self {
        self.connector_retry_attempts = attempts;
        self
    }

    /// Set the initial-connect retry delay
    pub fn with_connector_retry_delay(mut self, delay: Duration) -> Self {
        self.connector_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Master connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Retry policy for data-plane commands
    pub fn command_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    /// Retry policy for the initial connect
    pub fn connector_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connector_retry_attempts,
            Duration::from_millis(self.connector_retry_delay_ms),
        )
    }
}

impl SentinelEndpoint {
    /// Create an endpoint for the given host with default port and timeout
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_sentinel_port(),
            timeout_ms: default_sentinel_timeout_ms(),
            username: None,
            password: None,
            tls: None,
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set sentinel credentials
    pub fn with_auth(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    /// Set TLS options
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Query timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
