//! Connection establishment
//!
//! The connector owns the wiring between discovery and transport creation:
//! it builds the recreate closure once (capturing the configuration by
//! value, so later configuration changes never affect an already-open
//! connection), performs the initial connect through the retry engine and
//! hands out a [`SentinelConnection`].

use std::sync::Arc;

use tracing::info;

use crate::config::ConnectionConfig;
use crate::connection::{RecreateTransport, SentinelConnection};
use crate::error::{ClientError, ClientResult};
use crate::resolver::{resolve_master, RedisSentinelDirectory, SentinelDirectory};
use crate::retry::retry_on_failure;
use crate::transport::{RedisTransportFactory, TransportFactory};

/// Builds sentinel-backed connections
///
/// # Example
///
/// ```rust,no_run
/// use sentinel_client::{ConnectionConfig, SentinelConnector, SentinelEndpoint};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConnectionConfig::new("mymaster")
///     .with_sentinel(SentinelEndpoint::new("sentinel-1.internal"))
///     .with_sentinel(SentinelEndpoint::new("sentinel-2.internal"));
///
/// let connection = SentinelConnector::new(config).connect().await?;
/// connection.set("foo", "bar").await?;
/// # Ok(())
/// # }
/// ```
pub struct SentinelConnector {
    config: ConnectionConfig,
    directory: Arc<dyn SentinelDirectory>,
    factory: Arc<dyn TransportFactory>,
}

impl SentinelConnector {
    /// Create a connector with the production sentinel directory and
    /// transport factory
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(RedisSentinelDirectory::new()),
            Arc::new(RedisTransportFactory::new()),
        )
    }

    /// Create a connector with explicit collaborators (used by tests and
    /// embedders with custom transports)
    pub fn with_collaborators(
        config: ConnectionConfig,
        directory: Arc<dyn SentinelDirectory>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            config,
            directory,
            factory,
        }
    }

    /// Discover the master and open a managed connection to it.
    ///
    /// The initial connect runs under the connector retry policy, which may
    /// be more generous than the per-command one: at first connect the
    /// backend may still be electing a master.
    ///
    /// # Errors
    ///
    /// [`ClientError::Configuration`] when no sentinel endpoint is
    /// configured, or [`ClientError::RetryLimitExceeded`] when the backend
    /// never became reachable within the configured attempts.
    pub async fn connect(&self) -> ClientResult<SentinelConnection> {
        if self.config.sentinels.is_empty() {
            return Err(ClientError::Configuration(
                "no sentinel endpoint has been configured".to_string(),
            ));
        }

        let recreate = build_recreate(
            self.config.clone(),
            Arc::clone(&self.directory),
            Arc::clone(&self.factory),
        );

        let policy = self.config.connector_retry_policy();
        let recreate_for_connect = Arc::clone(&recreate);
        let transport = retry_on_failure(&policy, move || recreate_for_connect(), None).await?;

        info!(service = %self.config.service, "connected through sentinel");
        Ok(SentinelConnection::new(
            transport,
            recreate,
            self.config.command_retry_policy(),
        ))
    }
}

/// One-shot discovery plus connect; retrying is the caller's concern.
fn build_recreate(
    config: ConnectionConfig,
    directory: Arc<dyn SentinelDirectory>,
    factory: Arc<dyn TransportFactory>,
) -> RecreateTransport {
    Arc::new(move || {
        let config = config.clone();
        let directory = Arc::clone(&directory);
        let factory = Arc::clone(&factory);
        Box::pin(async move {
            let master = resolve_master(directory.as_ref(), &config.sentinels, &config.service).await?;
            factory.connect(&master, &config).await
        })
    })
}
