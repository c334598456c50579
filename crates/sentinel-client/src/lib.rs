//! Failover-aware Valkey/Redis client
//!
//! This crate fronts a key-value backend whose writable master is not
//! fixed: the current master is discovered at connect time by querying a
//! Redis Sentinel quorum, and rediscovered whenever it fails over. Broken
//! transports are torn down and replaced behind a bounded retry loop, so
//! callers see transient unavailability as a short delay instead of an
//! error whenever possible.
//!
//! # Architecture
//!
//! - [`classify`](classify()): maps failures to retryable-unavailability,
//!   retryable-name-resolution, or fatal
//! - [`retry_on_failure`]: bounded retry with a reconnect hook between
//!   attempts
//! - [`resolve_master`]: ordered sentinel endpoint iteration with
//!   fallthrough
//! - [`SentinelConnection`]: the managed connection that swaps transports
//!   transparently
//! - [`SentinelConnector`]: initial discovery and connect
//!
//! # Example
//!
//! ```rust,no_run
//! use sentinel_client::{ConnectionConfig, SentinelConnector, SentinelEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("mymaster")
//!         .with_sentinel(SentinelEndpoint::new("sentinel-1.internal"))
//!         .with_sentinel(SentinelEndpoint::new("sentinel-2.internal"))
//!         .with_sentinel(SentinelEndpoint::new("sentinel-3.internal"));
//!
//!     let connection = SentinelConnector::new(config).connect().await?;
//!
//!     connection.set("greeting", "hello").await?;
//!     let value = connection.get("greeting").await?;
//!     println!("{value:?}");
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod resolver;
pub mod retry;
pub mod transport;

pub use classify::{classify, ErrorClass};
pub use config::{ConnectionConfig, SentinelEndpoint, TlsOptions};
pub use connection::{RecreateTransport, ScanPage, SentinelConnection, TransportCell};
pub use connector::SentinelConnector;
pub use error::{ClientError, ClientResult};
pub use resolver::{resolve_master, MasterAddr, RedisSentinelDirectory, SentinelDirectory};
pub use retry::{retry_on_failure, OpFuture, RetryPolicy};
pub use transport::{
    PushMessage, RedisTransport, RedisTransportFactory, SubscriptionControl, Transport,
    TransportFactory,
};
