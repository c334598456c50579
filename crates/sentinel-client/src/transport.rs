//! Transport primitives
//!
//! A [`Transport`] is the live network handle to the node a connection is
//! currently pinned to. It is exclusively owned by one
//! [`SentinelConnection`](crate::SentinelConnection) and replaced wholesale
//! on reconnect; the old handle is closed and discarded, never reused.
//! The trait seam exists so the failover machinery can be exercised
//! against scripted fakes.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{Cmd, Pipeline, Value};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{ClientError, ClientResult};
use crate::resolver::MasterAddr;

/// A message delivered to a pattern subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    /// The pattern that matched, if the subscription was pattern-based
    pub pattern: Option<String>,
    /// Channel the message was published to
    pub channel: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

/// Returned by subscription handlers to keep or stop the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionControl {
    /// Keep waiting for messages
    Continue,
    /// Unsubscribe and return to the caller
    Stop,
}

/// Handler invoked for every message on a subscription
pub type MessageHandler<'a> = dyn FnMut(PushMessage) -> SubscriptionControl + Send + 'a;

/// Live connection to one backend node
#[async_trait]
pub trait Transport: Send {
    /// Execute a single command
    async fn run_command(&mut self, cmd: &Cmd) -> ClientResult<Value>;

    /// Execute a pipeline (atomic or not) and collect the replies
    async fn run_pipeline(&mut self, pipe: &Pipeline) -> ClientResult<Vec<Value>>;

    /// Subscribe to the given patterns and deliver messages to `handler`
    /// until it returns [`SubscriptionControl::Stop`] or the stream fails
    async fn psubscribe(
        &mut self,
        patterns: &[String],
        handler: &mut MessageHandler<'_>,
    ) -> ClientResult<()>;

    /// Tear the connection down; errors while closing are ignored (a
    /// half-dead transport is expected to complain on the way out)
    async fn close(&mut self);
}

/// Creates transports for freshly resolved masters
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a transport to `master` using the connection parameters
    async fn connect(
        &self,
        master: &MasterAddr,
        config: &ConnectionConfig,
    ) -> ClientResult<Box<dyn Transport>>;
}

/// Production transport over the redis crate's multiplexed async
/// connection
///
/// Pattern subscriptions open a dedicated pub/sub connection from the same
/// client, since the multiplexed connection cannot enter subscriber mode.
pub struct RedisTransport {
    client: redis::Client,
    conn: Option<redis::aio::MultiplexedConnection>,
}

impl RedisTransport {
    fn new(client: redis::Client, conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            client,
            conn: Some(conn),
        }
    }

    fn live_conn(&mut self) -> ClientResult<&mut redis::aio::MultiplexedConnection> {
        self.conn.as_mut().ok_or_else(closed_error)
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn run_command(&mut self, cmd: &Cmd) -> ClientResult<Value> {
        let conn = self.live_conn()?;
        let value: Value = cmd.query_async(conn).await.map_err(ClientError::Redis)?;
        Ok(value)
    }

    async fn run_pipeline(&mut self, pipe: &Pipeline) -> ClientResult<Vec<Value>> {
        let conn = self.live_conn()?;
        let values: Vec<Value> = pipe.query_async(conn).await.map_err(ClientError::Redis)?;
        Ok(values)
    }

    async fn psubscribe(
        &mut self,
        patterns: &[String],
        handler: &mut MessageHandler<'_>,
    ) -> ClientResult<()> {
        // A closed transport must fail the same way a dead socket does.
        self.live_conn()?;

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(ClientError::Redis)?;
        for pattern in patterns {
            pubsub.psubscribe(pattern).await.map_err(ClientError::Redis)?;
        }

        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let push = PushMessage {
                pattern: message.get_pattern::<String>().ok(),
                channel: message.get_channel_name().to_string(),
                payload: message.get_payload_bytes().to_vec(),
            };
            if handler(push) == SubscriptionControl::Stop {
                return Ok(());
            }
        }

        // The stream only ends when the server side goes down, which is
        // the failover signal the retry loop recovers from.
        Err(ClientError::Redis(redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection lost while waiting for published messages",
        ))))
    }

    async fn close(&mut self) {
        // Dropping the multiplexed handle tears down the socket; keeping
        // the slot empty makes every later use fail as "connection closed",
        // which classifies as retryable unavailability.
        if self.conn.take().is_some() {
            debug!("closed transport");
        }
    }
}

/// Production factory: a fresh `redis::Client` per resolved master
pub struct RedisTransportFactory;

impl RedisTransportFactory {
    /// Create a factory
    pub fn new() -> Self {
        Self
    }
}

impl Default for RedisTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for RedisTransportFactory {
    async fn connect(
        &self,
        master: &MasterAddr,
        config: &ConnectionConfig,
    ) -> ClientResult<Box<dyn Transport>> {
        let addr = match &config.tls {
            Some(tls) => redis::ConnectionAddr::TcpTls {
                host: master.ip.clone(),
                port: master.port,
                insecure: tls.insecure,
                tls_params: None,
            },
            None => redis::ConnectionAddr::Tcp(master.ip.clone(), master.port),
        };
        let info = redis::ConnectionInfo {
            addr,
            redis: redis::RedisConnectionInfo {
                db: config.database,
                username: config.username.clone(),
                password: config.password.clone(),
                ..Default::default()
            },
        };

        let client = redis::Client::open(info).map_err(ClientError::Redis)?;
        let conn = tokio::time::timeout(
            config.connect_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            ClientError::Redis(redis::RedisError::from(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "timed out after {}ms connecting to master {}",
                    config.connect_timeout_ms, master
                ),
            )))
        })?
        .map_err(ClientError::Redis)?;

        debug!(master = %master, "connected to master");
        Ok(Box::new(RedisTransport::new(client, conn)))
    }
}

fn closed_error() -> ClientError {
    ClientError::Redis(redis::RedisError::from(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "connection closed",
    )))
}
