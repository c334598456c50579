//! Managed connection with transparent failover
//!
//! [`SentinelConnection`] is the long-lived handle callers interact with.
//! Every data-plane operation is routed through one generic interception
//! point, [`SentinelConnection::execute_wrapped`], which runs it under the
//! retry engine; the failure hook tears down the broken transport,
//! re-resolves the master through the sentinels and installs a fresh
//! transport before the next attempt. All specific command methods are
//! thin call-sites through that single entry; there is no per-method
//! retry logic anywhere.

use std::fmt;
use std::sync::Arc;

use redis::{Cmd, Pipeline, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::classify::{classify, ErrorClass};
use crate::error::{ClientError, ClientResult};
use crate::retry::{retry_on_failure, OpFuture, RetryPolicy};
use crate::transport::{PushMessage, SubscriptionControl, Transport};

/// Shared cell holding the connection's current transport
///
/// Replacement happens under the lock, so an operation attempt sees either
/// the old transport or the new one, never a half-built handle.
pub type TransportCell = Arc<Mutex<Box<dyn Transport>>>;

/// Closure that re-runs discovery and opens a transport to the resolved
/// master
///
/// Built once per connection by the connector, capturing the discovery
/// endpoints and connection parameters by value.
pub type RecreateTransport = Arc<dyn Fn() -> OpFuture<'static, Box<dyn Transport>> + Send + Sync>;

/// One page of a cursor-based scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; 0 means the scan is complete
    pub cursor: u64,
    /// Raw entries of this page (keys, members, or field/value pairs,
    /// depending on the scan variant)
    pub items: Vec<Value>,
}

/// A connection to the current master, discovered through sentinels
///
/// Operations are assumed to be issued sequentially by one caller; sharing
/// a connection between concurrent callers requires external
/// synchronization around the whole operation-plus-reconnect sequence.
pub struct SentinelConnection {
    transport: TransportCell,
    recreate: RecreateTransport,
    policy: RetryPolicy,
}

impl fmt::Debug for SentinelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelConnection")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SentinelConnection {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        recreate: RecreateTransport,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            recreate,
            policy,
        }
    }

    /// The per-connection retry policy for data-plane operations
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run an arbitrary operation against the current transport with full
    /// retry-and-reconnect treatment.
    ///
    /// The operation is handed the shared transport cell and is invoked
    /// once per attempt; it must lock the cell itself and should clone
    /// whatever inputs it needs into the returned future, since it can run
    /// several times. `policy_override` takes precedence over the
    /// connection policy when given.
    pub async fn execute_wrapped<T>(
        &self,
        policy_override: Option<RetryPolicy>,
        operation: impl Fn(TransportCell) -> OpFuture<'static, T> + Send + Sync,
    ) -> ClientResult<T>
    where
        T: Send + 'static,
    {
        let policy = match policy_override {
            Some(policy) => policy,
            None => self.policy.clone(),
        };
        let transport = &self.transport;
        let recreate = &self.recreate;
        let operation = &operation;

        retry_on_failure(
            &policy,
            move || operation(Arc::clone(transport)),
            Some(&mut move || {
                let transport = Arc::clone(transport);
                let recreate = Arc::clone(recreate);
                Box::pin(async move { reconnect(transport, recreate).await })
            }),
        )
        .await
    }

    /// Execute a single command (the generic pass-through for anything
    /// without a dedicated method)
    pub async fn command(&self, cmd: Cmd) -> ClientResult<Value> {
        self.execute_wrapped(None, move |transport| {
            let cmd = cmd.clone();
            Box::pin(async move {
                let mut transport = transport.lock().await;
                transport.run_command(&cmd).await
            })
        })
        .await
    }

    /// Execute a command and convert the reply
    async fn query<T>(&self, cmd: Cmd) -> ClientResult<T>
    where
        T: redis::FromRedisValue + Send + 'static,
    {
        let value = self.command(cmd).await?;
        redis::from_redis_value(&value).map_err(ClientError::Redis)
    }

    /// PING the master
    pub async fn ping(&self) -> ClientResult<String> {
        self.query(redis::cmd("PING")).await
    }

    /// GET a key
    pub async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(cmd).await
    }

    /// SET a key
    pub async fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.query(cmd).await
    }

    /// DEL one or more keys; returns the number of keys removed
    pub async fn del(&self, keys: &[&str]) -> ClientResult<u64> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.query(cmd).await
    }

    /// EXPIRE a key; returns whether a timeout was set
    pub async fn expire(&self, key: &str, seconds: i64) -> ClientResult<bool> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(seconds);
        self.query(cmd).await
    }

    /// FLUSHDB on the selected database
    pub async fn flushdb(&self) -> ClientResult<()> {
        self.query(redis::cmd("FLUSHDB")).await
    }

    /// EVALSHA a cached script
    pub async fn evalsha(&self, sha: &str, keys: &[&str], args: &[&str]) -> ClientResult<Value> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len()).arg(keys).arg(args);
        self.command(cmd).await
    }

    /// One SCAN page over the keyspace
    pub async fn scan(
        &self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> ClientResult<ScanPage> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor);
        apply_scan_options(&mut cmd, pattern, count);
        parse_scan_reply(self.command(cmd).await?)
    }

    /// One HSCAN page over a hash (items alternate field, value)
    pub async fn hscan(
        &self,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> ClientResult<ScanPage> {
        self.scan_key("HSCAN", key, cursor, pattern, count).await
    }

    /// One SSCAN page over a set
    pub async fn sscan(
        &self,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> ClientResult<ScanPage> {
        self.scan_key("SSCAN", key, cursor, pattern, count).await
    }

    /// One ZSCAN page over a sorted set (items alternate member, score)
    pub async fn zscan(
        &self,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> ClientResult<ScanPage> {
        self.scan_key("ZSCAN", key, cursor, pattern, count).await
    }

    async fn scan_key(
        &self,
        command: &str,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> ClientResult<ScanPage> {
        let mut cmd = redis::cmd(command);
        cmd.arg(key).arg(cursor);
        apply_scan_options(&mut cmd, pattern, count);
        parse_scan_reply(self.command(cmd).await?)
    }

    /// Execute a non-atomic pipeline
    ///
    /// `policy` overrides the connection's retry policy for this call;
    /// compound units of work may warrant a stricter budget than single
    /// commands.
    pub async fn pipeline(
        &self,
        pipe: Pipeline,
        policy: Option<RetryPolicy>,
    ) -> ClientResult<Vec<Value>> {
        self.execute_wrapped(policy, move |transport| {
            let pipe = pipe.clone();
            Box::pin(async move {
                let mut transport = transport.lock().await;
                transport.run_pipeline(&pipe).await
            })
        })
        .await
    }

    /// Execute the pipeline as a MULTI/EXEC transaction
    pub async fn transaction(
        &self,
        mut pipe: Pipeline,
        policy: Option<RetryPolicy>,
    ) -> ClientResult<Vec<Value>> {
        pipe.atomic();
        self.pipeline(pipe, policy).await
    }

    /// Subscribe to the given patterns and deliver messages to `handler`
    /// until it returns [`SubscriptionControl::Stop`].
    ///
    /// A retryable failure mid-stream (the master went down) reconnects
    /// through the sentinels and resubscribes; messages published during
    /// the gap are lost.
    pub async fn psubscribe<H>(&self, patterns: &[String], handler: H) -> ClientResult<()>
    where
        H: FnMut(PushMessage) -> SubscriptionControl + Send + 'static,
    {
        let patterns = patterns.to_vec();
        let handler = Arc::new(Mutex::new(handler));

        self.execute_wrapped(None, move |transport| {
            let patterns = patterns.clone();
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let mut transport = transport.lock().await;
                let mut handler = handler.lock().await;
                transport.psubscribe(&patterns, &mut *handler).await
            })
        })
        .await
    }
}

/// Tear down the broken transport and install a freshly discovered one.
///
/// Close errors are ignored. A name-resolution failure while recreating is
/// swallowed: the closed transport stays in place and the next retry
/// attempt triggers another reconnect; any other failure propagates and
/// aborts the retry loop, since trouble beyond name resolution while
/// rebuilding the transport points at a deeper problem.
async fn reconnect(transport: TransportCell, recreate: RecreateTransport) -> ClientResult<()> {
    let mut guard = transport.lock().await;
    guard.close().await;

    match recreate().await {
        Ok(fresh) => {
            *guard = fresh;
            debug!("installed fresh transport after reconnect");
            Ok(())
        }
        Err(error) if classify(&error) == ErrorClass::NameResolution => {
            warn!(error = %error, "name resolution failed during reconnect; will retry");
            Ok(())
        }
        Err(error) => Err(error),
    }
}

fn apply_scan_options(cmd: &mut Cmd, pattern: Option<&str>, count: Option<usize>) {
    if let Some(pattern) = pattern {
        cmd.arg("MATCH").arg(pattern);
    }
    if let Some(count) = count {
        cmd.arg("COUNT").arg(count);
    }
}

fn parse_scan_reply(reply: Value) -> ClientResult<ScanPage> {
    let (cursor, items): (u64, Vec<Value>) = redis::from_redis_value(&reply)
        .map_err(|_| ClientError::UnexpectedReply("scan reply was not a cursor page".to_string()))?;
    Ok(ScanPage { cursor, items })
}
