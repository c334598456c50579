//! Master discovery through the sentinel quorum
//!
//! Endpoints are tried strictly in configuration order, so repeated
//! resolutions are deterministic and reproducible. The first endpoint that
//! names a well-formed master wins; anything else (a thrown query, an
//! invalid or "not found" answer) falls through to the next endpoint.

use async_trait::async_trait;
use redis::Value;
use tracing::{debug, warn};

use crate::config::SentinelEndpoint;
use crate::error::{ClientError, ClientResult};

/// Address of the node currently accepting writes for a service
///
/// Transient: re-derived from the sentinels on every reconnect, never
/// cached or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterAddr {
    /// IP address (or host name) reported by the sentinel
    pub ip: String,
    /// Port reported by the sentinel
    pub port: u16,
}

impl std::fmt::Display for MasterAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Directory query primitive
///
/// One call asks one sentinel endpoint for the current master of a named
/// service. `Ok(None)` means the sentinel answered but the answer did not
/// contain a usable `{ip, port}` pair (including explicit "no such
/// master"); an `Err` means the query itself failed.
#[async_trait]
pub trait SentinelDirectory: Send + Sync {
    /// Query one endpoint for the master address of `service`
    async fn master_addr(
        &self,
        endpoint: &SentinelEndpoint,
        service: &str,
    ) -> ClientResult<Option<MasterAddr>>;
}

/// Resolve the current master for `service` by asking each endpoint in
/// declared order.
///
/// # Errors
///
/// [`ClientError::Configuration`] before any network call when no endpoint
/// is configured, and immediately (no fallthrough) when an endpoint has a
/// blank host. When every endpoint is exhausted, the last query error is
/// re-raised; if no endpoint erred but none produced a valid answer,
/// [`ClientError::NoMasterFound`] is raised, which classifies as
/// retryable unavailability, since a quorum without a master is the
/// mid-failover window.
pub async fn resolve_master(
    directory: &dyn SentinelDirectory,
    endpoints: &[SentinelEndpoint],
    service: &str,
) -> ClientResult<MasterAddr> {
    if endpoints.is_empty() {
        return Err(ClientError::Configuration(
            "no sentinel endpoint has been configured".to_string(),
        ));
    }

    let mut last_error: Option<ClientError> = None;

    for endpoint in endpoints {
        if endpoint.host.trim().is_empty() {
            return Err(ClientError::Configuration(
                "no host has been specified for the sentinel connection".to_string(),
            ));
        }

        match directory.master_addr(endpoint, service).await {
            Ok(Some(master)) => {
                debug!(sentinel = %endpoint.host, master = %master, service, "resolved master");
                return Ok(master);
            }
            Ok(None) => {
                debug!(sentinel = %endpoint.host, service, "sentinel returned no usable master");
            }
            Err(ClientError::Configuration(message)) => {
                return Err(ClientError::Configuration(message));
            }
            Err(error) => {
                warn!(sentinel = %endpoint.host, error = %error, "sentinel query failed");
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) => Err(error),
        None => Err(ClientError::NoMasterFound(service.to_string())),
    }
}

/// Production directory backed by the `SENTINEL GET-MASTER-ADDR-BY-NAME`
/// command
///
/// Opens a dedicated short-lived connection per query, bounded by the
/// endpoint's timeout on both connect and query.
#[derive(Debug, Default)]
pub struct RedisSentinelDirectory;

impl RedisSentinelDirectory {
    /// Create a directory client
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SentinelDirectory for RedisSentinelDirectory {
    async fn master_addr(
        &self,
        endpoint: &SentinelEndpoint,
        service: &str,
    ) -> ClientResult<Option<MasterAddr>> {
        let client = redis::Client::open(endpoint.connection_info()?).map_err(ClientError::Redis)?;

        let mut conn = tokio::time::timeout(endpoint.timeout(), client.get_multiplexed_async_connection())
            .await
            .map_err(|_| timeout_error("connecting to sentinel", endpoint))?
            .map_err(ClientError::Redis)?;

        let mut cmd = redis::cmd("SENTINEL");
        cmd.arg("GET-MASTER-ADDR-BY-NAME").arg(service);

        let reply: Value = tokio::time::timeout(endpoint.timeout(), cmd.query_async(&mut conn))
            .await
            .map_err(|_| timeout_error("querying sentinel", endpoint))?
            .map_err(ClientError::Redis)?;

        Ok(parse_master_reply(&reply))
    }
}

impl SentinelEndpoint {
    /// Build the redis connection parameters for this endpoint
    pub(crate) fn connection_info(&self) -> ClientResult<redis::ConnectionInfo> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Configuration(
                "no host has been specified for the sentinel connection".to_string(),
            ));
        }

        let addr = match &self.tls {
            Some(tls) => redis::ConnectionAddr::TcpTls {
                host: self.host.clone(),
                port: self.port,
                insecure: tls.insecure,
                tls_params: None,
            },
            None => redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
        };

        Ok(redis::ConnectionInfo {
            addr,
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: self.username.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
        })
    }
}

fn timeout_error(operation: &str, endpoint: &SentinelEndpoint) -> ClientError {
    ClientError::Redis(redis::RedisError::from(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!(
            "timed out after {}ms {} {}:{}",
            endpoint.timeout_ms, operation, endpoint.host, endpoint.port
        ),
    )))
}

/// A valid answer is a two-element array of an IP-like string and a
/// numeric port; anything else is treated as "no usable master".
fn parse_master_reply(reply: &Value) -> Option<MasterAddr> {
    let items = match reply {
        Value::Array(items) if items.len() == 2 => items,
        _ => return None,
    };

    let ip: String = redis::from_redis_value(&items[0]).ok()?;
    let port_text: String = redis::from_redis_value(&items[1]).ok()?;
    let port = port_text.parse::<u16>().ok()?;

    if ip.is_empty() {
        return None;
    }

    Some(MasterAddr { ip, port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// One canned outcome per endpoint host.
    #[derive(Clone)]
    enum Outcome {
        Master(MasterAddr),
        Invalid,
        Refuse,
    }

    struct ScriptedDirectory {
        outcomes: Vec<(&'static str, Outcome)>,
        queried: Mutex<Vec<String>>,
    }

    impl ScriptedDirectory {
        fn new(outcomes: Vec<(&'static str, Outcome)>) -> Self {
            Self {
                outcomes,
                queried: Mutex::new(Vec::new()),
            }
        }

        fn queried(&self) -> Vec<String> {
            self.queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SentinelDirectory for ScriptedDirectory {
        async fn master_addr(
            &self,
            endpoint: &SentinelEndpoint,
            _service: &str,
        ) -> ClientResult<Option<MasterAddr>> {
            self.queried.lock().unwrap().push(endpoint.host.clone());

            for (host, outcome) in &self.outcomes {
                if *host == endpoint.host {
                    return match outcome {
                        Outcome::Master(addr) => Ok(Some(addr.clone())),
                        Outcome::Invalid => Ok(None),
                        Outcome::Refuse => Err(ClientError::Redis(redis::RedisError::from(
                            std::io::Error::new(
                                std::io::ErrorKind::ConnectionRefused,
                                "connection refused",
                            ),
                        ))),
                    };
                }
            }
            Ok(None)
        }
    }

    fn master(ip: &str, port: u16) -> MasterAddr {
        MasterAddr {
            ip: ip.to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn test_first_valid_answer_wins() {
        let directory = ScriptedDirectory::new(vec![
            ("s1", Outcome::Master(master("10.0.0.5", 6379))),
            ("s2", Outcome::Master(master("10.0.0.9", 6379))),
        ]);
        let endpoints = vec![SentinelEndpoint::new("s1"), SentinelEndpoint::new("s2")];

        let addr = resolve_master(&directory, &endpoints, "mymaster").await.unwrap();
        assert_eq!(addr, master("10.0.0.5", 6379));
        // The second endpoint must not have been consulted.
        assert_eq!(directory.queried(), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_fallthrough_on_query_error() {
        let directory = ScriptedDirectory::new(vec![
            ("s1", Outcome::Refuse),
            ("s2", Outcome::Master(master("10.0.0.9", 6379))),
        ]);
        let endpoints = vec![SentinelEndpoint::new("s1"), SentinelEndpoint::new("s2")];

        let addr = resolve_master(&directory, &endpoints, "mymaster").await.unwrap();
        assert_eq!(addr.ip, "10.0.0.9");
        assert_eq!(directory.queried(), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_fallthrough_on_invalid_answer() {
        let directory = ScriptedDirectory::new(vec![
            ("s1", Outcome::Invalid),
            ("s2", Outcome::Master(master("10.0.0.9", 6379))),
        ]);
        let endpoints = vec![SentinelEndpoint::new("s1"), SentinelEndpoint::new("s2")];

        let addr = resolve_master(&directory, &endpoints, "mymaster").await.unwrap();
        assert_eq!(addr.ip, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent_and_ordered() {
        let directory = ScriptedDirectory::new(vec![
            ("s1", Outcome::Invalid),
            ("s2", Outcome::Master(master("10.0.0.9", 6379))),
        ]);
        let endpoints = vec![SentinelEndpoint::new("s1"), SentinelEndpoint::new("s2")];

        let first = resolve_master(&directory, &endpoints, "mymaster").await.unwrap();
        let second = resolve_master(&directory, &endpoints, "mymaster").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(directory.queried(), vec!["s1", "s2", "s1", "s2"]);
    }

    #[tokio::test]
    async fn test_last_error_is_reraised_when_all_endpoints_fail() {
        let directory =
            ScriptedDirectory::new(vec![("s1", Outcome::Refuse), ("s2", Outcome::Refuse)]);
        let endpoints = vec![SentinelEndpoint::new("s1"), SentinelEndpoint::new("s2")];

        let error = resolve_master(&directory, &endpoints, "mymaster").await.unwrap_err();
        assert!(error.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_no_master_found_when_all_answers_invalid() {
        let directory =
            ScriptedDirectory::new(vec![("s1", Outcome::Invalid), ("s2", Outcome::Invalid)]);
        let endpoints = vec![SentinelEndpoint::new("s1"), SentinelEndpoint::new("s2")];

        let error = resolve_master(&directory, &endpoints, "mymaster").await.unwrap_err();
        assert!(matches!(error, ClientError::NoMasterFound(ref s) if s == "mymaster"));
    }

    #[tokio::test]
    async fn test_empty_endpoint_list_is_a_configuration_error() {
        let directory = ScriptedDirectory::new(vec![]);

        let error = resolve_master(&directory, &[], "mymaster").await.unwrap_err();
        assert!(matches!(error, ClientError::Configuration(_)));
        assert!(directory.queried().is_empty());
    }

    #[tokio::test]
    async fn test_blank_host_aborts_without_fallthrough() {
        let directory =
            ScriptedDirectory::new(vec![("s2", Outcome::Master(master("10.0.0.9", 6379)))]);
        let endpoints = vec![SentinelEndpoint::new("  "), SentinelEndpoint::new("s2")];

        let error = resolve_master(&directory, &endpoints, "mymaster").await.unwrap_err();
        assert!(matches!(error, ClientError::Configuration(_)));
        assert!(directory.queried().is_empty());
    }

    #[test]
    fn test_parse_master_reply_shapes() {
        let valid = Value::Array(vec![
            Value::BulkString(b"10.0.0.5".to_vec()),
            Value::BulkString(b"6379".to_vec()),
        ]);
        assert_eq!(parse_master_reply(&valid), Some(master("10.0.0.5", 6379)));

        assert_eq!(parse_master_reply(&Value::Nil), None);
        assert_eq!(
            parse_master_reply(&Value::Array(vec![Value::BulkString(b"10.0.0.5".to_vec())])),
            None
        );
        let bad_port = Value::Array(vec![
            Value::BulkString(b"10.0.0.5".to_vec()),
            Value::BulkString(b"not-a-port".to_vec()),
        ]);
        assert_eq!(parse_master_reply(&bad_port), None);
        let empty_ip = Value::Array(vec![
            Value::BulkString(b"".to_vec()),
            Value::BulkString(b"6379".to_vec()),
        ]);
        assert_eq!(parse_master_reply(&empty_ip), None);
    }
}
