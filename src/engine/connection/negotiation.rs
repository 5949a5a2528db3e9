//! Daemon verification, API version negotiation, and connection caching.
//!
//! A fresh client speaks the newest API version the client library knows. If
//! the daemon is older, its ping rejection advertises the highest version it
//! supports; the manager rebuilds the client at that version once and pings
//! again. The verified client is then cached for the lifetime of the manager.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bollard::Docker;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::ApiVersion;
use crate::error::{ChaosError, ContainerError};

/// Timeout in seconds for a single daemon ping.
pub(crate) const PING_TIMEOUT_SECS: u64 = 2;

/// Marker text daemons use when rejecting a too-new client version.
const MAX_VERSION_MARKER: &str = "Maximum supported API version is ";

/// A failed ping, with the daemon's advertised maximum version when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingFailure {
    /// The daemon's error text.
    pub message: String,
    /// The highest API version the daemon claims to support, if it said so.
    pub advertised_version: Option<ApiVersion>,
    /// Whether the daemon never answered.
    pub timed_out: bool,
}

impl PingFailure {
    /// Build a failure from daemon error text, extracting any advertised
    /// maximum API version.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let text = message.into();
        let advertised_version = advertised_version(&text);
        Self {
            message: text,
            advertised_version,
            timed_out: false,
        }
    }
}

fn advertised_version(message: &str) -> Option<ApiVersion> {
    let (_, tail) = message.split_once(MAX_VERSION_MARKER)?;
    let token: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    ApiVersion::parse(token.trim_end_matches('.'))
}

/// Boxed future type returned by [`EnginePinger::ping`].
pub type PingFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PingFailure>> + Send + 'a>>;

/// Behaviour required to verify a daemon and report the negotiated version.
pub trait EnginePinger {
    /// Ping the daemon.
    fn ping(&self) -> PingFuture<'_>;

    /// The API version this client speaks.
    fn api_version(&self) -> ApiVersion;
}

impl EnginePinger for Docker {
    fn ping(&self) -> PingFuture<'_> {
        Box::pin(async move {
            Self::ping(self)
                .await
                .map(drop)
                .map_err(|error| PingFailure::from_message(error.to_string()))
        })
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion::from(&self.client_version())
    }
}

/// Builds a client for an endpoint at a given API version.
pub type Connector<C> = Box<dyn Fn(&str, ApiVersion) -> Result<C, ChaosError> + Send + Sync>;

struct Established<C> {
    endpoint: String,
    client: C,
}

/// Lazily establishes, verifies, and caches a single daemon connection.
///
/// The first call binds the endpoint; later calls naming a different endpoint
/// receive the cached connection and a warning is logged.
pub struct ConnectionManager<C> {
    default_endpoint: String,
    client_version: ApiVersion,
    connector: Connector<C>,
    cell: OnceCell<Established<C>>,
}

impl<C: EnginePinger> ConnectionManager<C> {
    /// Create a manager that will connect to `default_endpoint` unless a
    /// request names another one first.
    #[must_use]
    pub fn new(
        default_endpoint: impl Into<String>,
        client_version: ApiVersion,
        connector: Connector<C>,
    ) -> Self {
        Self {
            default_endpoint: default_endpoint.into(),
            client_version,
            connector,
            cell: OnceCell::new(),
        }
    }

    /// Return the verified connection, establishing it on first use.
    ///
    /// Concurrent first calls are coalesced; only one establishment runs.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::PingTimeout` when the daemon does not answer
    /// within the ping window, and `ContainerError::ConnectionFailed` (or a
    /// more specific socket error) when the client cannot be built or the
    /// daemon rejects it.
    pub async fn connection(&self, requested_endpoint: Option<&str>) -> Result<&C, ChaosError> {
        let requested = requested_endpoint.filter(|endpoint| !endpoint.trim().is_empty());
        let established = self
            .cell
            .get_or_try_init(|| {
                let endpoint = requested.unwrap_or(&self.default_endpoint).to_owned();
                self.establish(endpoint)
            })
            .await?;

        if let Some(endpoint) = requested.filter(|endpoint| *endpoint != established.endpoint) {
            warn!(
                requested = endpoint,
                cached = %established.endpoint,
                "ignoring docker endpoint; a connection is already established"
            );
        }
        Ok(&established.client)
    }

    async fn establish(&self, endpoint: String) -> Result<Established<C>, ChaosError> {
        let candidate = (self.connector)(&endpoint, self.client_version)?;
        let client = match ping_within_timeout(&candidate).await {
            Ok(()) => candidate,
            Err(failure) => self.downgrade(&endpoint, &candidate, failure).await?,
        };
        info!(
            endpoint = %endpoint,
            api_version = %client.api_version(),
            "connected to container engine"
        );
        Ok(Established { endpoint, client })
    }

    async fn downgrade(
        &self,
        endpoint: &str,
        client: &C,
        failure: PingFailure,
    ) -> Result<C, ChaosError> {
        let current = client.api_version();
        let Some(advertised) = failure
            .advertised_version
            .filter(|advertised| *advertised < current)
        else {
            return Err(failure.into_error());
        };

        debug!(from = %current, to = %advertised, "downgrading engine API version");
        let downgraded = (self.connector)(endpoint, advertised)?;
        ping_within_timeout(&downgraded)
            .await
            .map_err(PingFailure::into_error)?;
        Ok(downgraded)
    }
}

impl PingFailure {
    fn timeout() -> Self {
        Self {
            message: String::from("ping timed out"),
            advertised_version: None,
            timed_out: true,
        }
    }

    fn into_error(self) -> ChaosError {
        if self.timed_out {
            ChaosError::from(ContainerError::PingTimeout {
                seconds: PING_TIMEOUT_SECS,
            })
        } else {
            ChaosError::from(ContainerError::ConnectionFailed {
                message: self.message,
            })
        }
    }
}

async fn ping_within_timeout<C: EnginePinger>(client: &C) -> Result<(), PingFailure> {
    let timeout = Duration::from_secs(PING_TIMEOUT_SECS);
    tokio::time::timeout(timeout, client.ping())
        .await
        .map_err(|_| PingFailure::timeout())?
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::{fixture, rstest};

    use super::*;

    /// Pinger whose daemon supports versions up to `daemon_max`.
    struct VersionedPinger {
        version: ApiVersion,
        daemon_max: Option<ApiVersion>,
    }

    impl EnginePinger for VersionedPinger {
        fn ping(&self) -> PingFuture<'_> {
            let result = match self.daemon_max {
                None => Err(PingFailure::from_message("connection refused")),
                Some(max) if self.version > max => Err(PingFailure::from_message(format!(
                    "client version {} is too new. {MAX_VERSION_MARKER}{max}",
                    self.version
                ))),
                Some(_) => Ok(()),
            };
            Box::pin(async move { result })
        }

        fn api_version(&self) -> ApiVersion {
            self.version
        }
    }

    #[fixture]
    fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    }

    fn manager(
        daemon_max: Option<ApiVersion>,
        calls: Arc<AtomicUsize>,
    ) -> ConnectionManager<VersionedPinger> {
        ConnectionManager::new(
            "unix:///var/run/docker.sock",
            ApiVersion::new(1, 49),
            Box::new(move |_endpoint, version| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(VersionedPinger {
                    version,
                    daemon_max,
                })
            }),
        )
    }

    #[rstest]
    #[case("client version 1.49 is too new. Maximum supported API version is 1.41", Some(ApiVersion::new(1, 41)))]
    #[case("Maximum supported API version is 1.24.", Some(ApiVersion::new(1, 24)))]
    #[case("connection refused", None)]
    fn ping_failure_extracts_advertised_version(
        #[case] message: &str,
        #[case] expected: Option<ApiVersion>,
    ) {
        assert_eq!(PingFailure::from_message(message).advertised_version, expected);
    }

    #[rstest]
    fn connection_downgrades_to_advertised_version(
        runtime: std::io::Result<tokio::runtime::Runtime>,
    ) {
        let rt = runtime.expect("runtime should build");
        let calls = Arc::new(AtomicUsize::new(0));
        let connections = manager(Some(ApiVersion::new(1, 41)), Arc::clone(&calls));

        let client = rt
            .block_on(connections.connection(None))
            .expect("downgraded connection should succeed");

        assert_eq!(client.api_version(), ApiVersion::new(1, 41));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn connection_is_established_once(runtime: std::io::Result<tokio::runtime::Runtime>) {
        let rt = runtime.expect("runtime should build");
        let calls = Arc::new(AtomicUsize::new(0));
        let connections = manager(Some(ApiVersion::new(1, 49)), Arc::clone(&calls));

        rt.block_on(async {
            connections.connection(None).await.map(drop)?;
            connections
                .connection(Some("tcp://elsewhere:2375"))
                .await
                .map(drop)
        })
        .expect("cached connection should be reused");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn unreachable_daemon_reports_connection_failure(
        runtime: std::io::Result<tokio::runtime::Runtime>,
    ) {
        let rt = runtime.expect("runtime should build");
        let connections = manager(None, Arc::new(AtomicUsize::new(0)));

        let error = rt
            .block_on(connections.connection(None))
            .map(drop)
            .expect_err("refused ping should fail");

        assert!(matches!(
            error,
            ChaosError::Container(ContainerError::ConnectionFailed { .. })
        ));
    }
}
