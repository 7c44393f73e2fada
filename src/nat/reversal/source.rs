// src/nat/reversal/source.rs
//! Source side of connection reversal.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::Instant;

use crate::nat::error::{UceError, UceResult};
use crate::nat::message::{
    Attribute, CommonMethod, EndpointClass, MethodRegistry, SemanticLevel, SocketEndpoint, UceMessage,
    MAX_DATAGRAM_SIZE,
};
use crate::nat::default_methods;
use crate::nat::wait::bounded;
use super::{receive_from, unspecified_for};

/// Source configuration
#[derive(Debug, Clone)]
pub struct ReversalConfig {
    /// Mediator datagram endpoint
    pub mediator_addr: SocketAddr,

    /// Local listening address; port 0 picks an ephemeral port
    pub listen_addr: SocketAddr,

    /// How long to wait for the target to connect inward
    pub accept_timeout: Duration,

    /// How long to wait for the user list
    pub list_timeout: Duration,
}

impl ReversalConfig {
    /// Defaults: wildcard listener on an ephemeral port, 10 s waits
    pub fn new(mediator_addr: SocketAddr) -> Self {
        Self {
            mediator_addr,
            listen_addr: unspecified_for(mediator_addr),
            accept_timeout: Duration::from_secs(10),
            list_timeout: Duration::from_secs(10),
        }
    }

    /// Set the listening address
    pub fn with_listen_addr(mut self, listen_addr: SocketAddr) -> Self {
        self.listen_addr = listen_addr;
        self
    }

    /// Set the inbound connection wait
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    /// Set the user list wait
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }
}

/// Progress of one reversal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalState {
    /// Nothing sent yet
    Idle,
    /// Listener bound, request going out
    Requesting,
    /// Waiting for the target to connect
    Awaiting,
    /// Target connected
    Connected,
    /// Bind, send or wait failed
    Failed,
}

/// Requests reversed connections through a mediator.
///
/// Every call runs an independent attempt with its own sockets; nothing but
/// the configuration is shared between concurrent attempts.
#[derive(Debug, Clone)]
pub struct ConnectionReversalSource {
    config: ReversalConfig,
    methods: Arc<MethodRegistry>,
}

impl ConnectionReversalSource {
    /// Source using the default method decoders
    pub fn new(config: ReversalConfig) -> Self {
        Self::with_methods(config, Arc::new(default_methods()))
    }

    /// Source decoding mediator replies with `methods`
    pub fn with_methods(config: ReversalConfig, methods: Arc<MethodRegistry>) -> Self {
        Self { config, methods }
    }

    /// Active configuration
    pub fn config(&self) -> &ReversalConfig {
        &self.config
    }

    /// Have `user` connect to us, listening on the configured address
    pub async fn connect(&self, user: &str) -> UceResult<TcpStream> {
        self.connect_on_port(user, self.config.listen_addr.port()).await
    }

    /// Have `user` connect to us on `port` (0 = ephemeral)
    pub async fn connect_on_port(&self, user: &str, port: u16) -> UceResult<TcpStream> {
        let listen_addr = SocketAddr::new(self.config.listen_addr.ip(), port);
        let mut attempt = ReversalAttempt::new(self.config.mediator_addr, self.config.accept_timeout);
        attempt.run(user, listen_addr).await
    }

    /// Unique user names registered at the mediator.
    ///
    /// Best effort: no answer within the list timeout yields an empty set.
    pub async fn get_user_list(&self) -> UceResult<HashSet<String>> {
        let mediator = self.config.mediator_addr;
        let socket = UdpSocket::bind(unspecified_for(mediator)).await?;

        let request = UceMessage::request(CommonMethod::List);
        socket.send_to(&request.encode()?, mediator).await?;
        tracing::info!("Sent user list request to {}", mediator);

        let deadline = Instant::now() + self.config.list_timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let Some(response) = receive_from(&socket, mediator, deadline, &self.methods, &mut buf).await? else {
                tracing::warn!("No user list received within {:?}", self.config.list_timeout);
                return Ok(HashSet::new());
            };

            if !response.answers(&request) {
                tracing::debug!("Ignoring {} ({}) while waiting for user list", response.method(), response.transaction_id());
                continue;
            }

            if response.semantic_level() == SemanticLevel::ErrorResponse {
                let (code, reason) = response.error_code().unwrap_or((0, "unspecified"));
                return Err(UceError::Rejected { code, reason: reason.to_string() });
            }

            let users: HashSet<String> = response.unique_user_names().map(str::to_owned).collect();
            tracing::info!("User list received ({} users)", users.len());
            return Ok(users);
        }
    }
}

/// One connection attempt; owns its listener and request socket
pub(crate) struct ReversalAttempt {
    mediator: SocketAddr,
    accept_timeout: Duration,
    state: ReversalState,
}

impl ReversalAttempt {
    pub(crate) fn new(mediator: SocketAddr, accept_timeout: Duration) -> Self {
        Self {
            mediator,
            accept_timeout,
            state: ReversalState::Idle,
        }
    }

    pub(crate) fn state(&self) -> ReversalState {
        self.state
    }

    fn transition(&mut self, next: ReversalState) {
        tracing::debug!("Connection reversal {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub(crate) async fn run(&mut self, user: &str, listen_addr: SocketAddr) -> UceResult<TcpStream> {
        let result = self.establish(user, listen_addr).await;
        match &result {
            Ok(_) => self.transition(ReversalState::Connected),
            Err(e) => {
                tracing::warn!("Connection reversal to {} failed: {}", user, e);
                self.transition(ReversalState::Failed);
            }
        }
        result
    }

    async fn establish(&mut self, user: &str, listen_addr: SocketAddr) -> UceResult<TcpStream> {
        tracing::info!("Initializing local listener on {}", listen_addr);
        let listener = TcpListener::bind(listen_addr).await?;

        let socket = UdpSocket::bind(unspecified_for(self.mediator)).await?;
        socket.connect(self.mediator).await?;
        let endpoint = advertised_endpoint(listener.local_addr()?, socket.local_addr()?);

        self.transition(ReversalState::Requesting);
        let request = UceMessage::request(CommonMethod::ConnectionRequest)
            .with_attribute(Attribute::UniqueUserName(user.to_string()))
            .with_attribute(Attribute::SocketEndpoint(SocketEndpoint::new(
                endpoint,
                EndpointClass::ConnectionReversal,
            )));
        socket.send(&request.encode()?).await?;
        tracing::info!("Sent connection request for {} to {}, listening on {}", user, self.mediator, endpoint);

        self.transition(ReversalState::Awaiting);
        let (stream, peer) = bounded(self.accept_timeout, listener.accept()).await.into_result()?;
        drop(listener);

        tracing::info!("Connection established with {}", peer);
        Ok(stream)
    }
}

/// Listener address as the target should dial it
fn advertised_endpoint(listener: SocketAddr, towards_mediator: SocketAddr) -> SocketAddr {
    if listener.ip().is_unspecified() {
        SocketAddr::new(towards_mediator.ip(), listener.port())
    } else {
        listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    fn setup_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_advertised_endpoint() {
        let wildcard: SocketAddr = "0.0.0.0:4100".parse().unwrap();
        let local: SocketAddr = "192.168.0.5:53000".parse().unwrap();
        assert_eq!(advertised_endpoint(wildcard, local), "192.168.0.5:4100".parse().unwrap());

        let fixed: SocketAddr = "10.1.1.1:4100".parse().unwrap();
        assert_eq!(advertised_endpoint(fixed, local), fixed);
    }

    #[test]
    fn test_config_defaults() {
        let config = ReversalConfig::new("203.0.113.7:10300".parse().unwrap());
        assert_eq!(config.accept_timeout, Duration::from_secs(10));
        assert_eq!(config.list_timeout, Duration::from_secs(10));
        assert!(config.listen_addr.ip().is_unspecified());
        assert_eq!(config.listen_addr.port(), 0);
    }

    #[tokio::test]
    async fn test_attempt_fails_when_target_never_connects() {
        setup_test_logging();
        let mediator = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mediator_addr = mediator.local_addr().unwrap();

        let mut attempt = ReversalAttempt::new(mediator_addr, Duration::from_millis(200));
        assert_eq!(attempt.state(), ReversalState::Idle);

        let started = StdInstant::now();
        let result = attempt.run("bob", "127.0.0.1:0".parse().unwrap()).await;

        assert!(matches!(result, Err(UceError::Timeout(_))));
        assert_eq!(attempt.state(), ReversalState::Failed);
        assert!(started.elapsed() < Duration::from_secs(5));

        // The request reached the mediator before the wait began
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = mediator.recv_from(&mut buf).await.unwrap();
        let request = UceMessage::decode(&buf[..len], &MethodRegistry::default()).unwrap();
        assert_eq!(request.method(), CommonMethod::ConnectionRequest);
        assert_eq!(request.unique_user_names().collect::<Vec<_>>(), vec!["bob"]);

        // Listener was released: the advertised port accepts nothing
        let endpoint = request.endpoint_of_class(EndpointClass::ConnectionReversal).unwrap();
        assert!(TcpStream::connect(endpoint.addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let source = ConnectionReversalSource::new(
            ReversalConfig::new("127.0.0.1:9".parse().unwrap())
                .with_listen_addr("127.0.0.1:0".parse().unwrap()),
        );
        let result = source.connect_on_port("bob", port).await;
        assert!(matches!(result, Err(UceError::Io(_))));
    }
}
