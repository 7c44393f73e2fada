// src/nat/reversal/target.rs
//! Target side of connection reversal: stays registered at the mediator and
//! dials back to sources the mediator announces.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;

use crate::nat::error::{MessageError, UceError, UceResult};
use crate::nat::message::{
    Attribute, CommonMethod, EndpointClass, MethodRegistry, SemanticLevel, UceMessage, MAX_DATAGRAM_SIZE,
};
use crate::nat::default_methods;
use crate::nat::wait::bounded;
use super::{receive_from, unspecified_for};

/// Target configuration
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Mediator datagram endpoint
    pub mediator_addr: SocketAddr,

    /// Local datagram address used for the registration
    pub bind_addr: SocketAddr,

    /// Wait for register / deregister responses
    pub response_timeout: Duration,

    /// Wait for a forwarded connection request
    pub request_timeout: Duration,

    /// Wait for the outbound connection to the source
    pub connect_timeout: Duration,
}

impl TargetConfig {
    /// Defaults: wildcard bind, 5 s responses, 60 s requests, 10 s connect
    pub fn new(mediator_addr: SocketAddr) -> Self {
        Self {
            mediator_addr,
            bind_addr: unspecified_for(mediator_addr),
            response_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the local datagram address
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Set the register / deregister wait
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the connection request wait
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the outbound connect wait
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Registered peer that dials back to sources on the mediator's request
pub struct ConnectionReversalTarget {
    config: TargetConfig,
    socket: UdpSocket,
    methods: Arc<MethodRegistry>,
}

impl ConnectionReversalTarget {
    /// Bind the datagram socket, using the default method decoders
    pub async fn bind(config: TargetConfig) -> UceResult<Self> {
        Self::bind_with_methods(config, Arc::new(default_methods())).await
    }

    /// Bind the datagram socket, decoding mediator messages with `methods`
    pub async fn bind_with_methods(config: TargetConfig, methods: Arc<MethodRegistry>) -> UceResult<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::debug!("Reversal target bound to {}", socket.local_addr()?);
        Ok(Self { config, socket, methods })
    }

    /// Local datagram address
    pub fn local_addr(&self) -> UceResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Register `user` at the mediator
    pub async fn register(&self, user: &str) -> UceResult<()> {
        let request = UceMessage::request(CommonMethod::Register)
            .with_attribute(Attribute::UniqueUserName(user.to_string()));
        self.transact(&request).await?;
        tracing::info!("Registered {} at {}", user, self.config.mediator_addr);
        Ok(())
    }

    /// Remove the registration of `user`
    pub async fn deregister(&self, user: &str) -> UceResult<()> {
        let request = UceMessage::request(CommonMethod::Deregister)
            .with_attribute(Attribute::UniqueUserName(user.to_string()));
        self.transact(&request).await?;
        tracing::info!("Deregistered {} at {}", user, self.config.mediator_addr);
        Ok(())
    }

    /// Refresh the registration; fire and forget
    pub async fn keep_alive(&self, user: &str) -> UceResult<()> {
        let indication = UceMessage::indication(CommonMethod::KeepAlive)
            .with_attribute(Attribute::UniqueUserName(user.to_string()));
        self.socket.send_to(&indication.encode()?, self.config.mediator_addr).await?;
        tracing::debug!("Sent keep-alive for {}", user);
        Ok(())
    }

    /// Wait for a forwarded connection request and connect to its source
    pub async fn accept(&self) -> UceResult<TcpStream> {
        let deadline = Instant::now() + self.config.request_timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let request = loop {
            let message = receive_from(&self.socket, self.config.mediator_addr, deadline, &self.methods, &mut buf)
                .await?
                .ok_or(UceError::Timeout(self.config.request_timeout))?;

            if message.method() == CommonMethod::ConnectionRequest && !message.semantic_level().is_response() {
                break message;
            }
            tracing::debug!("Ignoring {} while waiting for connection request", message.method());
        };

        let endpoint = request
            .endpoint_of_class(EndpointClass::ConnectionReversal)
            .ok_or(MessageError::MissingAttribute("SOCKET-ENDPOINT (connection reversal)"))?;
        tracing::info!("Connection request received, connecting to {}", endpoint.addr);

        let stream = bounded(self.config.connect_timeout, TcpStream::connect(endpoint.addr))
            .await
            .into_result()?;
        tracing::info!("Connected to source at {}", endpoint.addr);
        Ok(stream)
    }

    /// Send `request` and wait for its correlated response
    async fn transact(&self, request: &UceMessage) -> UceResult<UceMessage> {
        self.socket.send_to(&request.encode()?, self.config.mediator_addr).await?;

        let deadline = Instant::now() + self.config.response_timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let response = receive_from(&self.socket, self.config.mediator_addr, deadline, &self.methods, &mut buf)
                .await?
                .ok_or(UceError::Timeout(self.config.response_timeout))?;

            if !response.answers(request) {
                tracing::debug!("Ignoring {} ({}) while waiting for response", response.method(), response.transaction_id());
                continue;
            }

            if response.semantic_level() == SemanticLevel::ErrorResponse {
                let (code, reason) = response.error_code().unwrap_or((0, "unspecified"));
                return Err(UceError::Rejected { code, reason: reason.to_string() });
            }
            return Ok(response);
        }
    }
}
