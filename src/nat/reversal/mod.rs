// src/nat/reversal/mod.rs
//! Connection reversal.
//!
//! The source listens and asks the mediator to make the registered target
//! connect inward. The target keeps a registration at the mediator and
//! connects to whatever reversal endpoint the mediator forwards.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::nat::error::UceResult;
use crate::nat::message::{MethodRegistry, UceMessage};
use crate::nat::wait::bounded;

pub mod source;
pub mod target;

pub use source::{ConnectionReversalSource, ReversalConfig, ReversalState};
pub use target::{ConnectionReversalTarget, TargetConfig};

/// Wildcard bind address in the mediator's address family
pub(crate) fn unspecified_for(peer: SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

/// Next message from `mediator` before `deadline`; `Ok(None)` once the deadline passes.
///
/// Datagrams from other senders are dropped. A malformed datagram from the
/// mediator is a protocol error.
pub(crate) async fn receive_from(
    socket: &UdpSocket,
    mediator: SocketAddr,
    deadline: Instant,
    methods: &MethodRegistry,
    buf: &mut [u8],
) -> UceResult<Option<UceMessage>> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some((len, from)) = bounded(remaining, socket.recv_from(buf)).await.into_option()? else {
            return Ok(None);
        };

        if from != mediator {
            tracing::warn!("Ignoring datagram from unexpected address: {}", from);
            continue;
        }

        return Ok(Some(UceMessage::decode(&buf[..len], methods)?));
    }
}
