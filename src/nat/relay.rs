// src/nat/relay.rs
//! Relay method vocabulary.
//!
//! Relay shares the generic message envelope with every other technique.
//! [`RelayMethodDecoder`] lets a relay server pick its own requests out of
//! that shared stream without knowing the other vocabularies.

use crate::nat::message::{MethodDecoder, UceMessage, UceMethod};

/// Relay-specific methods (codes 0x0100..)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RelayMethod {
    /// Reserve a public relay endpoint
    Allocation = 0x0100,

    /// Extend an allocation's lifetime
    Refresh = 0x0101,

    /// Bind a new peer connection to an allocation
    ConnectionBind = 0x0102,

    /// Relay signals an inbound peer connection to the allocation owner
    ConnectionAttempt = 0x0103,

    /// Forwarded application data
    Data = 0x0104,
}

impl RelayMethod {
    /// Every relay method, by code
    pub const ALL: [RelayMethod; 5] = [
        Self::Allocation,
        Self::Refresh,
        Self::ConnectionBind,
        Self::ConnectionAttempt,
        Self::Data,
    ];

    /// Wire code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Allocation => "ALLOCATION",
            Self::Refresh => "REFRESH",
            Self::ConnectionBind => "CONNECTION_BIND",
            Self::ConnectionAttempt => "CONNECTION_ATTEMPT",
            Self::Data => "DATA",
        }
    }

    /// Relay method for `code`, if any
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.code() == code)
    }

    /// Relay method of a decoded message, if it is one
    pub fn of(message: &UceMessage) -> Option<Self> {
        Self::from_code(message.method().code())
    }

    /// Whether the request refers to an existing allocation
    pub fn requires_allocation(&self) -> bool {
        !matches!(self, Self::Allocation)
    }
}

impl From<RelayMethod> for UceMethod {
    fn from(method: RelayMethod) -> Self {
        UceMethod::new(method.code(), method.name())
    }
}

impl PartialEq<RelayMethod> for UceMethod {
    fn eq(&self, other: &RelayMethod) -> bool {
        self.code() == other.code()
    }
}

/// [`MethodDecoder`] for relay codes
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayMethodDecoder;

impl MethodDecoder for RelayMethodDecoder {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn decode(&self, code: u16) -> Option<UceMethod> {
        RelayMethod::from_code(code).map(UceMethod::from)
    }
}
