// src/nat/message/method.rs
//! Method codes and the per-technique decoder capability.
//!
//! The generic frame reader only sees a numeric code. Each technique
//! contributes a [`MethodDecoder`] that recognises its own codes, and a
//! [`MethodRegistry`] consults them in registration order.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Method carried in a message header. Two methods are equal iff their codes are.
#[derive(Debug, Clone, Copy)]
pub struct UceMethod {
    code: u16,
    name: &'static str,
}

impl UceMethod {
    /// Method with a wire code and a diagnostic name
    pub const fn new(code: u16, name: &'static str) -> Self {
        Self { code, name }
    }

    /// Wire code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Diagnostic name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for UceMethod {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for UceMethod {}

impl Hash for UceMethod {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for UceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04X})", self.name, self.code)
    }
}

/// Methods shared by every technique and the mediator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommonMethod {
    /// Public endpoint discovery
    Binding = 0x0001,

    /// Register a unique user name at the mediator
    Register = 0x0002,

    /// Remove a registration
    Deregister = 0x0003,

    /// Ask the mediator to make a registered target connect
    ConnectionRequest = 0x0004,

    /// Query the registered user names
    List = 0x0005,

    /// Refresh a registration
    KeepAlive = 0x0006,
}

impl CommonMethod {
    /// Every common method, by code
    pub const ALL: [CommonMethod; 6] = [
        Self::Binding,
        Self::Register,
        Self::Deregister,
        Self::ConnectionRequest,
        Self::List,
        Self::KeepAlive,
    ];

    /// Wire code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Binding => "BINDING",
            Self::Register => "REGISTER",
            Self::Deregister => "DEREGISTER",
            Self::ConnectionRequest => "CONNECTION_REQUEST",
            Self::List => "LIST",
            Self::KeepAlive => "KEEPALIVE",
        }
    }

    /// Common method for `code`, if any
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.code() == code)
    }
}

impl From<CommonMethod> for UceMethod {
    fn from(method: CommonMethod) -> Self {
        UceMethod::new(method.code(), method.name())
    }
}

impl PartialEq<CommonMethod> for UceMethod {
    fn eq(&self, other: &CommonMethod) -> bool {
        self.code == other.code()
    }
}

/// Recognises one technique's method codes
pub trait MethodDecoder: Send + Sync {
    /// Decoder name for diagnostics
    fn name(&self) -> &'static str;

    /// `None` when the code belongs to another technique
    fn decode(&self, code: u16) -> Option<UceMethod>;
}

/// Decoder for [`CommonMethod`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMethodDecoder;

impl MethodDecoder for CommonMethodDecoder {
    fn name(&self) -> &'static str {
        "common"
    }

    fn decode(&self, code: u16) -> Option<UceMethod> {
        CommonMethod::from_code(code).map(UceMethod::from)
    }
}

/// Ordered set of method decoders; the first decoder that recognises a code wins
#[derive(Clone)]
pub struct MethodRegistry {
    decoders: Vec<Arc<dyn MethodDecoder>>,
}

impl MethodRegistry {
    /// Registry that recognises nothing
    pub fn empty() -> Self {
        Self { decoders: Vec::new() }
    }

    /// Append `decoder` at the lowest priority
    pub fn register(&mut self, decoder: impl MethodDecoder + 'static) {
        self.decoders.push(Arc::new(decoder));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_decoder(mut self, decoder: impl MethodDecoder + 'static) -> Self {
        self.register(decoder);
        self
    }

    /// First decoder's answer for `code`
    pub fn decode(&self, code: u16) -> Option<UceMethod> {
        self.decoders.iter().find_map(|decoder| decoder.decode(code))
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decoders.iter().map(|d| d.name()))
            .finish()
    }
}
