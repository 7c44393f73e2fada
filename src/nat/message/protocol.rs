// src/nat/message/protocol.rs
//! UCE message frame.
//!
//! ```text
//!  0               2       3                               19              21
//! +---------------+-------+-------------------------------+---------------+----
//! | method (u16)  | level |   transaction id (16 bytes)   | attr count    | attributes...
//! +---------------+-------+-------------------------------+---------------+----
//! ```
//!
//! Each attribute is `type (u16) | length (u16) | payload`. All integers are
//! big-endian. Decoding rejects truncated frames, unknown method codes and
//! trailing bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::nat::error::MessageError;
use super::attribute::{Attribute, EndpointClass, SocketEndpoint};
use super::method::{MethodRegistry, UceMethod};

/// Frame header size
pub const HEADER_SIZE: usize = 21;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Request / response marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SemanticLevel {
    /// Expects a correlated response
    Request = 0x00,
    /// One-way notification
    Indication = 0x01,
    /// Positive answer to a request
    SuccessResponse = 0x02,
    /// Negative answer; normally carries an ERROR-CODE
    ErrorResponse = 0x03,
}

impl SemanticLevel {
    /// Level for a wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Request),
            0x01 => Some(Self::Indication),
            0x02 => Some(Self::SuccessResponse),
            0x03 => Some(Self::ErrorResponse),
            _ => None,
        }
    }

    /// Success or error response
    pub fn is_response(&self) -> bool {
        matches!(self, Self::SuccessResponse | Self::ErrorResponse)
    }
}

/// Transaction identifier (128-bit random UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Fresh random identifier; never reuse across independent requests
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identifier read off the wire
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw 16 bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request / response envelope exchanged with mediator and peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UceMessage {
    method: UceMethod,
    semantic_level: SemanticLevel,
    transaction_id: TransactionId,
    attributes: Vec<Attribute>,
}

impl UceMessage {
    /// Message without attributes
    pub fn new(
        method: impl Into<UceMethod>,
        semantic_level: SemanticLevel,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            method: method.into(),
            semantic_level,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Request with a fresh transaction id
    pub fn request(method: impl Into<UceMethod>) -> Self {
        Self::new(method, SemanticLevel::Request, TransactionId::new())
    }

    /// Indication with a fresh transaction id
    pub fn indication(method: impl Into<UceMethod>) -> Self {
        Self::new(method, SemanticLevel::Indication, TransactionId::new())
    }

    /// Response correlated with `request`
    pub fn response_to(request: &UceMessage, semantic_level: SemanticLevel) -> Self {
        Self::new(request.method, semantic_level, request.transaction_id)
    }

    /// Method
    pub fn method(&self) -> UceMethod {
        self.method
    }

    /// Request / response marker
    pub fn semantic_level(&self) -> SemanticLevel {
        self.semantic_level
    }

    /// Correlation id
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Attributes in wire order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Append an attribute
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Builder form of [`add_attribute`](Self::add_attribute)
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.add_attribute(attribute);
        self
    }

    /// Whether this message answers `request`
    pub fn answers(&self, request: &UceMessage) -> bool {
        self.semantic_level.is_response()
            && self.transaction_id == request.transaction_id
            && self.method == request.method
    }

    /// All UNIQUE-USER-NAME values
    pub fn unique_user_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::UniqueUserName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// All SOCKET-ENDPOINT values
    pub fn socket_endpoints(&self) -> impl Iterator<Item = &SocketEndpoint> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::SocketEndpoint(endpoint) => Some(endpoint),
            _ => None,
        })
    }

    /// First endpoint of the given class
    pub fn endpoint_of_class(&self, class: EndpointClass) -> Option<&SocketEndpoint> {
        self.socket_endpoints().find(|e| e.class == class)
    }

    /// First ERROR-CODE as `(code, reason)`
    pub fn error_code(&self) -> Option<(u16, &str)> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::ErrorCode { code, reason } => Some((*code, reason.as_str())),
            _ => None,
        })
    }

    /// Serialize to a single frame
    pub fn encode(&self) -> Result<Bytes, MessageError> {
        let mut buf = BytesMut::with_capacity(512);

        buf.put_u16(self.method.code());
        buf.put_u8(self.semantic_level as u8);
        buf.put_slice(self.transaction_id.as_bytes());

        let count = u16::try_from(self.attributes.len()).map_err(|_| MessageError::InvalidAttribute {
            attr_type: 0,
            reason: format!("{} attributes exceed count field", self.attributes.len()),
        })?;
        buf.put_u16(count);

        for attr in &self.attributes {
            attr.encode(&mut buf)?;
        }

        Ok(buf.freeze())
    }

    /// Parse one frame, resolving the method code through `methods`
    pub fn decode(frame: &[u8], methods: &MethodRegistry) -> Result<Self, MessageError> {
        if frame.len() < HEADER_SIZE {
            return Err(MessageError::Truncated {
                needed: HEADER_SIZE,
                available: frame.len(),
            });
        }

        let mut buf = frame;

        let code = buf.get_u16();
        let method = methods.decode(code).ok_or(MessageError::UnknownMethod(code))?;

        let level_raw = buf.get_u8();
        let semantic_level = SemanticLevel::from_u8(level_raw)
            .ok_or(MessageError::UnknownSemanticLevel(level_raw))?;

        let mut tid = [0u8; 16];
        buf.copy_to_slice(&mut tid);
        let transaction_id = TransactionId::from_bytes(tid);

        let count = buf.get_u16() as usize;
        let mut attributes = Vec::with_capacity(count.min(64));

        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(MessageError::Truncated {
                    needed: 4,
                    available: buf.remaining(),
                });
            }

            let attr_type = buf.get_u16();
            let attr_len = buf.get_u16() as usize;

            if buf.remaining() < attr_len {
                return Err(MessageError::AttributeLength {
                    attr_type,
                    declared: attr_len,
                    available: buf.remaining(),
                });
            }

            attributes.push(Attribute::decode(attr_type, &buf[..attr_len])?);
            buf.advance(attr_len);
        }

        if buf.has_remaining() {
            return Err(MessageError::TrailingBytes(buf.remaining()));
        }

        Ok(Self {
            method,
            semantic_level,
            transaction_id,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nat::message::method::CommonMethod;
    use crate::nat::relay::RelayMethod;

    fn connection_request() -> UceMessage {
        UceMessage::request(CommonMethod::ConnectionRequest)
            .with_attribute(Attribute::UniqueUserName("alice".to_string()))
            .with_attribute(Attribute::SocketEndpoint(SocketEndpoint::new(
                "10.0.0.2:50123".parse().unwrap(),
                EndpointClass::ConnectionReversal,
            )))
    }

    #[test]
    fn test_message_encode_decode() {
        let registry = MethodRegistry::default();
        let messages = vec![
            connection_request(),
            UceMessage::request(CommonMethod::List),
            UceMessage::response_to(&UceMessage::request(CommonMethod::List), SemanticLevel::SuccessResponse)
                .with_attribute(Attribute::UniqueUserName("alice".to_string()))
                .with_attribute(Attribute::UniqueUserName("bob".to_string())),
            UceMessage::request(RelayMethod::Allocation)
                .with_attribute(Attribute::Lifetime(600))
                .with_attribute(Attribute::Token(Uuid::new_v4())),
            UceMessage::indication(RelayMethod::Data)
                .with_attribute(Attribute::Data(vec![0, 1, 2, 3, 255]))
                .with_attribute(Attribute::Unknown { attr_type: 0x7F00, value: vec![9; 7] }),
            UceMessage::new(CommonMethod::Register, SemanticLevel::ErrorResponse, TransactionId::new())
                .with_attribute(Attribute::ErrorCode { code: 409, reason: "name taken".to_string() }),
        ];

        for message in messages {
            let encoded = message.encode().unwrap();
            let decoded = UceMessage::decode(&encoded, &registry).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(decoded.method().name(), message.method().name());
        }
    }

    #[test]
    fn test_attribute_edges_encode_decode() {
        let registry = MethodRegistry::default();
        let attributes = vec![
            Attribute::UniqueUserName(String::new()),
            Attribute::UniqueUserName("zoë".to_string()),
            Attribute::SocketEndpoint(SocketEndpoint::new("0.0.0.0:0".parse().unwrap(), EndpointClass::Private)),
            Attribute::SocketEndpoint(SocketEndpoint::new("255.255.255.255:65535".parse().unwrap(), EndpointClass::Relay)),
            Attribute::SocketEndpoint(SocketEndpoint::new("[::]:0".parse().unwrap(), EndpointClass::Public)),
            Attribute::SocketEndpoint(SocketEndpoint::new("[fe80::1]:4000".parse().unwrap(), EndpointClass::HolePunching)),
            Attribute::ErrorCode { code: 0, reason: String::new() },
            Attribute::ErrorCode { code: u16::MAX, reason: "x".repeat(100) },
            Attribute::Lifetime(0),
            Attribute::Lifetime(u32::MAX),
            Attribute::Token(Uuid::nil()),
            Attribute::Data(Vec::new()),
            Attribute::Data(vec![0xAB; u16::MAX as usize]),
            Attribute::Unknown { attr_type: 0x0000, value: Vec::new() },
            Attribute::Unknown { attr_type: 0x0007, value: vec![1] },
            Attribute::Unknown { attr_type: u16::MAX, value: vec![0xFF; 3] },
        ];

        // One attribute per message, then all of them together
        for attribute in &attributes {
            let message = UceMessage::request(CommonMethod::List).with_attribute(attribute.clone());
            let decoded = UceMessage::decode(&message.encode().unwrap(), &registry).unwrap();
            assert_eq!(decoded, message);
        }

        let mut all = UceMessage::indication(RelayMethod::Data);
        for attribute in attributes.into_iter().filter(|a| !matches!(a, Attribute::Data(d) if d.len() > 1)) {
            all.add_attribute(attribute);
        }
        assert_eq!(UceMessage::decode(&all.encode().unwrap(), &registry).unwrap(), all);
    }

    #[test]
    fn test_encode_rejects_lossy_attributes() {
        let shadowing = UceMessage::request(CommonMethod::List)
            .with_attribute(Attribute::Unknown { attr_type: 0x0004, value: vec![0, 0, 0, 1] });
        assert!(matches!(
            shadowing.encode(),
            Err(MessageError::InvalidAttribute { attr_type: 0x0004, .. })
        ));

        let scoped = UceMessage::request(CommonMethod::ConnectionRequest).with_attribute(Attribute::SocketEndpoint(
            SocketEndpoint::new("[fe80::1%3]:4000".parse().unwrap(), EndpointClass::Private),
        ));
        assert!(matches!(
            scoped.encode(),
            Err(MessageError::InvalidAttribute { attr_type: 0x0002, .. })
        ));

        let oversized = UceMessage::request(CommonMethod::List)
            .with_attribute(Attribute::Data(vec![0; u16::MAX as usize + 1]));
        assert!(matches!(
            oversized.encode(),
            Err(MessageError::InvalidAttribute { attr_type: 0x0006, .. })
        ));
    }

    #[test]
    fn test_header_layout() {
        let message = UceMessage::request(CommonMethod::List);
        let encoded = message.encode().unwrap();

        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(&encoded[..3], &[0x00, 0x05, 0x00]);
        assert_eq!(&encoded[3..19], message.transaction_id().as_bytes());
        assert_eq!(&encoded[19..], &[0x00, 0x00]);
    }

    #[test]
    fn test_truncated_attribute_is_rejected() {
        let registry = MethodRegistry::default();
        let encoded = connection_request().encode().unwrap();

        // Cut inside the last attribute payload
        let cut = &encoded[..encoded.len() - 3];
        assert!(matches!(
            UceMessage::decode(cut, &registry),
            Err(MessageError::AttributeLength { attr_type: 0x0002, declared: 8, available: 5 })
        ));

        // Cut inside an attribute header
        let cut = &encoded[..HEADER_SIZE + 2];
        assert!(matches!(
            UceMessage::decode(cut, &registry),
            Err(MessageError::Truncated { needed: 4, available: 2 })
        ));

        assert!(matches!(
            UceMessage::decode(&encoded[..10], &registry),
            Err(MessageError::Truncated { needed: HEADER_SIZE, available: 10 })
        ));
    }

    #[test]
    fn test_structural_errors() {
        let registry = MethodRegistry::default();
        let encoded = connection_request().encode().unwrap();

        let mut trailing = encoded.to_vec();
        trailing.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(UceMessage::decode(&trailing, &registry), Err(MessageError::TrailingBytes(2)));

        let mut unknown_method = encoded.to_vec();
        unknown_method[..2].copy_from_slice(&0x0999u16.to_be_bytes());
        assert_eq!(UceMessage::decode(&unknown_method, &registry), Err(MessageError::UnknownMethod(0x0999)));

        let mut bad_level = encoded.to_vec();
        bad_level[2] = 0x07;
        assert_eq!(UceMessage::decode(&bad_level, &registry), Err(MessageError::UnknownSemanticLevel(0x07)));

        // Relay codes are unknown to a registry without the relay decoder
        let relay = UceMessage::request(RelayMethod::Refresh).encode().unwrap();
        let common_only = MethodRegistry::empty().with_decoder(crate::nat::message::CommonMethodDecoder);
        assert_eq!(
            UceMessage::decode(&relay, &common_only),
            Err(MessageError::UnknownMethod(RelayMethod::Refresh.code()))
        );
    }

    #[test]
    fn test_response_correlation() {
        let request = UceMessage::request(CommonMethod::Register);
        let response = UceMessage::response_to(&request, SemanticLevel::SuccessResponse);
        assert!(response.answers(&request));

        let other = UceMessage::request(CommonMethod::Register);
        assert!(!response.answers(&other));
        assert!(!request.answers(&request));
    }

    #[test]
    fn test_typed_getters() {
        let message = connection_request();
        assert_eq!(message.unique_user_names().collect::<Vec<_>>(), vec!["alice"]);
        assert_eq!(
            message.endpoint_of_class(EndpointClass::ConnectionReversal).map(|e| e.addr),
            Some("10.0.0.2:50123".parse().unwrap())
        );
        assert!(message.endpoint_of_class(EndpointClass::Relay).is_none());
        assert!(message.error_code().is_none());
    }
}
