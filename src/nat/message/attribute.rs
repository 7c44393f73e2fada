// src/nat/message/attribute.rs
//! Typed message attributes.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, BytesMut};
use uuid::Uuid;

use crate::nat::error::MessageError;

/// Attribute type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AttributeType {
    /// Registered user name (UTF-8)
    UniqueUserName = 0x0001,
    /// Classed socket address
    SocketEndpoint = 0x0002,
    /// Numeric code and UTF-8 reason
    ErrorCode = 0x0003,
    /// Seconds, u32
    Lifetime = 0x0004,
    /// 16-byte opaque token
    Token = 0x0005,
    /// Application payload
    Data = 0x0006,
}

impl AttributeType {
    /// Known tag for `code`, if any
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::UniqueUserName),
            0x0002 => Some(Self::SocketEndpoint),
            0x0003 => Some(Self::ErrorCode),
            0x0004 => Some(Self::Lifetime),
            0x0005 => Some(Self::Token),
            0x0006 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Role of an advertised endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EndpointClass {
    /// Host-local address
    Private = 0x01,

    /// Address observed by the mediator
    Public = 0x02,

    /// Listening endpoint of a connection reversal source
    ConnectionReversal = 0x03,

    /// Endpoint used for hole punching
    HolePunching = 0x04,

    /// Relay allocation
    Relay = 0x05,
}

impl EndpointClass {
    /// Class for a wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Private),
            0x02 => Some(Self::Public),
            0x03 => Some(Self::ConnectionReversal),
            0x04 => Some(Self::HolePunching),
            0x05 => Some(Self::Relay),
            _ => None,
        }
    }
}

/// Socket address tagged with its role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketEndpoint {
    /// Address and port
    pub addr: SocketAddr,
    /// Role of the address
    pub class: EndpointClass,
}

impl SocketEndpoint {
    /// Tag `addr` with `class`
    pub fn new(addr: SocketAddr, class: EndpointClass) -> Self {
        Self { addr, class }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.addr, self.class)
    }
}

/// Message attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Registered user name
    UniqueUserName(String),
    /// Classed socket address
    SocketEndpoint(SocketEndpoint),
    /// Failure reported in an error response
    ErrorCode {
        /// Numeric error code
        code: u16,
        /// Human-readable reason
        reason: String,
    },
    /// Lifetime in seconds
    Lifetime(u32),
    /// Opaque token
    Token(Uuid),
    /// Application payload
    Data(Vec<u8>),
    /// Attribute no decoder understands, carried verbatim.
    ///
    /// `attr_type` must not be one of the [`AttributeType`] tags; such an
    /// attribute is refused by [`Attribute::encode`].
    Unknown {
        /// Type tag as received
        attr_type: u16,
        /// Raw payload
        value: Vec<u8>,
    },
}

impl Attribute {
    /// Wire type tag
    pub fn attr_type(&self) -> u16 {
        match self {
            Self::UniqueUserName(_) => AttributeType::UniqueUserName as u16,
            Self::SocketEndpoint(_) => AttributeType::SocketEndpoint as u16,
            Self::ErrorCode { .. } => AttributeType::ErrorCode as u16,
            Self::Lifetime(_) => AttributeType::Lifetime as u16,
            Self::Token(_) => AttributeType::Token as u16,
            Self::Data(_) => AttributeType::Data as u16,
            Self::Unknown { attr_type, .. } => *attr_type,
        }
    }

    /// Append type, length and payload.
    ///
    /// Fails without touching `buf` when the attribute would not decode back
    /// to itself: an `Unknown` carrying a known tag, or an IPv6 endpoint with
    /// a scope id or flow label.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), MessageError> {
        self.check_encodable()?;
        let start_pos = buf.len();

        buf.put_u16(self.attr_type());
        buf.put_u16(0); // Length placeholder

        match self {
            Self::UniqueUserName(name) => buf.put_slice(name.as_bytes()),
            Self::SocketEndpoint(endpoint) => encode_endpoint(buf, endpoint),
            Self::ErrorCode { code, reason } => {
                buf.put_u16(*code);
                buf.put_slice(reason.as_bytes());
            }
            Self::Lifetime(seconds) => buf.put_u32(*seconds),
            Self::Token(token) => buf.put_slice(token.as_bytes()),
            Self::Data(data) | Self::Unknown { value: data, .. } => buf.put_slice(data),
        }

        let value_len = buf.len() - start_pos - 4;
        let len = match u16::try_from(value_len) {
            Ok(len) => len,
            Err(_) => {
                buf.truncate(start_pos);
                return Err(MessageError::InvalidAttribute {
                    attr_type: self.attr_type(),
                    reason: format!("payload of {} bytes exceeds length field", value_len),
                });
            }
        };
        buf[start_pos + 2..start_pos + 4].copy_from_slice(&len.to_be_bytes());

        Ok(())
    }

    fn check_encodable(&self) -> Result<(), MessageError> {
        let invalid = |reason: String| MessageError::InvalidAttribute {
            attr_type: self.attr_type(),
            reason,
        };

        match self {
            Self::Unknown { attr_type, .. } => match AttributeType::from_code(*attr_type) {
                Some(known) => Err(invalid(format!("{:?} tag cannot be sent as an unknown attribute", known))),
                None => Ok(()),
            },
            Self::SocketEndpoint(SocketEndpoint { addr: SocketAddr::V6(v6), .. }) => {
                if v6.scope_id() != 0 {
                    Err(invalid(format!("scope id {} of {} is not representable", v6.scope_id(), v6)))
                } else if v6.flowinfo() != 0 {
                    Err(invalid(format!("flow label {} of {} is not representable", v6.flowinfo(), v6)))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Decode one attribute payload; `payload` is exactly the declared length
    pub fn decode(attr_type: u16, payload: &[u8]) -> Result<Self, MessageError> {
        let invalid = |reason: String| MessageError::InvalidAttribute { attr_type, reason };

        let Some(known) = AttributeType::from_code(attr_type) else {
            return Ok(Self::Unknown {
                attr_type,
                value: payload.to_vec(),
            });
        };

        let attribute = match known {
            AttributeType::UniqueUserName => Self::UniqueUserName(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| invalid(format!("Invalid user name: {}", e)))?,
            ),
            AttributeType::SocketEndpoint => Self::SocketEndpoint(decode_endpoint(attr_type, payload)?),
            AttributeType::ErrorCode => {
                if payload.len() < 2 {
                    return Err(invalid("ERROR-CODE too short".to_string()));
                }
                let mut buf = payload;
                let code = buf.get_u16();
                let reason = String::from_utf8(buf.to_vec())
                    .map_err(|e| invalid(format!("Invalid reason: {}", e)))?;
                Self::ErrorCode { code, reason }
            }
            AttributeType::Lifetime => {
                let bytes: [u8; 4] = payload
                    .try_into()
                    .map_err(|_| invalid(format!("LIFETIME must be 4 bytes, got {}", payload.len())))?;
                Self::Lifetime(u32::from_be_bytes(bytes))
            }
            AttributeType::Token => {
                let bytes: [u8; 16] = payload
                    .try_into()
                    .map_err(|_| invalid(format!("TOKEN must be 16 bytes, got {}", payload.len())))?;
                Self::Token(Uuid::from_bytes(bytes))
            }
            AttributeType::Data => Self::Data(payload.to_vec()),
        };

        Ok(attribute)
    }
}

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

fn encode_endpoint(buf: &mut BytesMut, endpoint: &SocketEndpoint) {
    buf.put_u8(endpoint.class as u8);

    match endpoint.addr.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(FAMILY_IPV4);
            buf.put_u16(endpoint.addr.port());
            buf.put_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(FAMILY_IPV6);
            buf.put_u16(endpoint.addr.port());
            buf.put_slice(&ip.octets());
        }
    }
}

fn decode_endpoint(attr_type: u16, payload: &[u8]) -> Result<SocketEndpoint, MessageError> {
    let invalid = |reason: String| MessageError::InvalidAttribute { attr_type, reason };

    if payload.len() < 4 {
        return Err(invalid("Endpoint too short".to_string()));
    }

    let mut buf = payload;
    let class_raw = buf.get_u8();
    let class = EndpointClass::from_u8(class_raw)
        .ok_or_else(|| invalid(format!("Unknown endpoint class 0x{:02X}", class_raw)))?;
    let family = buf.get_u8();
    let port = buf.get_u16();

    let ip = match (family, buf.remaining()) {
        (FAMILY_IPV4, 4) => {
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        (FAMILY_IPV6, 16) => {
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        (FAMILY_IPV4 | FAMILY_IPV6, len) => {
            return Err(invalid(format!("Address length {} does not match family 0x{:02X}", len, family)))
        }
        _ => return Err(invalid(format!("Invalid address family: 0x{:02X}", family))),
    };

    Ok(SocketEndpoint::new(SocketAddr::new(ip, port), class))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(attribute: &Attribute) -> BytesMut {
        let mut buf = BytesMut::new();
        attribute.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_endpoint_layout() {
        let endpoint = SocketEndpoint::new("192.168.1.10:4000".parse().unwrap(), EndpointClass::ConnectionReversal);
        let buf = encoded(&Attribute::SocketEndpoint(endpoint));

        assert_eq!(&buf[..4], &[0x00, 0x02, 0x00, 0x08]);
        assert_eq!(&buf[4..], &[0x03, 0x01, 0x0F, 0xA0, 192, 168, 1, 10]);
        assert_eq!(Attribute::decode(0x0002, &buf[4..]).unwrap(), Attribute::SocketEndpoint(endpoint));
    }

    #[test]
    fn test_ipv6_endpoint() {
        let endpoint = SocketEndpoint::new("[2001:db8::1]:443".parse().unwrap(), EndpointClass::Public);
        let buf = encoded(&Attribute::SocketEndpoint(endpoint));
        assert_eq!(buf.len(), 4 + 20);
        assert_eq!(Attribute::decode(0x0002, &buf[4..]).unwrap(), Attribute::SocketEndpoint(endpoint));
    }

    #[test]
    fn test_endpoint_rejects_bad_payload() {
        // IPv4 family with IPv6-sized address
        let mut payload = vec![0x03, 0x01, 0x00, 0x50];
        payload.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            Attribute::decode(0x0002, &payload),
            Err(MessageError::InvalidAttribute { attr_type: 0x0002, .. })
        ));

        assert!(Attribute::decode(0x0002, &[0x09, 0x01, 0x00, 0x50, 1, 2, 3, 4]).is_err());
        assert!(Attribute::decode(0x0002, &[0x03, 0x07, 0x00, 0x50, 1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_fixed_width_attributes() {
        assert_eq!(Attribute::decode(0x0004, &[0, 0, 0x02, 0x58]).unwrap(), Attribute::Lifetime(600));
        assert!(Attribute::decode(0x0004, &[0, 0, 0x02]).is_err());
        assert!(Attribute::decode(0x0005, &[0u8; 15]).is_err());
    }

    #[test]
    fn test_unknown_attribute_preserved() {
        let attribute = Attribute::Unknown { attr_type: 0x7F01, value: vec![1, 2, 3] };
        let buf = encoded(&attribute);
        assert_eq!(Attribute::decode(0x7F01, &buf[4..]).unwrap(), attribute);
    }

    #[test]
    fn test_invalid_utf8_user_name() {
        assert!(matches!(
            Attribute::decode(0x0001, &[0xFF, 0xFE]),
            Err(MessageError::InvalidAttribute { attr_type: 0x0001, .. })
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut buf = BytesMut::new();
        let result = Attribute::Data(vec![0u8; 70_000]).encode(&mut buf);
        assert!(matches!(result, Err(MessageError::InvalidAttribute { attr_type: 0x0006, .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_with_known_tag_rejected() {
        for code in 0x0001..=0x0006u16 {
            let mut buf = BytesMut::new();
            let result = Attribute::Unknown { attr_type: code, value: vec![0, 0, 0, 1] }.encode(&mut buf);
            assert!(matches!(result, Err(MessageError::InvalidAttribute { attr_type, .. }) if attr_type == code));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_scoped_ipv6_endpoint_rejected() {
        let scoped = SocketEndpoint::new("[fe80::1%3]:4000".parse().unwrap(), EndpointClass::Private);
        let mut buf = BytesMut::new();
        assert!(matches!(
            Attribute::SocketEndpoint(scoped).encode(&mut buf),
            Err(MessageError::InvalidAttribute { attr_type: 0x0002, .. })
        ));
        assert!(buf.is_empty());

        let flow = SocketAddr::V6(std::net::SocketAddrV6::new("fe80::1".parse().unwrap(), 4000, 7, 0));
        assert!(Attribute::SocketEndpoint(SocketEndpoint::new(flow, EndpointClass::Private))
            .encode(&mut buf)
            .is_err());
    }
}
