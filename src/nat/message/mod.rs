//! Message protocol model shared by every traversal technique

pub mod attribute;
pub mod method;
pub mod protocol;

pub use attribute::{Attribute, AttributeType, EndpointClass, SocketEndpoint};
pub use method::{CommonMethod, CommonMethodDecoder, MethodDecoder, MethodRegistry, UceMethod};
pub use protocol::{SemanticLevel, TransactionId, UceMessage, HEADER_SIZE, MAX_DATAGRAM_SIZE};
