//! NAT traversal: situation classification, technique selection and
//! mediator-driven connection establishment.

pub mod error;
pub mod message;
pub mod relay;
pub mod reversal;
pub mod situation;
pub mod technique;
pub mod wait;

pub use error::{MessageError, TableError, UceError, UceResult};
pub use message::{
    Attribute, CommonMethod, EndpointClass, MethodDecoder, MethodRegistry, SemanticLevel, SocketEndpoint,
    TransactionId, UceMessage, UceMethod,
};
pub use relay::{RelayMethod, RelayMethodDecoder};
pub use reversal::{ConnectionReversalSource, ConnectionReversalTarget, ReversalConfig, ReversalState, TargetConfig};
pub use situation::{NatFeatureRealization, NatSituation};
pub use technique::{all_possible_situations, parse_situations, Technique, TechniqueTable};
pub use wait::{bounded, Wait};

/// Decoders for every technique in this crate: common methods first, then relay
pub fn default_methods() -> MethodRegistry {
    MethodRegistry::empty()
        .with_decoder(message::CommonMethodDecoder)
        .with_decoder(RelayMethodDecoder)
}

impl Default for MethodRegistry {
    fn default() -> Self {
        default_methods()
    }
}
