//! UCE traversal library (lib.rs)
//!
//! Classifies the NAT situation between two peers, selects a traversal
//! technique from a decision table and runs the technique's handshake
//! against a mediator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod nat;

// Re-export main types
pub use nat::{
    ConnectionReversalSource,
    ConnectionReversalTarget,
    NatFeatureRealization,
    NatSituation,
    ReversalConfig,
    TargetConfig,
    Technique,
    TechniqueTable,
    UceMessage,
};

// Re-export error types
pub use nat::error::{UceError, UceResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging system with custom configuration
///
/// # Arguments
/// * `level` - Log level (trace/debug/info/warn/error)
///
/// # Example
/// ```no_run
/// uce_traversal::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(true)
        )
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
