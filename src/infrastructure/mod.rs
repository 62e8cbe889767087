//! Infrastructure layer - network and observability plumbing
//!
//! This layer provides:
//! - The TCP transport accepting handset connections
//! - Prometheus metrics

pub mod metrics;
pub mod transport;

pub use transport::{TcpTransport, Transport, TransportError};
