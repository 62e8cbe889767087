//! Call bounded context - a pairing of two subscribers

pub mod aggregate;

pub use aggregate::Call;
