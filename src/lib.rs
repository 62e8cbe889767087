//! MiniATS - a small call-switching exchange built with Rust
//!
//! Handsets connect over TCP, get a subscriber number, and place calls to
//! each other through a single switch that carries at most
//! `max_connections` calls at once. Layered the usual way: domain
//! (line states, calls), application (the switch), infrastructure
//! (transport, metrics) and interface (line protocol, session gateway).

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::Switch;
pub use domain::shared::error::SwitchError;
pub use domain::shared::result::Result;
