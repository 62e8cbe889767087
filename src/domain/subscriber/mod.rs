//! Subscriber bounded context - per-endpoint line state

pub mod entity;
pub mod value_object;

pub use entity::Subscriber;
pub use value_object::SubscriberState;
