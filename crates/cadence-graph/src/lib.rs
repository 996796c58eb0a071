//! Normalized-graph response resolver.
//!
//! The target platform answers API calls with a flat list of entities that
//! reference each other by key instead of nesting. This crate indexes such
//! a response once and projects it into typed conversation and message
//! views, without ever going back to the network during resolution.

pub mod normalized;
pub mod resolver;
pub mod views;

pub use normalized::{Entity, EntityIndex, NormalizedResponse};
pub use resolver::{Resolver, ResolverOptions};
pub use views::{ConversationView, MessageView, ParticipantSource};
