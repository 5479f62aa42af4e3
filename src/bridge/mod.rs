//! Core bridge between the message bus and Discord channels.
//!
//! ## Module Structure
//!
//! - `registry`: address <-> channel links
//! - `events`: inbound bus events fanned out to processors
//! - `commands`: chat messages forwarded to game servers
//! - `service`: wiring of both loops and the produced surface
//! - `shutdown`: the shared cancellation signal

pub mod commands;
pub mod events;
pub mod registry;
pub mod service;
pub mod shutdown;

pub use commands::{ChatCommand, CommandQueue, CommandRouter, EnqueueError};
pub use events::{DispatchError, DispatchOutcome, EventRouter};
pub use registry::LinkRegistry;
pub use service::{LinkTarget, Service};
pub use shutdown::Shutdown;
