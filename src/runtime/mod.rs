//! Readiness-based runtime.
//!
//! - `event_loop`: the `Poll`-driven server loop and connection registry
//! - `connection`: per-connection buffered state and non-blocking I/O
//! - `error`: connection-scoped vs process-scoped failure taxonomy

mod connection;
mod error;
mod event_loop;

pub use error::{ConnectionError, FatalError};
pub use event_loop::Server;
