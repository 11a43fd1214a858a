//! Error taxonomy for the event loop.
//!
//! Connection-scoped failures tear down one connection and leave the loop
//! running; process-scoped failures abort the loop after best-effort
//! cleanup and the process exits non-zero. Would-block is never an error
//! on either path — partial I/O resumes on the next readiness event.

use std::io;
use thiserror::Error;

/// Process-scoped failure: the server cannot keep accepting work.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("listener socket failed: {0}")]
    Accept(#[source] io::Error),

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
}

/// Connection-scoped failure: tears down that connection only.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("interest registration failed: {0}")]
    Register(#[source] io::Error),
}
