//! lineserve: a multiplexed line-oriented text protocol server
//!
//! One thread, one readiness poller, many concurrent connections. Each
//! connection runs a protocol chain of substitutable stages:
//! - framing: byte stream to delimited records and back
//! - codec: record bytes to text and back
//! - dispatch: text line to command handler to reply
//!
//! Configuration via CLI arguments or TOML file.

mod chain;
mod commands;
mod config;
mod runtime;

use config::Config;
use runtime::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        delimiter = ?config.delimiter,
        encoding = ?config.encoding,
        "Starting lineserve"
    );

    let mut server = Server::bind(config, commands::builtin())?;

    // A fatal listener or poll failure propagates here and the process
    // exits with a non-zero status; the normal return path exits 0.
    server.run()?;
    Ok(())
}
