//! Configuration module for the lineserve server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Text encoding used by the codec stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum TextEncoding {
    /// Byte-preserving 1:1 mapping; decoding never fails.
    #[serde(rename = "latin-1")]
    #[value(name = "latin-1")]
    Latin1,
    /// Strict UTF-8; malformed records get a per-record error reply.
    #[serde(rename = "utf-8")]
    #[value(name = "utf-8")]
    Utf8,
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "lineserve")]
#[command(author = "lineserve authors")]
#[command(version = "0.1.0")]
#[command(about = "A multiplexed line-oriented text protocol server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Line delimiter for inbound and outbound framing
    #[arg(short, long)]
    pub delimiter: Option<String>,

    /// Text encoding for the codec stage
    #[arg(short, long, value_enum)]
    pub encoding: Option<TextEncoding>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Protocol chain configuration
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    /// Line delimiter: a single byte or "\r\n"
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Text encoding
    #[serde(default = "default_encoding")]
    pub encoding: TextEncoding,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            encoding: default_encoding(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    12345
}

fn default_delimiter() -> String {
    "\n".to_string()
}

fn default_encoding() -> TextEncoding {
    TextEncoding::Latin1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub delimiter: String,
    pub encoding: TextEncoding,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::FileRead {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParse {
                path: config_path.clone(),
                source: e,
            })?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        let config = Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            delimiter: cli.delimiter.unwrap_or(toml_config.protocol.delimiter),
            encoding: cli.encoding.unwrap_or(toml_config.protocol.encoding),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        validate_delimiter(&config.delimiter)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            delimiter: default_delimiter(),
            encoding: default_encoding(),
            log_level: default_log_level(),
        }
    }
}

/// A delimiter must be a single byte or the two-byte CRLF pair.
pub fn validate_delimiter(delimiter: &str) -> Result<(), ConfigError> {
    if delimiter.len() == 1 || delimiter == "\r\n" {
        Ok(())
    } else {
        Err(ConfigError::InvalidDelimiter(delimiter.to_string()))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unsupported line delimiter {0:?}: must be one byte or \"\\r\\n\"")]
    InvalidDelimiter(String),
}
