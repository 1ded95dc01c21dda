//! Configuration module for threadserv.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::net::{AddrParseError, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;

/// Well-known port shared by the server and the client.
pub const DEFAULT_PORT: u16 = 1027;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "threadserv")]
#[command(author = "threadserv authors")]
#[command(version = "0.1.0")]
#[command(about = "Thread-per-connection TCP server and relay client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Accept connections and run one handler thread per connection
    Serve {
        /// Address to bind to (e.g., 0.0.0.0:1027)
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Pending-connection queue length passed to listen(2)
        #[arg(short = 'b', long)]
        backlog: Option<i32>,

        /// Handler run for each connection
        #[arg(long, value_enum)]
        protocol: Option<ProtocolType>,

        /// Line buffer size for the echo handler, terminator included
        #[arg(long)]
        line_capacity: Option<usize>,
    },
    /// Connect to a server and relay stdin/stdout over the connection
    Connect {
        /// Server IPv4 address (e.g., 127.0.0.1)
        address: String,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Largest chunk forwarded per readiness event
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

/// Handler selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Echo each line back verbatim
    Echo,
    /// Send one random word, then close
    Greeting,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Pending-connection queue length
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Handler for accepted connections
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,
    /// Line buffer size for the echo handler
    #[serde(default = "default_line_capacity")]
    pub line_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            protocol: default_protocol(),
            line_capacity: default_line_capacity(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Relay chunk size
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            chunk_size: default_chunk_size(),
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

fn default_listen() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

fn default_backlog() -> i32 {
    5
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Echo
}

fn default_line_capacity() -> usize {
    256
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_chunk_size() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the process does once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Serve { listen: SocketAddr },
    Connect { peer: SocketAddrV4 },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub backlog: i32,
    pub protocol: ProtocolType,
    pub line_capacity: usize,
    pub chunk_size: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let log_level = if cli.log_level != "info" {
            cli.log_level
        } else {
            toml_config.logging.level
        };

        let server = toml_config.server;
        let client = toml_config.client;

        let config = match cli.command {
            CliCommand::Serve {
                listen,
                backlog,
                protocol,
                line_capacity,
            } => {
                let listen = listen.unwrap_or(server.listen);
                let listen: SocketAddr = listen
                    .parse()
                    .map_err(|e| ConfigError::InvalidAddress(listen, e))?;
                Config {
                    mode: Mode::Serve { listen },
                    backlog: backlog.unwrap_or(server.backlog),
                    protocol: protocol.unwrap_or(server.protocol),
                    line_capacity: line_capacity.unwrap_or(server.line_capacity),
                    chunk_size: client.chunk_size,
                    log_level,
                }
            }
            CliCommand::Connect {
                address,
                port,
                chunk_size,
            } => {
                let ip: Ipv4Addr = address
                    .parse()
                    .map_err(|e| ConfigError::InvalidAddress(address, e))?;
                let peer = SocketAddrV4::new(ip, port.unwrap_or(client.port));
                Config {
                    mode: Mode::Connect { peer },
                    backlog: server.backlog,
                    protocol: server.protocol,
                    line_capacity: server.line_capacity,
                    chunk_size: chunk_size.unwrap_or(client.chunk_size),
                    log_level,
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog < 1 {
            return Err(ConfigError::InvalidValue("backlog", self.backlog.to_string()));
        }
        // One data byte plus the terminator.
        if self.line_capacity < 2 {
            return Err(ConfigError::InvalidValue(
                "line_capacity",
                self.line_capacity.to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("chunk_size", "0".to_string()));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidAddress(String, AddrParseError),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidAddress(addr, e) => {
                write!(f, "Invalid address '{}': {}", addr, e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: {}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
