//! Configuration management for mcp-bridge
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{BridgeError, Result};
use crate::mcp::transport::stdio::ServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for mcp-bridge
///
/// Holds the gateway connection settings and the stdio servers that can be
/// launched locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway connection configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Stdio servers keyed by name
    #[serde(default)]
    pub servers: HashMap<String, StdioServerConfig>,
}

/// Gateway connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Gateway port
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Timeout for establishing the connection (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Default timeout for each request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Short names accepted in place of gateway server types,
    /// e.g. `devops: "Azure DevOps"`
    #[serde(default)]
    pub server_aliases: HashMap<String, String>,

    /// Per server type: injected variable name -> source environment variable
    #[serde(default)]
    pub credentials: HashMap<String, HashMap<String, String>>,
}

fn default_gateway_host() -> String {
    "localhost".to_string()
}

fn default_gateway_port() -> u16 {
    8700
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
            server_aliases: HashMap::new(),
            credentials: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Default request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Launch settings for one stdio server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioServerConfig {
    /// Program and leading arguments, e.g. `["python3", "server.py"]`
    pub command: Vec<String>,

    /// Extra arguments appended to `command`
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides layered over the parent environment
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Bound on waiting for each response (seconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Grace period between SIGTERM and SIGKILL on stop (seconds)
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

fn default_read_timeout() -> u64 {
    60
}

fn default_stop_grace() -> u64 {
    5
}

impl StdioServerConfig {
    /// Build the transport launch description for server `name`.
    pub fn to_server_config(&self, name: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            read_timeout: Duration::from_secs(self.read_timeout_seconds),
            stop_grace: Duration::from_secs(self.stop_grace_seconds),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("MCP_BRIDGE_GATEWAY_HOST") {
            self.gateway.host = host;
        }

        if let Ok(port) = std::env::var("MCP_BRIDGE_GATEWAY_PORT") {
            if let Ok(value) = port.parse() {
                self.gateway.port = value;
            } else {
                tracing::warn!("Invalid MCP_BRIDGE_GATEWAY_PORT: {}", port);
            }
        }

        if let Ok(timeout) = std::env::var("MCP_BRIDGE_REQUEST_TIMEOUT") {
            if let Ok(value) = timeout.parse() {
                self.gateway.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid MCP_BRIDGE_REQUEST_TIMEOUT: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(host) = &cli.host {
            self.gateway.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.gateway.port = port;
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Launch descriptions for every configured stdio server, sorted by name
    pub fn stdio_servers(&self) -> Vec<ServerConfig> {
        let mut servers: Vec<ServerConfig> = self
            .servers
            .iter()
            .map(|(name, server)| server.to_server_config(name))
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            return Err(BridgeError::Config("gateway.host cannot be empty".to_string()).into());
        }

        if self.gateway.port == 0 {
            return Err(
                BridgeError::Config("gateway.port must be greater than 0".to_string()).into(),
            );
        }

        if self.gateway.connect_timeout_seconds == 0 {
            return Err(BridgeError::Config(
                "gateway.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.gateway.request_timeout_seconds == 0 {
            return Err(BridgeError::Config(
                "gateway.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for (name, server) in &self.servers {
            if server.command.is_empty() || server.command[0].trim().is_empty() {
                return Err(BridgeError::Config(format!(
                    "servers.{name}.command cannot be empty"
                ))
                .into());
            }
            if server.read_timeout_seconds == 0 {
                return Err(BridgeError::Config(format!(
                    "servers.{name}.read_timeout_seconds must be greater than 0"
                ))
                .into());
            }
        }

        Ok(())
    }
}
