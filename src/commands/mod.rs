/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes four top-level command modules:

- `servers`  -- List servers managed by the gateway
- `sessions` -- List sessions the gateway holds for this connection
- `call`     -- Invoke one tool through the gateway or a stdio server
- `tools`    -- List the tools of a configured stdio server

Every handler owns the clients it creates and shuts them down before
returning, whether or not the command succeeded.
*/

use crate::error::{BridgeError, Result};
use colored::Colorize;
use prettytable::{format, Table};

// Gateway server listing
pub mod servers {
    //! `servers` command handler.

    use super::*;
    use crate::config::Config;
    use crate::mcp::facade::GatewayToolClient;
    use crate::mcp::types::ListServersResponse;

    /// Print the gateway's managed servers as a table
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable or the request fails.
    pub async fn list_servers(config: &Config) -> Result<()> {
        let client = GatewayToolClient::connect(&config.gateway).await?;
        let outcome = client.list_servers().await;
        client.shutdown().await;
        let servers = outcome?;

        if servers.servers.is_empty() {
            println!("{}", "No servers reported by the gateway.".yellow());
            return Ok(());
        }

        println!("\nGateway servers ({}):", servers.count);
        servers_table(&servers).printstd();
        println!();
        Ok(())
    }

    /// Build the server listing table
    pub fn servers_table(servers: &ListServersResponse) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row![
            "Name".bold(),
            "Type".bold(),
            "Port".bold(),
            "Status".bold(),
            "Running".bold(),
            "Auto Start".bold()
        ]);

        for server in &servers.servers {
            let port = server
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let running = if server.is_running {
                "yes".green()
            } else {
                "no".red()
            };
            let auto_start = if server.auto_start { "yes" } else { "no" };
            table.add_row(prettytable::row![
                server.name.cyan(),
                server.server_type,
                port,
                server.status,
                running,
                auto_start
            ]);
        }
        table
    }
}

// Gateway session listing
pub mod sessions {
    //! `sessions` command handler.

    use super::*;
    use crate::config::Config;
    use crate::mcp::facade::GatewayToolClient;

    /// Print the gateway's sessions for this connection
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable or the request fails.
    pub async fn list_sessions(config: &Config) -> Result<()> {
        let client = GatewayToolClient::connect(&config.gateway).await?;
        let outcome = client.list_sessions().await;
        client.shutdown().await;
        let sessions = outcome?;

        if sessions.is_empty() {
            println!("{}", "No active sessions.".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row!["Session".bold(), "Server Type".bold()]);
        for session in &sessions {
            table.add_row(prettytable::row![
                field(session, "sessionId").cyan(),
                field(session, "serverType")
            ]);
        }

        println!("\nGateway sessions:");
        table.printstd();
        println!();
        Ok(())
    }

    /// String field of a gateway-defined session descriptor, or `-`
    pub fn field(session: &serde_json::Value, key: &str) -> String {
        match session.get(key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        }
    }
}

// Tool invocation
pub mod call {
    //! `call` command handler.
    //!
    //! Routes the call to the gateway by default, or to a configured stdio
    //! server with `--stdio`, and prints the tool's text result.

    use super::*;
    use crate::config::Config;
    use crate::mcp::facade::{GatewayToolClient, StdioToolClient, ToolInvoker};

    /// Invoke `tool` on `server` and print its result
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration
    /// * `server` - Gateway server type/alias, or stdio server name
    /// * `tool` - Tool name
    /// * `args` - Tool arguments as a JSON object string
    /// * `stdio` - Use a stdio server instead of the gateway
    ///
    /// # Errors
    ///
    /// Returns an error if `args` is not a JSON object or the call fails.
    pub async fn call_tool(
        config: &Config,
        server: &str,
        tool: &str,
        args: &str,
        stdio: bool,
    ) -> Result<()> {
        let arguments = parse_arguments(args)?;

        let text = if stdio {
            let client = StdioToolClient::new(config.stdio_servers());
            let outcome = client.call_tool(server, tool, arguments).await;
            client.shutdown().await;
            outcome?
        } else {
            let client = GatewayToolClient::connect(&config.gateway).await?;
            let outcome = client.call_tool(server, tool, arguments).await;
            client.shutdown().await;
            outcome?
        };

        println!("{}", text);
        Ok(())
    }

    /// Parse the `--args` value; it must be a JSON object
    pub fn parse_arguments(args: &str) -> Result<serde_json::Value> {
        let value: serde_json::Value = serde_json::from_str(args).map_err(|e| {
            BridgeError::Config(format!("--args is not valid JSON: {}", e))
        })?;
        if !value.is_object() {
            return Err(
                BridgeError::Config("--args must be a JSON object".to_string()).into(),
            );
        }
        Ok(value)
    }
}

// Stdio tool listing
pub mod tools {
    //! `tools` command handler.

    use super::*;
    use crate::config::Config;
    use crate::mcp::facade::StdioToolClient;
    use crate::mcp::types::McpTool;

    /// Start the stdio server `server` and print its tools
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not configured or fails to start.
    pub async fn list_tools(config: &Config, server: &str) -> Result<()> {
        let client = StdioToolClient::new(config.stdio_servers());
        let outcome = client.list_tools(server).await;
        client.shutdown().await;
        let tools = outcome?;

        if tools.is_empty() {
            println!("{}", format!("Server {} advertises no tools.", server).yellow());
            return Ok(());
        }

        println!("\nTools of {}:", server.cyan());
        tools_table(&tools).printstd();
        println!();
        Ok(())
    }

    /// Build the tool listing table
    pub fn tools_table(tools: &[McpTool]) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row!["Name".bold(), "Description".bold()]);
        for tool in tools {
            table.add_row(prettytable::row![
                tool.name.cyan(),
                tool.description.as_deref().unwrap_or("-")
            ]);
        }
        table
    }
}
