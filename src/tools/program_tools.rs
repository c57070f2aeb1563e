//! RMCP 0.3.2 implementation for QuickFeather MCP tools
//!
//! Programs bitstreams through OpenOCD + GDB, answers board pinout queries and
//! captures the board's UART console.

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
};
use tracing::info;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::types::*;
use crate::board::QUICKFEATHER;
use crate::console;
use crate::config::{ClientIo, Config};
use crate::error::ProgrammingError;
use crate::products::DirectoryProducts;
use crate::programmer::DeviceProgrammer;

/// QuickFeather tool handler
#[derive(Clone)]
pub struct QuickfeatherToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<QuickfeatherToolHandler>,
    config: Config,
    /// OpenOCD always serves GDB on port 3333, so sessions run one at a time
    program_lock: Arc<Mutex<()>>,
}

impl QuickfeatherToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
            program_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Programmer for one tool call. GDB must not touch our stdio, which
    /// carries the MCP transport.
    fn programmer(&self, timeout: Duration) -> DeviceProgrammer {
        let mut config = self.config.programmer.clone();
        config.client_io = ClientIo::Captured;
        config.client_timeout = Some(timeout);
        // A daemon left behind would keep port 3333 and serve the next call
        config.stop_daemon_on_success = true;
        DeviceProgrammer::new(config)
    }
}

fn make_error(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

fn program_error(e: ProgrammingError) -> McpError {
    match e {
        ProgrammingError::ArtifactNotFound(msg) => McpError::invalid_params(msg, None),
        other => make_error(other.to_string()),
    }
}

#[tool_router]
impl QuickfeatherToolHandler {
    #[tool(description = "Program a built bitstream (<name>.bit) onto the QuickFeather via OpenOCD and GDB")]
    async fn program(&self, Parameters(args): Parameters<ProgramArgs>) -> Result<CallToolResult, McpError> {
        let build_dir = args.build_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.build_dir.clone());
        let mut products = DirectoryProducts::new(&build_dir);
        if self.config.keep_files {
            products = products.in_place();
        }
        let programmer = self.programmer(Duration::from_secs(args.timeout_seconds));

        let _guard = self.program_lock.lock().await;
        info!("Programming '{}' from {}", args.name, build_dir.display());

        let report = programmer
            .program(&products, &args.name)
            .await
            .map_err(program_error)?;

        let mut message = format!(
            "Programmed '{}'\n\
             Session ID: {}\n\
             OpenOCD pid: {}\n\
             OpenOCD stopped: {}\n\
             Elapsed: {:.1}s",
            report.design,
            report.session_id,
            report.daemon_pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string()),
            report.daemon_stopped,
            report.elapsed.as_secs_f64(),
        );
        if let Some(output) = report.client_output.as_deref().map(str::trim) {
            if !output.is_empty() {
                message.push_str("\n\nGDB output:\n");
                message.push_str(output);
            }
        }

        Ok(CallToolResult::success(vec![Content::text(message)]))
    }

    #[tool(description = "Describe the QuickFeather pinout: device, resources and connectors")]
    async fn board_info(&self, Parameters(args): Parameters<BoardInfoArgs>) -> Result<CallToolResult, McpError> {
        let text = match args.format.as_str() {
            "json" => serde_json::to_string_pretty(&QUICKFEATHER)
                .map_err(|e| make_error(format!("Failed to serialize board: {}", e)))?,
            _ => QUICKFEATHER.to_string(),
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Resolve a connector position (e.g. J2 pin 3) to the FPGA device pin")]
    async fn connector_pin(&self, Parameters(args): Parameters<ConnectorPinArgs>) -> Result<CallToolResult, McpError> {
        match QUICKFEATHER.resolve_connector_pin(&args.connector, args.position) {
            Some(pin) => Ok(CallToolResult::success(vec![Content::text(format!(
                "{} position {} -> device pin {}", args.connector, args.position, pin
            ))])),
            None => Err(McpError::invalid_params(
                format!("{} position {} is not wired to the FPGA", args.connector, args.position),
                None,
            )),
        }
    }

    #[tool(description = "Capture the QuickFeather UART console (uart0, J3 header) for a specified duration")]
    async fn monitor(&self, Parameters(args): Parameters<MonitorArgs>) -> Result<CallToolResult, McpError> {
        let port_name = args.port
            .or_else(|| self.config.default_serial_port.clone())
            .ok_or_else(|| McpError::invalid_params(
                "No serial port specified and no default configured. Pass port parameter or use --serial-port CLI flag.".to_string(),
                None,
            ))?;

        let uart = console::uart_description(&QUICKFEATHER).unwrap_or_else(|| "uart".to_string());
        info!("Monitoring {} on {} at {} baud for {}s", uart, port_name, args.baud_rate, args.duration_seconds);

        let port = console::open(&port_name, args.baud_rate).map_err(|e| {
            make_error(format!("Failed to open serial port {}: {}", port_name, e))
        })?;
        let output = console::capture(port, Duration::from_secs(args.duration_seconds)).await;

        let message = if output.is_empty() {
            format!("No output captured from {} ({}) in {}s", port_name, uart, args.duration_seconds)
        } else {
            format!(
                "Console output from {} ({}, {}s capture, {} bytes):\n\n{}",
                port_name,
                uart,
                args.duration_seconds,
                output.len(),
                output
            )
        };

        Ok(CallToolResult::success(vec![Content::text(message)]))
    }
}

#[tool_handler]
impl ServerHandler for QuickfeatherToolHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> QuickfeatherToolHandler {
        QuickfeatherToolHandler::new(Config::default())
    }

    fn extract_text(result: &CallToolResult) -> &str {
        &result.content[0].as_text().expect("expected text content").text
    }

    #[test]
    fn test_programmer_settings() {
        let programmer = handler().programmer(Duration::from_secs(42));
        let config = programmer.config();

        assert_eq!(config.client_io, ClientIo::Captured);
        assert_eq!(config.client_timeout, Some(Duration::from_secs(42)));
        assert!(config.stop_daemon_on_success);
    }

    #[tokio::test]
    async fn test_board_info_text() {
        let result = handler()
            .board_info(Parameters(BoardInfoArgs { format: "text".to_string() }))
            .await
            .unwrap();

        let text = extract_text(&result);
        assert!(text.contains("ql-eos-s3_wlcsp"));
        assert!(text.contains("J8"));
    }

    #[tokio::test]
    async fn test_board_info_json() {
        let result = handler()
            .board_info(Parameters(BoardInfoArgs { format: "json".to_string() }))
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(json["device"], "ql-eos-s3_wlcsp");
        assert_eq!(json["package"], "PU64");
        assert!(json["connectors"].as_array().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn test_connector_pin_wired() {
        let result = handler()
            .connector_pin(Parameters(ConnectorPinArgs {
                connector: "J8".to_string(),
                position: 10,
            }))
            .await
            .unwrap();

        assert_eq!(extract_text(&result), "J8 position 10 -> device pin 62");
    }

    #[tokio::test]
    async fn test_connector_pin_unwired() {
        let err = handler()
            .connector_pin(Parameters(ConnectorPinArgs {
                connector: "J2".to_string(),
                position: 1,
            }))
            .await
            .unwrap_err();

        assert!(err.message.contains("not wired"));
    }

    #[tokio::test]
    async fn test_monitor_without_port() {
        let err = handler()
            .monitor(Parameters(MonitorArgs {
                port: None,
                baud_rate: 115200,
                duration_seconds: 1,
            }))
            .await
            .unwrap_err();

        assert!(err.message.contains("No serial port"));
    }
}
