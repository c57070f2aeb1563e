//! Type definitions for QuickFeather MCP tools

use serde::Deserialize;
use schemars::JsonSchema;

// ============================================================================
// program
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProgramArgs {
    /// Design name; programs "<name>.bit" from the build directory
    pub name: String,
    /// Build directory (defaults to the server's --build-dir)
    #[serde(default)]
    pub build_dir: Option<String>,
    /// Kill GDB (and OpenOCD) after this many seconds (default: 600)
    #[serde(default = "default_program_timeout")]
    pub timeout_seconds: u64,
}

fn default_program_timeout() -> u64 { 600 }

// ============================================================================
// board_info
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BoardInfoArgs {
    /// Output format: "text" (default) or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String { "text".to_string() }

// ============================================================================
// connector_pin
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConnectorPinArgs {
    /// Connector designator (e.g., "J2", "J3", "J8")
    pub connector: String,
    /// 1-based position on the connector
    pub position: usize,
}

// ============================================================================
// monitor (serial console)
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MonitorArgs {
    /// Serial port (e.g., "/dev/ttyACM0"). Uses default from config if omitted.
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate (default: 115200)
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Capture duration in seconds (default: 5)
    #[serde(default = "default_duration")]
    pub duration_seconds: u64,
}

fn default_baud() -> u32 { crate::console::DEFAULT_BAUD_RATE }
fn default_duration() -> u64 { 5 }
