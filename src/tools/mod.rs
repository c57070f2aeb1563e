//! QuickFeather MCP tools module
//!
//! Unified tool handler exposing the programmer and board data using the
//! RMCP 0.3.2 API patterns.

pub mod program_tools;
pub mod types;

pub use program_tools::*;
pub use types::*;
