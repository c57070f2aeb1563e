//! QuickFeather Programmer
//!
//! Board description and bitstream programmer for the QuickLogic QuickFeather
//! (EOS S3). Converts a bitstream to an OpenOCD config, drives OpenOCD and GDB
//! to load it, and exposes the same operations as an MCP server.

pub mod board;
pub mod config;
pub mod console;
pub mod error;
pub mod products;
pub mod programmer;
pub mod tools;

pub use board::QUICKFEATHER;
pub use config::{Args, ClientIo, Config, ProgrammerConfig};
pub use error::{ProgrammingError, Result};
pub use products::{BuildProducts, DirectoryProducts, ExtractedArtifact, MemoryProducts};
pub use programmer::{DeviceProgrammer, ProgramReport, ProgrammingSession};
pub use tools::QuickfeatherToolHandler;
