//! Error types for the QuickFeather programmer

use thiserror::Error;

/// Failure of a programming session.
///
/// Every variant surfaces to the caller of `program`; nothing is retried.
#[derive(Error, Debug)]
pub enum ProgrammingError {
    #[error("Build artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Bitstream conversion failed: {0}")]
    ConverterFailed(String),

    #[error("OpenOCD launch failed: {0}")]
    DaemonLaunchFailed(String),

    #[error("GDB client failed: {0}")]
    ClientFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ProgrammingError>;
