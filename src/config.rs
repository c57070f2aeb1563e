//! Configuration for the QuickFeather programmer

use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;

/// Default OpenOCD executable, overridable with `OPENOCD`
pub const DEFAULT_OPENOCD: &str = "openocd";
/// Default GDB executable, overridable with `GDB`
pub const DEFAULT_GDB: &str = "gdb";
/// Interpreter used to run the bitstream converter module
pub const DEFAULT_PYTHON: &str = "python";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "quickfeather-program")]
#[command(about = "Program a QuickFeather board via OpenOCD and GDB, or serve the programmer over MCP")]
#[command(version)]
pub struct Args {
    /// Design name to program, then exit (serves MCP over stdio when omitted)
    #[arg(long)]
    pub program: Option<String>,

    /// Directory holding build products (<name>.bit)
    #[arg(long, default_value = "build")]
    pub build_dir: PathBuf,

    /// OpenOCD executable (needs EOS S3 support)
    #[arg(long, env = "OPENOCD", default_value = DEFAULT_OPENOCD)]
    pub openocd_path: PathBuf,

    /// GDB executable
    #[arg(long, env = "GDB", default_value = DEFAULT_GDB)]
    pub gdb_path: PathBuf,

    /// Continue even if the bitstream converter exits non-zero
    #[arg(long)]
    pub ignore_converter_status: bool,

    /// Stop OpenOCD after GDB exits successfully
    #[arg(long)]
    pub stop_daemon: bool,

    /// How long to wait for OpenOCD's GDB port, in milliseconds (0 disables the wait)
    #[arg(long, default_value = "5000")]
    pub ready_timeout_ms: u64,

    /// Kill GDB if it runs longer than this many seconds
    #[arg(long)]
    pub client_timeout_secs: Option<u64>,

    /// Program the bitstream where it sits and leave top.cfg and gdb.commands
    /// in the build directory
    #[arg(long)]
    pub keep_files: bool,

    /// Default serial port for the UART console monitor
    #[arg(long)]
    pub serial_port: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// How the GDB client's stdio is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIo {
    /// stdin/stdout/stderr inherited from this process
    Inherit,
    /// stdin closed, output captured and logged
    Captured,
}

/// Settings for one programming session
#[derive(Debug, Clone)]
pub struct ProgrammerConfig {
    pub openocd_path: PathBuf,
    pub gdb_path: PathBuf,
    pub python_path: PathBuf,
    /// Fail with `ConverterFailed` when the converter exits non-zero
    pub check_converter_status: bool,
    /// Bounded wait for the GDB port before running the client; `None` skips it
    pub daemon_ready_timeout: Option<Duration>,
    pub client_timeout: Option<Duration>,
    pub stop_daemon_on_success: bool,
    pub client_io: ClientIo,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            openocd_path: PathBuf::from(DEFAULT_OPENOCD),
            gdb_path: PathBuf::from(DEFAULT_GDB),
            python_path: PathBuf::from(DEFAULT_PYTHON),
            check_converter_status: true,
            daemon_ready_timeout: Some(Duration::from_secs(5)),
            client_timeout: None,
            stop_daemon_on_success: false,
            client_io: ClientIo::Inherit,
        }
    }
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct Config {
    pub programmer: ProgrammerConfig,
    /// Build directory used when a tool call does not name one
    pub build_dir: PathBuf,
    /// Write generated files next to the build products instead of a temp dir
    pub keep_files: bool,
    /// Default serial port for monitor tool
    pub default_serial_port: Option<String>,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        let daemon_ready_timeout = match args.ready_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            programmer: ProgrammerConfig {
                openocd_path: args.openocd_path.clone(),
                gdb_path: args.gdb_path.clone(),
                check_converter_status: !args.ignore_converter_status,
                daemon_ready_timeout,
                client_timeout: args.client_timeout_secs.map(Duration::from_secs),
                stop_daemon_on_success: args.stop_daemon,
                ..ProgrammerConfig::default()
            },
            build_dir: args.build_dir.clone(),
            keep_files: args.keep_files,
            default_serial_port: args.serial_port.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            programmer: ProgrammerConfig::default(),
            build_dir: PathBuf::from("build"),
            keep_files: false,
            default_serial_port: None,
        }
    }
}
