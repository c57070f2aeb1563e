//! QuickFeather device programmer
//!
//! Flow for one session:
//! 1. extract `<name>.bit` from the build products into a temp directory
//! 2. convert it to `top.cfg` with `quicklogic_fasm.bitstream_to_openocd`
//! 3. start OpenOCD in the background with the adapter, board and `top.cfg` configs
//! 4. write `gdb.commands` and run GDB against OpenOCD's GDB port
//!
//! OpenOCD is killed if anything fails after it was started. The EOS S3
//! `load_bitstream` command needs OpenOCD built with EOS S3 support
//! (antmicro/openocd, `eos-s3-support` branch).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{ClientIo, ProgrammerConfig};
use crate::error::{ProgrammingError, Result};
use crate::products::BuildProducts;

/// Python module converting a bitstream into an OpenOCD config
pub const CONVERTER_MODULE: &str = "quicklogic_fasm.bitstream_to_openocd";

/// OpenOCD script search directory (`-s`)
pub const OPENOCD_SEARCH_DIR: &str = "tcl";

/// Adapter, SWD workaround and board configs, in load order. `top.cfg` follows.
pub const OPENOCD_CONFIGS: [&str; 3] = [
    "interface/ftdi/antmicro-ftdi-adapter.cfg",
    "interface/ftdi/swd-resistor-hack.cfg",
    "board/quicklogic_quickfeather.cfg",
];

/// OpenOCD's default GDB server port
pub const GDB_PORT: u16 = 3333;

/// Commands GDB runs against OpenOCD
pub const GDB_COMMANDS: [&str; 3] = ["tar rem :3333", "monitor reset halt", "monitor load_bitstream"];

pub const TOP_CFG_FILE: &str = "top.cfg";
pub const GDB_COMMANDS_FILE: &str = "gdb.commands";

/// Paths used by one programming session. Both generated files sit next to
/// the extracted bitstream.
#[derive(Debug, Clone)]
pub struct ProgrammingSession {
    pub id: String,
    pub design: String,
    pub bitstream: PathBuf,
    pub top_cfg: PathBuf,
    pub gdb_commands: PathBuf,
}

impl ProgrammingSession {
    pub fn new(design: &str, bitstream: &Path) -> Self {
        let dir = bitstream.parent().unwrap_or_else(|| Path::new("."));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            design: design.to_string(),
            bitstream: bitstream.to_path_buf(),
            top_cfg: dir.join(TOP_CFG_FILE),
            gdb_commands: dir.join(GDB_COMMANDS_FILE),
        }
    }
}

/// Outcome of a successful session
#[derive(Debug, Clone)]
pub struct ProgramReport {
    pub session_id: String,
    pub design: String,
    pub daemon_pid: Option<u32>,
    /// True when OpenOCD was stopped after GDB finished
    pub daemon_stopped: bool,
    /// GDB stdout/stderr, only with `ClientIo::Captured`
    pub client_output: Option<String>,
    pub elapsed: Duration,
}

/// `-m <module> <bitstream> <top.cfg>`
pub fn converter_args(bitstream: &Path, top_cfg: &Path) -> Vec<OsString> {
    vec![
        "-m".into(),
        CONVERTER_MODULE.into(),
        bitstream.as_os_str().to_owned(),
        top_cfg.as_os_str().to_owned(),
    ]
}

/// `-s tcl -f <adapter> -f <workaround> -f <board> -f <top.cfg>`
pub fn openocd_args(top_cfg: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-s".into(), OPENOCD_SEARCH_DIR.into()];
    for cfg in OPENOCD_CONFIGS {
        args.push("-f".into());
        args.push(cfg.into());
    }
    args.push("-f".into());
    args.push(top_cfg.as_os_str().to_owned());
    args
}

/// `-x <gdb.commands>`
pub fn gdb_args(gdb_commands: &Path) -> Vec<OsString> {
    vec!["-x".into(), gdb_commands.as_os_str().to_owned()]
}

/// Contents of `gdb.commands`
pub fn gdb_script() -> String {
    GDB_COMMANDS.join("\n")
}

/// Run a command to completion, inheriting or capturing its stdio
async fn run_to_completion(cmd: &mut Command, io: ClientIo) -> std::io::Result<(ExitStatus, String)> {
    match io {
        ClientIo::Inherit => Ok((cmd.status().await?, String::new())),
        ClientIo::Captured => {
            let output = cmd.stdin(Stdio::null()).output().await?;
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok((output.status, text))
        }
    }
}

/// Fail if something, e.g. a leftover OpenOCD, already serves the GDB port
async fn ensure_gdb_port_free() -> Result<()> {
    TcpListener::bind(("127.0.0.1", GDB_PORT))
        .await
        .map(drop)
        .map_err(|e| {
            ProgrammingError::DaemonLaunchFailed(format!(
                "port {} already in use: {}",
                GDB_PORT, e
            ))
        })
}

fn describe_failure(program: &Path, status: ExitStatus, output: &str) -> String {
    let output = output.trim();
    if output.is_empty() {
        format!("{} exited with {}", program.display(), status)
    } else {
        format!("{} exited with {}:\n{}", program.display(), status, output)
    }
}

/// Background OpenOCD process owned by a session.
///
/// Killed on drop unless released; `terminate` kills and reaps it.
struct Daemon {
    child: Child,
    armed: bool,
}

impl Daemon {
    fn spawn(config: &ProgrammerConfig, top_cfg: &Path) -> Result<Self> {
        let mut cmd = Command::new(&config.openocd_path);
        cmd.args(openocd_args(top_cfg));

        if config.client_io == ClientIo::Captured {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|e| {
            ProgrammingError::DaemonLaunchFailed(format!(
                "failed to spawn {}: {}",
                config.openocd_path.display(),
                e
            ))
        })?;

        info!("OpenOCD started (pid {:?})", child.id());
        Ok(Self { child, armed: true })
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the GDB port to accept connections, retrying with backoff
    async fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let start = tokio::time::Instant::now();
        let mut delay = Duration::from_millis(50);

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    return Err(ProgrammingError::DaemonLaunchFailed(format!(
                        "OpenOCD exited with {} before accepting connections",
                        status
                    )));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(ProgrammingError::DaemonLaunchFailed(format!(
                        "failed to poll OpenOCD: {}",
                        e
                    )));
                }
            }

            match TcpStream::connect(("127.0.0.1", GDB_PORT)).await {
                Ok(_) => {
                    // Someone answered; make sure it was not a listener our
                    // OpenOCD lost the bind race to
                    if let Ok(Some(status)) = self.child.try_wait() {
                        return Err(ProgrammingError::DaemonLaunchFailed(format!(
                            "OpenOCD exited with {} while port {} was answering",
                            status, GDB_PORT
                        )));
                    }
                    debug!("OpenOCD GDB port {} is up", GDB_PORT);
                    return Ok(());
                }
                Err(_) if start.elapsed() < timeout => {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_millis(500));
                }
                Err(e) => {
                    return Err(ProgrammingError::DaemonLaunchFailed(format!(
                        "GDB port {} not reachable after {:?}: {}",
                        GDB_PORT, timeout, e
                    )));
                }
            }
        }
    }

    /// Kill and reap the process
    async fn terminate(mut self) {
        self.armed = false;
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("OpenOCD already exited with {}", status);
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill OpenOCD: {}", e);
        } else {
            info!("OpenOCD stopped");
        }
    }

    /// Leave the process running
    fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.child.start_kill();
        }
    }
}

/// Programs a QuickFeather over OpenOCD + GDB
#[derive(Debug, Clone)]
pub struct DeviceProgrammer {
    config: ProgrammerConfig,
}

impl DeviceProgrammer {
    pub fn new(config: ProgrammerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProgrammerConfig {
        &self.config
    }

    /// Program the bitstream of design `name` onto the board
    pub async fn program(&self, products: &dyn BuildProducts, name: &str) -> Result<ProgramReport> {
        if name.is_empty() {
            return Err(ProgrammingError::ArtifactNotFound("empty design name".to_string()));
        }

        let started = Instant::now();
        // Keeps the temp directory alive until the session ends
        let artifact = products.extract(&format!("{}.bit", name))?;
        let session = ProgrammingSession::new(name, artifact.path());

        info!("Programming '{}' (session {})", name, session.id);
        debug!("Bitstream: {}", session.bitstream.display());

        self.convert(&session).await?;

        if self.config.daemon_ready_timeout.is_some() {
            ensure_gdb_port_free().await?;
        }
        let mut daemon = Daemon::spawn(&self.config, &session.top_cfg)?;
        let daemon_pid = daemon.pid();

        let outcome = self.drive_client(&session, &mut daemon).await;
        match outcome {
            Ok(client_output) => {
                let daemon_stopped = self.config.stop_daemon_on_success;
                if daemon_stopped {
                    daemon.terminate().await;
                } else {
                    daemon.release();
                }

                info!("Programmed '{}' in {:?}", name, started.elapsed());
                Ok(ProgramReport {
                    session_id: session.id,
                    design: session.design,
                    daemon_pid,
                    daemon_stopped,
                    client_output,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) => {
                warn!("Programming '{}' failed, stopping OpenOCD: {}", name, e);
                daemon.terminate().await;
                Err(e)
            }
        }
    }

    async fn convert(&self, session: &ProgrammingSession) -> Result<()> {
        let python = &self.config.python_path;
        info!("Converting bitstream with {} -m {}", python.display(), CONVERTER_MODULE);

        let mut cmd = Command::new(python);
        cmd.args(converter_args(&session.bitstream, &session.top_cfg));

        let (status, output) = run_to_completion(&mut cmd, self.config.client_io)
            .await
            .map_err(|e| {
                ProgrammingError::ConverterFailed(format!("failed to run {}: {}", python.display(), e))
            })?;

        if !status.success() {
            let message = describe_failure(python, status, &output);
            if self.config.check_converter_status {
                return Err(ProgrammingError::ConverterFailed(message));
            }
            warn!("Ignoring converter failure: {}", message);
        }
        Ok(())
    }

    /// Everything between OpenOCD launch and GDB exit
    async fn drive_client(&self, session: &ProgrammingSession, daemon: &mut Daemon) -> Result<Option<String>> {
        if let Some(timeout) = self.config.daemon_ready_timeout {
            daemon.wait_ready(timeout).await?;
        }

        tokio::fs::write(&session.gdb_commands, gdb_script()).await?;
        debug!("Wrote {}", session.gdb_commands.display());

        let gdb = &self.config.gdb_path;
        info!("Running {} -x {}", gdb.display(), session.gdb_commands.display());

        let mut cmd = Command::new(gdb);
        cmd.args(gdb_args(&session.gdb_commands)).kill_on_drop(true);

        let run = run_to_completion(&mut cmd, self.config.client_io);
        let result = match self.config.client_timeout {
            Some(timeout) => tokio::time::timeout(timeout, run).await.map_err(|_| {
                ProgrammingError::ClientFailed(format!("{} timed out after {:?}", gdb.display(), timeout))
            })?,
            None => run.await,
        };

        let (status, output) = result.map_err(|e| {
            ProgrammingError::ClientFailed(format!("failed to run {}: {}", gdb.display(), e))
        })?;

        if !status.success() {
            return Err(ProgrammingError::ClientFailed(describe_failure(gdb, status, &output)));
        }

        Ok(match self.config.client_io {
            ClientIo::Captured => Some(output),
            ClientIo::Inherit => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::MemoryProducts;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_session_paths_are_siblings() {
        let session = ProgrammingSession::new("blinky", Path::new("/tmp/quickfeather-x/blinky.bit"));
        assert_eq!(session.top_cfg, PathBuf::from("/tmp/quickfeather-x/top.cfg"));
        assert_eq!(session.gdb_commands, PathBuf::from("/tmp/quickfeather-x/gdb.commands"));
        assert_eq!(session.design, "blinky");
    }

    #[test]
    fn test_session_paths_relative_bitstream() {
        let session = ProgrammingSession::new("top", Path::new("top.bit"));
        assert_eq!(session.top_cfg, PathBuf::from("top.cfg"));
        assert_eq!(session.gdb_commands, PathBuf::from("gdb.commands"));
    }

    #[test]
    fn test_session_ids_unique() {
        let a = ProgrammingSession::new("a", Path::new("/x/a.bit"));
        let b = ProgrammingSession::new("a", Path::new("/x/a.bit"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_converter_args() {
        let args = converter_args(Path::new("/b/blinky.bit"), Path::new("/b/top.cfg"));
        assert_eq!(
            strings(args),
            ["-m", "quicklogic_fasm.bitstream_to_openocd", "/b/blinky.bit", "/b/top.cfg"]
        );
    }

    #[test]
    fn test_openocd_args_order() {
        let args = openocd_args(Path::new("/b/top.cfg"));
        assert_eq!(
            strings(args),
            [
                "-s", "tcl",
                "-f", "interface/ftdi/antmicro-ftdi-adapter.cfg",
                "-f", "interface/ftdi/swd-resistor-hack.cfg",
                "-f", "board/quicklogic_quickfeather.cfg",
                "-f", "/b/top.cfg",
            ]
        );
    }

    #[test]
    fn test_gdb_args() {
        assert_eq!(strings(gdb_args(Path::new("/b/gdb.commands"))), ["-x", "/b/gdb.commands"]);
    }

    #[test]
    fn test_gdb_script_contents() {
        assert_eq!(gdb_script(), "tar rem :3333\nmonitor reset halt\nmonitor load_bitstream");
        assert!(GDB_COMMANDS[0].ends_with(&GDB_PORT.to_string()));
    }

    #[tokio::test]
    async fn test_missing_artifact_spawns_nothing() {
        let config = ProgrammerConfig {
            python_path: PathBuf::from("/nonexistent/python"),
            openocd_path: PathBuf::from("/nonexistent/openocd"),
            gdb_path: PathBuf::from("/nonexistent/gdb"),
            ..ProgrammerConfig::default()
        };
        let programmer = DeviceProgrammer::new(config);
        let err = programmer.program(&MemoryProducts::new(), "blinky").await.unwrap_err();
        assert!(matches!(err, ProgrammingError::ArtifactNotFound(_)));
    }

    #[tokio::test]
    async fn test_gdb_port_in_use() {
        let _held = std::net::TcpListener::bind(("127.0.0.1", GDB_PORT)).ok();

        let err = ensure_gdb_port_free().await.unwrap_err();
        match err {
            ProgrammingError::DaemonLaunchFailed(msg) => assert!(msg.starts_with("port 3333 already in use")),
            other => panic!("expected DaemonLaunchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let mut products = MemoryProducts::new();
        products.insert(".bit", vec![0u8]);
        let programmer = DeviceProgrammer::new(ProgrammerConfig::default());
        let err = programmer.program(&products, "").await.unwrap_err();
        assert!(matches!(err, ProgrammingError::ArtifactNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_converter_fails_before_daemon() {
        let mut products = MemoryProducts::new();
        products.insert("blinky.bit", vec![0u8; 16]);
        let config = ProgrammerConfig {
            python_path: PathBuf::from("/nonexistent/python"),
            openocd_path: PathBuf::from("/nonexistent/openocd"),
            ..ProgrammerConfig::default()
        };
        let err = DeviceProgrammer::new(config)
            .program(&products, "blinky")
            .await
            .unwrap_err();
        assert!(matches!(err, ProgrammingError::ConverterFailed(_)));
    }
}
