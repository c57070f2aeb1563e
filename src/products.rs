//! Build products: scoped access to artifacts produced by the FPGA toolchain
//!
//! Extraction normally materializes the artifact inside a fresh temporary
//! directory. The programmer writes `top.cfg` and `gdb.commands` next to the
//! extracted bitstream, so they disappear together with it. In-place
//! directory products hand out the build file itself and leave the generated
//! files in the build directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{ProgrammingError, Result};

/// Store of named build outputs (e.g. `blinky.bit`)
pub trait BuildProducts: Send + Sync {
    /// Extract `filename` to a readable path valid for the lifetime of the
    /// returned guard.
    fn extract(&self, filename: &str) -> Result<ExtractedArtifact>;
}

#[derive(Debug)]
enum Location {
    Temp(TempDir),
    InPlace(PathBuf),
}

/// An extracted artifact.
///
/// For temp-dir extractions, dropping this removes the directory and
/// everything written into it.
#[derive(Debug)]
pub struct ExtractedArtifact {
    path: PathBuf,
    location: Location,
}

impl ExtractedArtifact {
    fn create(filename: &str, fill: impl FnOnce(&Path) -> std::io::Result<()>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("quickfeather-")
            .tempdir()?;
        let path = dir.path().join(filename);
        fill(&path)?;
        debug!("Extracted {} to {}", filename, path.display());
        Ok(Self { path, location: Location::Temp(dir) })
    }

    fn in_place(path: PathBuf) -> Self {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self { path, location: Location::InPlace(dir) }
    }

    /// Path of the extracted file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the extracted file
    pub fn dir(&self) -> &Path {
        match &self.location {
            Location::Temp(dir) => dir.path(),
            Location::InPlace(dir) => dir,
        }
    }

    /// Whether the artifact lives in a temp directory removed on drop
    pub fn is_temporary(&self) -> bool {
        matches!(self.location, Location::Temp(_))
    }
}

/// Reject anything that is not a bare file name, so extraction never escapes
/// the store root or the temp directory.
fn check_filename(filename: &str) -> Result<()> {
    let bare = Path::new(filename)
        .file_name()
        .map(|n| n == filename)
        .unwrap_or(false);
    if bare {
        Ok(())
    } else {
        Err(ProgrammingError::ArtifactNotFound(format!(
            "invalid artifact name '{}'",
            filename
        )))
    }
}

/// Build products stored as plain files in a build directory
#[derive(Debug, Clone)]
pub struct DirectoryProducts {
    root: PathBuf,
    in_place: bool,
}

impl DirectoryProducts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), in_place: false }
    }

    /// Hand out files where they sit instead of copying them to a temp dir.
    /// `top.cfg` and `gdb.commands` then stay in the build directory.
    pub fn in_place(mut self) -> Self {
        self.in_place = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BuildProducts for DirectoryProducts {
    fn extract(&self, filename: &str) -> Result<ExtractedArtifact> {
        check_filename(filename)?;
        let source = self.root.join(filename);
        if !source.is_file() {
            return Err(ProgrammingError::ArtifactNotFound(format!(
                "{} not found in {}",
                filename,
                self.root.display()
            )));
        }
        if self.in_place {
            return Ok(ExtractedArtifact::in_place(source));
        }
        ExtractedArtifact::create(filename, |dest| std::fs::copy(&source, dest).map(|_| ()))
    }
}

/// Build products held in memory, keyed by file name
#[derive(Debug, Clone, Default)]
pub struct MemoryProducts {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryProducts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(filename.into(), contents.into());
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }
}

impl BuildProducts for MemoryProducts {
    fn extract(&self, filename: &str) -> Result<ExtractedArtifact> {
        check_filename(filename)?;
        let contents = self.files.get(filename).ok_or_else(|| {
            ProgrammingError::ArtifactNotFound(format!("{} not in build products", filename))
        })?;
        ExtractedArtifact::create(filename, |dest| std::fs::write(dest, contents))
    }
}
