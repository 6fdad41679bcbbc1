//! Writer - atomic artifact replacement and byte verification

use serde::Serialize;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{BuildError, Result};

/// Result of comparing freshly encoded bytes with the artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verification {
    Identical,
    Differs {
        #[serde(rename = "existingLen")]
        existing_len: u64,
        #[serde(rename = "newLen")]
        new_len: u64,
    },
    Missing,
}

impl Verification {
    pub fn is_identical(&self) -> bool {
        matches!(self, Verification::Identical)
    }
}

/// Bytes written and fsynced to a temporary file beside their target, not
/// yet visible at the target path. Dropping it removes the temporary file.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
    len: usize,
}

impl StagedWrite {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the staged file over the target, then fsync the directory so
    /// the rename itself is durable.
    pub fn commit(self) -> Result<()> {
        let dir = parent_dir(&self.target).to_path_buf();
        self.tmp
            .persist(&self.target)
            .map_err(|e| BuildError::io(&self.target, e.error))?;
        sync_dir(&dir)?;
        info!(path = %self.target.display(), bytes = self.len, "wrote artifact");
        Ok(())
    }
}

/// Write `bytes` to a temporary file next to `path` and fsync it.
///
/// The temporary file lives in the target directory so the final rename
/// stays on one filesystem.
pub fn stage(path: &Path, bytes: &[u8]) -> Result<StagedWrite> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
    if path.is_dir() {
        return Err(BuildError::io(
            path,
            io::Error::new(ErrorKind::Other, "target is a directory"),
        ));
    }

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BuildError::io(dir, e))?;
    debug!(tmp = %tmp.path().display(), target = %path.display(), "staging temporary file");

    tmp.write_all(bytes).map_err(|e| BuildError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| BuildError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| BuildError::io(tmp.path(), e))?;

    Ok(StagedWrite {
        tmp,
        target: path.to_path_buf(),
        len: bytes.len(),
    })
}

/// Replace `path` with `bytes` so that readers see either the old content or
/// the new content, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    stage(path, bytes)?.commit()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| BuildError::io(dir, e))
}

// Directories cannot be opened for fsync here; the rename is all we get.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Byte-compare `bytes` against the file at `path` without modifying it.
pub fn verify(path: &Path, bytes: &[u8]) -> Result<Verification> {
    let existing = match fs::read(path) {
        Ok(existing) => existing,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Verification::Missing),
        Err(e) => return Err(BuildError::io(path, e)),
    };

    if existing == bytes {
        Ok(Verification::Identical)
    } else {
        Ok(Verification::Differs {
            existing_len: existing.len() as u64,
            new_len: bytes.len() as u64,
        })
    }
}
