//! Per-request scratch workspaces.
//!
//! Engines such as Ghostscript and LibreOffice only read and write paths, so
//! single-file requests stage their upload in a [`ScratchWorkspace`]: a
//! uniquely named directory under the scratch root, owned by exactly one
//! request.
//!
//! The directory is held as a [`TempDir`], so it is removed when the
//! workspace is dropped on any exit path, including `?` returns and panics.
//! [`ScratchWorkspace::close`] does the same removal explicitly and reports
//! failure, which the pipeline turns into a resource error.
//!
//! ```text
//! <scratch root>/pdf-compress-XXXXXX/
//!   in/   staged uploads, under their original base name
//!   out/  engine output
//! ```

use crate::error::DeskError;
use crate::upload::UploadedFile;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

const INPUT_DIR: &str = "in";
const OUTPUT_DIR: &str = "out";
const FALLBACK_NAME: &str = "upload";

/// A request-exclusive temporary directory.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Create a fresh workspace under `root` whose name starts with `prefix`.
    pub async fn create(root: &Path, prefix: &str) -> Result<Self, DeskError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(root)
            .map_err(|source| DeskError::Scratch {
                action: "creating workspace",
                source,
            })?;

        for sub in [INPUT_DIR, OUTPUT_DIR] {
            tokio::fs::create_dir(dir.path().join(sub))
                .await
                .map_err(|source| DeskError::Scratch {
                    action: "creating workspace",
                    source,
                })?;
        }

        debug!("Created scratch workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory staged uploads live in.
    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join(INPUT_DIR)
    }

    /// Directory engines write their output to.
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_DIR)
    }

    /// Write an upload into `in/` under its sanitised original name.
    pub async fn stage(&self, file: &UploadedFile) -> Result<PathBuf, DeskError> {
        let path = self.input_dir().join(safe_file_name(&file.name));
        tokio::fs::write(&path, &file.content)
            .await
            .map_err(|source| DeskError::Scratch {
                action: "staging upload",
                source,
            })?;
        debug!("Staged {} ({} bytes)", path.display(), file.size_bytes());
        Ok(path)
    }

    /// Remove the workspace and everything in it.
    pub async fn close(self) -> Result<(), DeskError> {
        let path = self.dir.path().to_path_buf();
        // `TempDir::close` is blocking filesystem work.
        tokio::task::spawn_blocking(move || self.dir.close())
            .await
            .map_err(|e| DeskError::Internal(format!("Cleanup task panicked: {e}")))?
            .map_err(|source| DeskError::Scratch {
                action: "removing workspace",
                source,
            })?;
        debug!("Removed scratch workspace {}", path.display());
        Ok(())
    }
}

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts (either separator) are dropped; names that reduce to
/// nothing, `.` or `..` become `upload`.
pub fn safe_file_name(name: &str) -> String {
    base_name(name).unwrap_or(FALLBACK_NAME).to_string()
}

/// Last path component of `name`, or `None` when nothing usable is left.
pub fn base_name(name: &str) -> Option<&str> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('\0');
    match base {
        "" | "." | ".." => None,
        b => Some(b),
    }
}
