//! Configuration types for the pdfdesk service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Upload limits live in their own [`Limits`]
//! struct because the client reuses them for its advisory pre-checks.

use crate::error::DeskError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;

/// Upload limits shared by the server (authoritative) and the client
/// (advisory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Fewest files a merge accepts. Default: 2.
    pub min_merge_files: usize,

    /// Most files a merge accepts. Default: 20.
    pub max_merge_files: usize,

    /// Aggregate cap across all merge members, in bytes. Default: 100 MiB.
    pub max_merge_total_bytes: u64,

    /// Cap on a single merge member, in bytes. Default: 10 MiB.
    pub max_merge_file_bytes: u64,

    /// Cap on the upload of a single-file operation, in bytes. Default: 20 MiB.
    pub max_file_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_merge_files: 2,
            max_merge_files: 20,
            max_merge_total_bytes: 100 * MIB,
            max_merge_file_bytes: 10 * MIB,
            max_file_bytes: 20 * MIB,
        }
    }
}

impl Limits {
    /// Largest request body worth reading at all.
    ///
    /// The bigger of the two upload budgets plus 1 MiB for multipart framing.
    /// Anything above is rejected by the body limit before validation runs.
    pub fn max_body_bytes(&self) -> u64 {
        self.max_merge_total_bytes.max(self.max_file_bytes) + MIB
    }
}

/// Configuration for a pdfdesk server.
///
/// # Example
/// ```rust
/// use pdfdesk::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .bind("0.0.0.0:8080".parse().unwrap())
///     .transform_timeout(Duration::from_secs(60))
///     .max_merge_files(10)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server listens on. Default: `127.0.0.1:3000`.
    pub bind: SocketAddr,

    /// Directory per-request scratch workspaces are created in.
    /// If None, uses the system temp directory.
    pub scratch_root: Option<PathBuf>,

    /// Upload limits.
    pub limits: Limits,

    /// Upper bound on one engine call. Default: 120 s.
    ///
    /// External processes are killed when it expires; the request fails
    /// with a 500 and its workspace is still removed.
    pub transform_timeout: Duration,

    /// Ghostscript executable. Default: `gs`.
    pub ghostscript_bin: PathBuf,

    /// LibreOffice executable. Default: `soffice`.
    pub soffice_bin: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            scratch_root: None,
            limits: Limits::default(),
            transform_timeout: Duration::from_secs(120),
            ghostscript_bin: PathBuf::from("gs"),
            soffice_bin: PathBuf::from("soffice"),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory scratch workspaces are created in.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind = addr;
        self
    }

    pub fn scratch_root(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.scratch_root = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn max_merge_files(mut self, n: usize) -> Self {
        self.config.limits.max_merge_files = n;
        self
    }

    pub fn max_merge_total_bytes(mut self, bytes: u64) -> Self {
        self.config.limits.max_merge_total_bytes = bytes;
        self
    }

    pub fn max_merge_file_bytes(mut self, bytes: u64) -> Self {
        self.config.limits.max_merge_file_bytes = bytes;
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.limits.max_file_bytes = bytes;
        self
    }

    pub fn transform_timeout(mut self, timeout: Duration) -> Self {
        self.config.transform_timeout = timeout;
        self
    }

    pub fn ghostscript_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.ghostscript_bin = bin.into();
        self
    }

    pub fn soffice_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.soffice_bin = bin.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DeskError> {
        let l = &self.config.limits;
        if l.min_merge_files < 2 {
            return Err(DeskError::InvalidConfig(format!(
                "A merge needs at least 2 files, got minimum {}",
                l.min_merge_files
            )));
        }
        if l.max_merge_files < l.min_merge_files {
            return Err(DeskError::InvalidConfig(format!(
                "Maximum merge files ({}) is below the minimum ({})",
                l.max_merge_files, l.min_merge_files
            )));
        }
        if l.max_merge_total_bytes == 0 || l.max_merge_file_bytes == 0 || l.max_file_bytes == 0 {
            return Err(DeskError::InvalidConfig(
                "Size limits must be greater than zero".into(),
            ));
        }
        if self.config.transform_timeout.is_zero() {
            return Err(DeskError::InvalidConfig(
                "Transform timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}
