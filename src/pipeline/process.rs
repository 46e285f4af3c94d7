//! Child-process runner shared by the external engines.
//!
//! Processes are spawned with `kill_on_drop(true)`: when the pipeline's
//! timeout drops the future, the engine is killed instead of lingering and
//! writing into a workspace that is already gone. On Unix each engine also
//! leads its own process group, and the whole group is killed, because
//! `soffice` is a launcher whose `soffice.bin` child would otherwise
//! survive it.

use crate::error::{FailureKind, TransformFailure};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Captured result of a finished engine process.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stderr, or stdout when stderr is empty (LibreOffice reports on stdout).
    pub fn diagnostics(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }
}

/// Run `program` with `args` and capture its output.
///
/// Only spawn failures are errors here; a non-zero exit is returned as a
/// [`ToolOutput`] for the adapter to interpret.
pub async fn run_tool<I, S>(program: &Path, args: I) -> Result<ToolOutput, TransformFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("Running {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|e| spawn_failure(program, e))?;
    let group = GroupKiller::new(&child);
    let output = child.wait_with_output().await.map_err(|e| {
        TransformFailure::unknown(format!("failed to wait for '{}': {}", program.display(), e))
    })?;
    group.release();

    Ok(ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn spawn_failure(program: &Path, e: std::io::Error) -> TransformFailure {
    match e.kind() {
        std::io::ErrorKind::NotFound => TransformFailure::new(
            FailureKind::Unavailable,
            format!("'{}' was not found", program.display()),
        ),
        std::io::ErrorKind::PermissionDenied => TransformFailure::new(
            FailureKind::Unavailable,
            format!("'{}' is not executable", program.display()),
        ),
        _ => TransformFailure::unknown(format!(
            "failed to start '{}': {}",
            program.display(),
            e
        )),
    }
}

/// Kills the engine's process group if dropped before [`release`].
///
/// [`release`]: GroupKiller::release
struct GroupKiller {
    pgid: Option<i32>,
}

impl GroupKiller {
    fn new(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }

    /// The engine finished; leave its group alone.
    fn release(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKiller {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            // SAFETY: plain signal delivery to the group spawned above.
            let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if result == 0 {
                debug!("Killed engine process group {}", pgid);
            } else {
                warn!("Failed to kill engine process group {}", pgid);
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

/// Diagnostics engines print when they run out of memory.
const MEMORY_MARKERS: &[&str] = &["VMerror", "out of memory", "Cannot allocate memory"];

/// Diagnostics engines print when the input cannot be parsed.
const CORRUPT_MARKERS: &[&str] = &[
    "Unrecoverable error",
    "syntaxerror",
    "This file had errors",
    "Couldn't initialise file",
    "could not be loaded",
    "not a PDF",
];

/// Turn a failed engine run into a typed failure.
///
/// Engines only report through exit status and diagnostics, so this is the
/// one place their text is inspected.
pub fn classify_exit(tool: &str, output: &ToolOutput) -> TransformFailure {
    let diagnostics = output.diagnostics();
    let last_line = diagnostics.lines().last().unwrap_or("").trim();

    if killed_by_oom(&output.status) || MEMORY_MARKERS.iter().any(|m| diagnostics.contains(m)) {
        return TransformFailure::new(
            FailureKind::ResourceExhausted,
            format!("{tool} ran out of memory"),
        );
    }

    let kind = if CORRUPT_MARKERS.iter().any(|m| diagnostics.contains(m)) {
        FailureKind::CorruptInput
    } else {
        FailureKind::Unknown
    };

    let detail = match (output.status.code(), last_line.is_empty()) {
        (Some(code), true) => format!("{tool} exited with status {code}"),
        (Some(code), false) => format!("{tool} exited with status {code}: {last_line}"),
        (None, _) => format!("{tool} was terminated by a signal"),
    };
    TransformFailure::new(kind, detail)
}

#[cfg(unix)]
fn killed_by_oom(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    // SIGKILL is what the kernel OOM killer sends.
    status.signal() == Some(9)
}

#[cfg(not(unix))]
fn killed_by_oom(_status: &ExitStatus) -> bool {
    false
}

/// Read an engine's output file, treating a missing or empty file as a
/// failed transform.
pub async fn read_output(tool: &str, path: &Path) -> Result<Vec<u8>, TransformFailure> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Err(TransformFailure::unknown(format!(
            "{tool} produced an empty file"
        ))),
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TransformFailure::unknown(
            format!("{tool} produced no output"),
        )),
        Err(e) => Err(TransformFailure::unknown(format!(
            "could not read {tool} output: {e}"
        ))),
    }
}
