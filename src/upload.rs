//! Uploaded files and the validation that runs before anything touches disk.
//!
//! Validation is pure: it looks at declared names, MIME types and sizes only,
//! so a rejected request has no side effects at all.

use crate::config::Limits;
use crate::error::DeskError;
use crate::operation::Operation;
use tracing::debug;

/// One file received in a multipart request.
#[derive(Clone)]
pub struct UploadedFile {
    /// Client-supplied filename. Used for display and extension checks only.
    pub name: String,
    /// Client-declared MIME type, if any.
    pub mime_type: Option<String>,
    /// Raw bytes.
    pub content: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: Option<&str>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.map(str::to_string),
            content,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Check a request's files against the operation's preconditions.
///
/// Merge checks run in order: count → type → aggregate size → per-file
/// size, so an oversized batch is reported with its computed total.
pub fn validate(
    operation: Operation,
    files: &[UploadedFile],
    limits: &Limits,
) -> Result<(), DeskError> {
    if files.is_empty() && !operation.is_multi_file() {
        return Err(DeskError::MissingFile {
            field: operation.field(),
        });
    }

    if operation.is_multi_file() {
        validate_batch(operation, files, limits)
    } else {
        if files.len() > 1 {
            debug!(
                "{}: {} files in field '{}', using the first",
                operation,
                files.len(),
                operation.field()
            );
        }
        let file = &files[0];
        check_type(operation, file)?;
        check_size(file, limits.max_file_bytes)
    }
}

fn validate_batch(
    operation: Operation,
    files: &[UploadedFile],
    limits: &Limits,
) -> Result<(), DeskError> {
    if files.len() < limits.min_merge_files {
        return Err(DeskError::TooFewFiles {
            got: files.len(),
            min: limits.min_merge_files,
        });
    }
    if files.len() > limits.max_merge_files {
        return Err(DeskError::TooManyFiles {
            got: files.len(),
            max: limits.max_merge_files,
        });
    }

    for file in files {
        check_type(operation, file)?;
    }

    let total_bytes: u64 = files.iter().map(UploadedFile::size_bytes).sum();
    if total_bytes > limits.max_merge_total_bytes {
        return Err(DeskError::AggregateTooLarge {
            total_bytes,
            limit_bytes: limits.max_merge_total_bytes,
        });
    }

    for file in files {
        check_size(file, limits.max_merge_file_bytes)?;
    }
    Ok(())
}

fn check_type(operation: Operation, file: &UploadedFile) -> Result<(), DeskError> {
    if operation
        .accept_rule()
        .accepts(&file.name, file.mime_type.as_deref())
    {
        Ok(())
    } else {
        Err(DeskError::UnsupportedFile {
            name: file.name.clone(),
            accepted: operation.accepted_label(),
        })
    }
}

fn check_size(file: &UploadedFile, limit_bytes: u64) -> Result<(), DeskError> {
    if file.size_bytes() > limit_bytes {
        return Err(DeskError::FileTooLarge {
            name: file.name.clone(),
            size_bytes: file.size_bytes(),
            limit_bytes,
        });
    }
    Ok(())
}
