//! Client for a running pdfdesk server.
//!
//! [`DeskClient::submit`] is the command-line counterpart of the upload
//! form: it reads the chosen files, runs the same checks the server will
//! (advisory only, the server stays authoritative), sends one multipart
//! request, and drives a [`ProgressTicker`] while waiting.

use crate::config::Limits;
use crate::error::DeskError;
use crate::operation::{Operation, DOCX_MIME, PDF_MIME};
use crate::progress::{ProgressCallback, ProgressTicker, MIN_TICK_INTERVAL, TICK_INTERVAL};
use crate::scratch::base_name;
use crate::upload::{self, UploadedFile};
use futures::future::try_join_all;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default server address.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// A payload returned by the server.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// From `Content-Disposition`, else the operation's default name.
    pub filename: String,
    pub content_type: String,
}

impl Download {
    /// Write the payload to `path`, replacing any previous file there.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), DeskError> {
        let path = path.as_ref();
        let write_err = |source| DeskError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = partial_path(path);
        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        info!("Saved {} bytes to {}", self.bytes.len(), path.display());
        Ok(())
    }
}

/// HTTP client for the four operations.
#[derive(Debug, Clone)]
pub struct DeskClient {
    base_url: String,
    http: reqwest::Client,
    limits: Limits,
    tick_interval: Duration,
}

impl DeskClient {
    /// Client for the server at `base_url`, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, DeskError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DeskError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            limits: Limits::default(),
            tick_interval: TICK_INTERVAL,
        })
    }

    /// Limits used by the local pre-checks. Default: [`Limits::default`].
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Interval of the simulated progress. Default: 200 ms, never below
    /// [`MIN_TICK_INTERVAL`].
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of `operation`'s route.
    pub fn url_for(&self, operation: Operation) -> String {
        format!("{}{}", self.base_url, operation.route())
    }

    /// Read `paths` and run the local pre-checks without sending anything.
    pub async fn prepare(
        &self,
        operation: Operation,
        paths: &[PathBuf],
    ) -> Result<Vec<UploadedFile>, DeskError> {
        let files = try_join_all(paths.iter().map(|p| read_upload(p))).await?;
        upload::validate(operation, &files, &self.limits)?;
        Ok(files)
    }

    /// Send `paths` to `operation`'s route and return the payload.
    ///
    /// # Errors
    /// * local pre-check failures (same messages as the server's)
    /// * [`DeskError::RequestFailed`] when no response arrives
    /// * [`DeskError::Rejected`] for a non-2xx answer, carrying the server's
    ///   message
    /// * [`DeskError::UnexpectedContentType`] for a 2xx answer of the wrong
    ///   type
    pub async fn submit(
        &self,
        operation: Operation,
        paths: &[PathBuf],
        progress: Option<ProgressCallback>,
    ) -> Result<Download, DeskError> {
        let files = self.prepare(operation, paths).await?;
        let total_bytes: u64 = files.iter().map(UploadedFile::size_bytes).sum();
        info!(
            "Uploading {} file(s), {} bytes, to {}",
            files.len(),
            total_bytes,
            self.url_for(operation)
        );

        let form = build_form(operation, files)?;

        let ticker = progress.as_ref().map(|cb| {
            cb.on_submit(operation, paths.len(), total_bytes);
            ProgressTicker::start(cb.clone(), self.tick_interval)
        });

        let result = self.send(operation, form).await;

        match (&result, ticker, &progress) {
            (Ok(download), Some(ticker), Some(cb)) => {
                ticker.finish();
                cb.on_complete(operation, download.bytes.len());
            }
            (Err(e), Some(ticker), Some(cb)) => {
                ticker.fail();
                cb.on_error(operation, &e.to_string());
            }
            _ => {}
        }
        result
    }

    async fn send(&self, operation: Operation, form: Form) -> Result<Download, DeskError> {
        let url = self.url_for(operation);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DeskError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let content_type = header_str(response.headers(), CONTENT_TYPE);
        let disposition = header_str(response.headers(), CONTENT_DISPOSITION);
        let body = response
            .bytes()
            .await
            .map_err(|e| DeskError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        debug!("{} answered {} ({} bytes)", url, status, body.len());

        if !status.is_success() {
            return Err(DeskError::Rejected {
                status: status.as_u16(),
                message: error_message(&body, operation),
            });
        }

        let expected = operation.output_content_type();
        if !content_type.contains(expected) {
            return Err(DeskError::UnexpectedContentType {
                expected,
                got: content_type,
            });
        }

        Ok(Download {
            bytes: body.to_vec(),
            filename: disposition_filename(&disposition)
                .unwrap_or_else(|| operation.output_filename().to_string()),
            content_type,
        })
    }
}

async fn read_upload(path: &Path) -> Result<UploadedFile, DeskError> {
    let content = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DeskError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => DeskError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = mime_for(&name);
    Ok(UploadedFile::new(name, mime_type, content))
}

fn build_form(operation: Operation, files: Vec<UploadedFile>) -> Result<Form, DeskError> {
    let mut form = Form::new();
    for file in files {
        let mut part = Part::bytes(file.content).file_name(file.name);
        if let Some(mime) = file.mime_type.as_deref() {
            part = part
                .mime_str(mime)
                .map_err(|e| DeskError::Internal(format!("Invalid MIME type '{mime}': {e}")))?;
        }
        form = form.part(operation.field(), part);
    }
    Ok(form)
}

/// MIME type a browser would declare for `name`.
fn mime_for(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        Some(PDF_MIME)
    } else if lower.ends_with(".docx") {
        Some(DOCX_MIME)
    } else {
        None
    }
}

fn header_str(headers: &reqwest::header::HeaderMap, name: reqwest::header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Message of a failed response: the JSON `error` field, else the body
/// text, else `Failed to <action>`.
pub fn error_message(body: &[u8], operation: Operation) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = json.get("error").and_then(|v| v.as_str()) {
            if !message.trim().is_empty() {
                return message.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        operation.action().to_string()
    } else {
        text.to_string()
    }
}

/// `filename` parameter of a `Content-Disposition` value, reduced to a bare
/// file name so a server cannot steer the download outside the working
/// directory.
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        base_name(raw.trim().trim_matches('"')).map(str::to_string)
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
