//! # pdfdesk
//!
//! Merge, compress and convert PDF / Word documents over HTTP.
//!
//! ## Why this crate?
//!
//! Document conversion is best left to the engines that already do it well
//! (Ghostscript, LibreOffice, lopdf). What they lack is a safe front door:
//! upload validation, per-request isolation of scratch files, bounded run
//! time, and errors a caller can act on. This crate is that front door, as
//! a library, an HTTP server and a CLI client.
//!
//! ## Pipeline Overview
//!
//! ```text
//! multipart POST
//!  │
//!  ├─ 1. Validate   field present, type/extension, counts, sizes
//!  ├─ 2. Stage      upload → per-request scratch workspace (not for merge)
//!  ├─ 3. Transform  one engine call, bounded by the transform timeout
//!  ├─ 4. Respond    payload + Content-Disposition, or JSON error
//!  └─ 5. Cleanup    workspace removed on every exit path
//! ```
//!
//! | Operation | Route | Engine |
//! |-----------|-------|--------|
//! | compress    | `POST /compress-pdf/api/compress` | Ghostscript `pdfwrite` |
//! | merge       | `POST /merge-pdf/api/merge`       | lopdf |
//! | pdf → docx  | `POST /pdf-to-word/api/convert`   | LibreOffice |
//! | docx → pdf  | `POST /word-to-pdf/api/convert`   | LibreOffice |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfdesk::{serve, DeskService, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let listener = tokio::net::TcpListener::bind(config.bind).await?;
//!     let service = Arc::new(DeskService::system(config));
//!     serve(listener, service, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfdesk` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdfdesk = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod operation;
pub mod pipeline;
pub mod progress;
pub mod scratch;
pub mod server;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{DeskClient, Download};
pub use config::{Limits, ServiceConfig, ServiceConfigBuilder};
pub use error::{DeskError, ErrorKind, FailureKind, TransformFailure};
pub use handle::{DeskService, TransformOutput, TransformRequest, TransformStats};
pub use operation::Operation;
pub use pipeline::{
    CompressOptions, ConversionStatus, DocxToPdf, Engines, PdfCompressor, PdfMerger, PdfToDocx,
    Resolution,
};
pub use progress::{NoopProgressCallback, ProgressCallback, ProgressTicker, UploadProgressCallback};
pub use server::{router, serve};
pub use upload::UploadedFile;
