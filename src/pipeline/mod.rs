//! Conversion engines behind the transform pipeline.
//!
//! Each operation reaches exactly one engine through one narrow trait, so
//! the pipeline never knows whether the work happens in-process or in a
//! child process, and tests can swap in fakes.
//!
//! ## Engines
//!
//! ```text
//! compress     PdfCompressor  ──▶ Ghostscript   (gs -sDEVICE=pdfwrite)
//! merge        PdfMerger      ──▶ lopdf         (in-memory, spawn_blocking)
//! pdf → docx   PdfToDocx      ──▶ LibreOffice   (writer_pdf_import filter)
//! docx → pdf   DocxToPdf      ──▶ LibreOffice   (--convert-to pdf)
//! ```
//!
//! 1. [`compress`]: Ghostscript adapter and its [`CompressOptions`]
//! 2. [`merge`]: page-order-preserving merge of PDF buffers
//! 3. [`office`]: LibreOffice headless adapters, one isolated user
//!    profile per call
//! 4. [`process`]: child-process runner and exit classification shared
//!    by the external engines

pub mod compress;
pub mod merge;
pub mod office;
pub mod process;

use crate::config::ServiceConfig;
use crate::error::{FailureKind, TransformFailure};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use compress::{CompressOptions, GhostscriptCompressor, Resolution};
pub use merge::LopdfMerger;
pub use office::LibreOffice;

/// Shrinks a PDF on disk and returns the smaller PDF.
#[async_trait]
pub trait PdfCompressor: Send + Sync {
    /// Compress `input`; the engine may write intermediate files to `out_dir`.
    async fn compress(
        &self,
        input: &Path,
        out_dir: &Path,
        options: &CompressOptions,
    ) -> Result<Vec<u8>, TransformFailure>;
}

/// Concatenates PDFs held in memory.
#[async_trait]
pub trait PdfMerger: Send + Sync {
    /// Merge `inputs` into one PDF whose pages follow the input order.
    async fn merge(&self, inputs: Vec<Vec<u8>>) -> Result<Vec<u8>, TransformFailure>;
}

/// Converts a PDF file into a DOCX file.
#[async_trait]
pub trait PdfToDocx: Send + Sync {
    /// Convert `input` and write the result to `output`.
    async fn convert(&self, input: &Path, output: &Path) -> ConversionStatus;
}

/// Converts a DOCX file into a PDF.
#[async_trait]
pub trait DocxToPdf: Send + Sync {
    /// Convert `input`; the engine writes into `out_dir` and the PDF bytes
    /// are returned.
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<Vec<u8>, TransformFailure>;
}

/// Outcome of a [`PdfToDocx`] conversion: error code 0 means success.
///
/// Adapters encode the failure kind in the code so it survives the trip back
/// to the pipeline: `-1` engine unavailable, `2` corrupt input, `3` out of
/// resources, anything else unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionStatus {
    pub error_code: i32,
    pub error_text: String,
}

impl ConversionStatus {
    pub fn success() -> Self {
        Self {
            error_code: 0,
            error_text: String::new(),
        }
    }

    pub fn failed(error_code: i32, error_text: impl Into<String>) -> Self {
        Self {
            error_code,
            error_text: error_text.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    pub fn from_failure(failure: &TransformFailure) -> Self {
        let code = match failure.kind {
            FailureKind::Unavailable => -1,
            FailureKind::CorruptInput => 2,
            FailureKind::ResourceExhausted => 3,
            FailureKind::Unknown => 1,
        };
        Self::failed(code, failure.detail.clone())
    }

    /// `None` on success.
    pub fn into_failure(self) -> Option<TransformFailure> {
        let kind = match self.error_code {
            0 => return None,
            -1 => FailureKind::Unavailable,
            2 => FailureKind::CorruptInput,
            3 => FailureKind::ResourceExhausted,
            _ => FailureKind::Unknown,
        };
        Some(TransformFailure::new(kind, self.error_text))
    }
}

/// The set of engines a service dispatches to.
#[derive(Clone)]
pub struct Engines {
    pub compressor: Arc<dyn PdfCompressor>,
    pub merger: Arc<dyn PdfMerger>,
    pub pdf_to_docx: Arc<dyn PdfToDocx>,
    pub docx_to_pdf: Arc<dyn DocxToPdf>,
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines").finish_non_exhaustive()
    }
}

impl Engines {
    /// Engines backed by the host's Ghostscript and LibreOffice installs.
    pub fn system(config: &ServiceConfig) -> Self {
        let office = Arc::new(LibreOffice::new(&config.soffice_bin));
        Self {
            compressor: Arc::new(GhostscriptCompressor::new(&config.ghostscript_bin)),
            merger: Arc::new(LopdfMerger),
            pdf_to_docx: office.clone(),
            docx_to_pdf: office,
        }
    }
}
