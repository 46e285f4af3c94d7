//! The transform pipeline: one request in, one payload or one error out.
//!
//! ```text
//! validate ─▶ stage ─▶ transform ─▶ read output ─▶ cleanup
//! ```
//!
//! Validation is pure and runs first, so a rejected request never touches
//! the filesystem. Merge skips staging: its engine works on in-memory
//! buffers. Every other operation owns a [`ScratchWorkspace`] for the length
//! of the engine call; the workspace is closed explicitly on the normal path
//! and removed by `Drop` on every other one.

use crate::config::ServiceConfig;
use crate::error::{DeskError, TransformFailure};
use crate::operation::Operation;
use crate::pipeline::{CompressOptions, Engines};
use crate::scratch::ScratchWorkspace;
use crate::upload::{self, UploadedFile};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One request to the pipeline.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub operation: Operation,
    /// Files of the operation's multipart field, in caller order.
    pub files: Vec<UploadedFile>,
}

impl TransformRequest {
    pub fn new(operation: Operation, files: Vec<UploadedFile>) -> Self {
        Self { operation, files }
    }
}

/// Timing and size figures for one successful transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub input_files: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    /// Time spent inside the engine.
    pub engine_duration_ms: u64,
    /// Wall-clock time for the whole pipeline.
    pub total_duration_ms: u64,
}

/// A successful transform.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub operation: Operation,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Suggested download filename.
    pub filename: &'static str,
    pub stats: TransformStats,
}

/// Configuration plus the engines requests are dispatched to.
///
/// Immutable once built; the server shares one instance behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DeskService {
    config: ServiceConfig,
    engines: Engines,
}

impl DeskService {
    pub fn new(config: ServiceConfig, engines: Engines) -> Self {
        Self { config, engines }
    }

    /// A service using the host's Ghostscript and LibreOffice.
    pub fn system(config: ServiceConfig) -> Self {
        let engines = Engines::system(&config);
        Self::new(config, engines)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run one request through the pipeline.
    ///
    /// # Errors
    /// * validation errors before anything is staged
    /// * [`DeskError::Transform`] / [`DeskError::TransformTimeout`] when the
    ///   engine fails or overruns `transform_timeout`
    /// * [`DeskError::Scratch`] when the workspace cannot be created,
    ///   written or removed, even if the engine succeeded
    pub async fn handle(&self, request: TransformRequest) -> Result<TransformOutput, DeskError> {
        let total_start = Instant::now();
        let TransformRequest { operation, files } = request;

        // ── Step 1: Validate ─────────────────────────────────────────────
        upload::validate(operation, &files, &self.config.limits)?;

        let input_files = if operation.is_multi_file() {
            files.len()
        } else {
            1
        };
        let input_bytes: u64 = files
            .iter()
            .take(input_files)
            .map(UploadedFile::size_bytes)
            .sum();
        if operation.is_multi_file() {
            info!("Received {} files for merging", input_files);
        } else {
            info!("{}: received '{}' ({} bytes)", operation, files[0].name, input_bytes);
        }

        // ── Steps 2–4: Stage, transform, read output ─────────────────────
        let engine_start = Instant::now();
        let bytes = match operation {
            Operation::Merge => {
                let buffers: Vec<Vec<u8>> = files.into_iter().map(|f| f.content).collect();
                let merged = self.within_timeout(operation, self.engines.merger.merge(buffers)).await?;
                engine_result(operation, merged)?
            }
            _ => {
                let file = files.into_iter().next().ok_or(DeskError::MissingFile {
                    field: operation.field(),
                })?;
                self.run_staged(operation, &file).await?
            }
        };
        let engine_duration_ms = engine_start.elapsed().as_millis() as u64;

        if bytes.is_empty() {
            return Err(DeskError::Transform {
                operation,
                failure: TransformFailure::unknown("engine produced no output"),
            });
        }

        // ── Step 5: Respond ──────────────────────────────────────────────
        let stats = TransformStats {
            input_files,
            input_bytes,
            output_bytes: bytes.len() as u64,
            engine_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "{} complete: {} → {} bytes, {}ms total",
            operation, stats.input_bytes, stats.output_bytes, stats.total_duration_ms
        );

        Ok(TransformOutput {
            operation,
            bytes,
            content_type: operation.output_content_type(),
            filename: operation.output_filename(),
            stats,
        })
    }

    /// Stage `file` in a fresh workspace, transform it, and remove the
    /// workspace again.
    async fn run_staged(
        &self,
        operation: Operation,
        file: &UploadedFile,
    ) -> Result<Vec<u8>, DeskError> {
        let workspace =
            ScratchWorkspace::create(&self.config.scratch_root(), operation.scratch_prefix())
                .await?;

        let outcome = self.transform_in(operation, &workspace, file).await;
        let cleanup = workspace.close().await;

        match (outcome, cleanup) {
            (Ok(bytes), Ok(())) => Ok(bytes),
            (Ok(_), Err(e)) => {
                error!("{}: transform succeeded but cleanup failed: {}", operation, e);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!("{}: cleanup after failure also failed: {}", operation, cleanup_err);
                Err(e)
            }
        }
    }

    async fn transform_in(
        &self,
        operation: Operation,
        workspace: &ScratchWorkspace,
        file: &UploadedFile,
    ) -> Result<Vec<u8>, DeskError> {
        let input = workspace.stage(file).await?;
        let out_dir = workspace.output_dir();

        match operation {
            Operation::Compress => {
                let options = CompressOptions::default();
                let result = self
                    .within_timeout(
                        operation,
                        self.engines.compressor.compress(&input, &out_dir, &options),
                    )
                    .await?;
                engine_result(operation, result)
            }
            Operation::PdfToDocx => {
                let output = out_dir.join(docx_name(&input));
                let status = self
                    .within_timeout(operation, self.engines.pdf_to_docx.convert(&input, &output))
                    .await?;
                if let Some(failure) = status.into_failure() {
                    return Err(DeskError::Transform { operation, failure });
                }
                read_engine_output(operation, &output).await
            }
            Operation::DocxToPdf => {
                let result = self
                    .within_timeout(operation, self.engines.docx_to_pdf.convert(&input, &out_dir))
                    .await?;
                engine_result(operation, result)
            }
            Operation::Merge => Err(DeskError::Internal(
                "merge does not use a scratch workspace".to_string(),
            )),
        }
    }

    /// Bound an engine call by the configured timeout.
    ///
    /// Dropping the engine future on expiry kills any child process it
    /// spawned.
    async fn within_timeout<T>(
        &self,
        operation: Operation,
        engine_call: impl Future<Output = T>,
    ) -> Result<T, DeskError> {
        let limit = self.config.transform_timeout;
        tokio::time::timeout(limit, engine_call)
            .await
            .map_err(|_| {
                warn!("{}: engine exceeded {:?}, abandoning", operation, limit);
                DeskError::TransformTimeout {
                    operation,
                    secs: limit.as_secs(),
                }
            })
    }
}

fn engine_result(
    operation: Operation,
    result: Result<Vec<u8>, TransformFailure>,
) -> Result<Vec<u8>, DeskError> {
    result.map_err(|failure| {
        debug!("{}: engine failure {:?}", operation, failure);
        DeskError::Transform { operation, failure }
    })
}

/// Output name for a pdf → docx conversion of `input`.
fn docx_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_string());
    format!("{stem}.docx")
}

/// Read the file a path-based engine reported success for.
async fn read_engine_output(operation: Operation, path: &Path) -> Result<Vec<u8>, DeskError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DeskError::Transform {
            operation,
            failure: TransformFailure::unknown("engine reported success but wrote no output"),
        }),
        Err(source) => Err(DeskError::Scratch {
            action: "reading engine output",
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FailureKind};
    use crate::pipeline::{ConversionStatus, DocxToPdf, PdfCompressor, PdfMerger, PdfToDocx};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Engine double: echoes its input, fails, or sleeps, and counts calls.
    #[derive(Default)]
    struct FakeEngine {
        fail: Option<FailureKind>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeEngine {
        async fn work(&self, bytes: Vec<u8>) -> Result<Vec<u8>, TransformFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.fail {
                Some(kind) => Err(TransformFailure::new(kind, "fake failure")),
                None => Ok(bytes),
            }
        }
    }

    #[async_trait]
    impl PdfCompressor for FakeEngine {
        async fn compress(
            &self,
            input: &Path,
            _out_dir: &Path,
            _options: &CompressOptions,
        ) -> Result<Vec<u8>, TransformFailure> {
            let bytes = tokio::fs::read(input).await.unwrap();
            self.work(bytes).await
        }
    }

    #[async_trait]
    impl PdfMerger for FakeEngine {
        async fn merge(&self, inputs: Vec<Vec<u8>>) -> Result<Vec<u8>, TransformFailure> {
            self.work(inputs.concat()).await
        }
    }

    #[async_trait]
    impl PdfToDocx for FakeEngine {
        async fn convert(&self, input: &Path, output: &Path) -> ConversionStatus {
            let bytes = tokio::fs::read(input).await.unwrap();
            match self.work(bytes).await {
                Ok(bytes) => {
                    tokio::fs::write(output, bytes).await.unwrap();
                    ConversionStatus::success()
                }
                Err(f) => ConversionStatus::from_failure(&f),
            }
        }
    }

    #[async_trait]
    impl DocxToPdf for FakeEngine {
        async fn convert(
            &self,
            input: &Path,
            _out_dir: &Path,
        ) -> Result<Vec<u8>, TransformFailure> {
            let bytes = tokio::fs::read(input).await.unwrap();
            self.work(bytes).await
        }
    }

    fn service(root: &Path, engine: Arc<FakeEngine>, timeout: Duration) -> DeskService {
        let config = ServiceConfig::builder()
            .scratch_root(root)
            .transform_timeout(timeout)
            .build()
            .unwrap();
        let engines = Engines {
            compressor: engine.clone(),
            merger: engine.clone(),
            pdf_to_docx: engine.clone(),
            docx_to_pdf: engine,
        };
        DeskService::new(config, engines)
    }

    fn pdf(name: &str, content: &[u8]) -> UploadedFile {
        UploadedFile::new(name, Some("application/pdf"), content.to_vec())
    }

    fn scratch_entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn every_single_file_operation_round_trips_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path(), Arc::default(), Duration::from_secs(5));

        for (op, file) in [
            (Operation::Compress, pdf("a.pdf", b"%PDF-compress")),
            (Operation::PdfToDocx, pdf("a.pdf", b"%PDF-docx")),
            (Operation::DocxToPdf, UploadedFile::new("a.docx", None, b"PK-docx".to_vec())),
        ] {
            let expected = file.content.clone();
            let out = svc.handle(TransformRequest::new(op, vec![file])).await.unwrap();
            assert_eq!(out.bytes, expected);
            assert_eq!(out.filename, op.output_filename());
            assert_eq!(out.content_type, op.output_content_type());
            assert_eq!(scratch_entries(root.path()), 0, "{op} left scratch behind");
        }
    }

    #[tokio::test]
    async fn merge_passes_buffers_in_order_without_staging() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let svc = service(root.path(), engine.clone(), Duration::from_secs(5));

        let out = svc
            .handle(TransformRequest::new(
                Operation::Merge,
                vec![pdf("1.pdf", b"one,"), pdf("2.pdf", b"two,"), pdf("3.pdf", b"three")],
            ))
            .await
            .unwrap();
        assert_eq!(out.bytes, b"one,two,three");
        assert_eq!(out.stats.input_files, 3);
        assert_eq!(out.stats.input_bytes, 13);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_engine() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let svc = service(root.path(), engine.clone(), Duration::from_secs(5));

        let bad = UploadedFile::new("a.pdf", Some("text/plain"), b"x".to_vec());
        let err = svc
            .handle(TransformRequest::new(Operation::Compress, vec![bad]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn engine_failure_is_a_transform_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            fail: Some(FailureKind::Unknown),
            ..FakeEngine::default()
        });
        let svc = service(root.path(), engine, Duration::from_secs(5));

        let err = svc
            .handle(TransformRequest::new(Operation::PdfToDocx, vec![pdf("a.pdf", b"x")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to convert PDF to DOCX: fake failure");
        assert_eq!(err.status_code(), 500);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn corrupt_merge_input_is_400() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            fail: Some(FailureKind::CorruptInput),
            ..FakeEngine::default()
        });
        let svc = service(root.path(), engine, Duration::from_secs(5));

        let err = svc
            .handle(TransformRequest::new(
                Operation::Merge,
                vec![pdf("a.pdf", b"x"), pdf("b.pdf", b"y")],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "One or more PDF files are corrupted or invalid.");
    }

    #[tokio::test]
    async fn slow_engine_times_out_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            delay: Some(Duration::from_secs(30)),
            ..FakeEngine::default()
        });
        let svc = service(root.path(), engine, Duration::from_millis(50));

        let err = svc
            .handle(TransformRequest::new(Operation::Compress, vec![pdf("a.pdf", b"x")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeskError::TransformTimeout {
                operation: Operation::Compress,
                ..
            }
        ));
        assert_eq!(err.status_code(), 500);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn empty_engine_output_is_a_failure() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(root.path(), Arc::default(), Duration::from_secs(5));

        let err = svc
            .handle(TransformRequest::new(
                Operation::DocxToPdf,
                vec![UploadedFile::new("empty.docx", None, Vec::new())],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transform);
    }

    #[tokio::test]
    async fn missing_scratch_root_is_a_resource_error() {
        let root = tempfile::tempdir().unwrap();
        let svc = service(&root.path().join("gone"), Arc::default(), Duration::from_secs(5));

        let err = svc
            .handle(TransformRequest::new(Operation::Compress, vec![pdf("a.pdf", b"x")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(err.public_message(), "Internal server error.");
    }

    #[test]
    fn docx_name_keeps_the_stem() {
        assert_eq!(docx_name(Path::new("/w/in/report.v2.pdf")), "report.v2.docx");
        assert_eq!(docx_name(Path::new("/w/in/upload")), "upload.docx");
    }
}
