#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Fixtures are generated in code: [`sample_pdf`] builds a small valid PDF
//! with lopdf whose page width identifies it, so merge order can be read
//! back from the output. The fake engines stand in for Ghostscript and
//! LibreOffice, which are only exercised by the e2e suite.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use lopdf::{dictionary, Document, Object, Stream};
use pdfdesk::pipeline::LopdfMerger;
use pdfdesk::{
    CompressOptions, ConversionStatus, DeskService, DocxToPdf, Engines, PdfCompressor,
    PdfToDocx, ServiceConfig, TransformFailure,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Payload the fake compressor answers with.
pub const FAKE_COMPRESSED: &[u8] = b"%PDF-1.4\n% compressed by fake gs\n%%EOF\n";
/// Payload the fake LibreOffice writes for pdf → docx.
pub const FAKE_DOCX: &[u8] = b"PK\x03\x04 fake docx";
/// Payload the fake LibreOffice returns for docx → pdf.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n% converted by fake soffice\n%%EOF\n";

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// A valid PDF with `pages` pages, each `width` points wide.
pub fn sample_pdf(width: i64, pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for n in 0..pages {
        let content = format!("BT /F1 12 Tf 72 720 Td (page {n}) Tj ET");
        let contents_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(792),
            ],
            "Contents" => contents_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save sample PDF");
    out
}

/// MediaBox widths of every page, in page order.
pub fn page_widths(pdf: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(pdf).expect("load PDF");
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).expect("page dictionary");
            let media_box = page
                .get(b"MediaBox")
                .and_then(Object::as_array)
                .expect("MediaBox");
            media_box[2].as_i64().expect("integer width")
        })
        .collect()
}

/// Number of pages in `pdf`.
pub fn page_count(pdf: &[u8]) -> usize {
    Document::load_mem(pdf).expect("load PDF").get_pages().len()
}

// ── Multipart bodies ─────────────────────────────────────────────────────────

const BOUNDARY: &str = "----PdfdeskTestBoundary7MA4YWxkTrZu0gW";

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part.
    pub fn file(mut self, field: &str, filename: &str, content_type: Option<&str>, content: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        if let Some(ct) = content_type {
            self.body
                .extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a PDF file part.
    pub fn pdf(self, field: &str, filename: &str, content: &[u8]) -> Self {
        self.file(field, filename, Some("application/pdf"), content)
    }

    /// Add a plain text part.
    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    /// `POST` request carrying this body.
    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Number of entries directly under `root`.
pub fn scratch_entries(root: &Path) -> usize {
    std::fs::read_dir(root).expect("read scratch root").count()
}

// ── Fake engines ─────────────────────────────────────────────────────────────

/// Ghostscript stand-in: answers with [`FAKE_COMPRESSED`] after an
/// optional delay, and checks the input was staged.
#[derive(Default)]
pub struct FakeGhostscript {
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PdfCompressor for FakeGhostscript {
    async fn compress(
        &self,
        input: &Path,
        out_dir: &Path,
        options: &CompressOptions,
    ) -> Result<Vec<u8>, TransformFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.is_file(), "input was not staged: {}", input.display());
        assert!(out_dir.is_dir());
        assert_eq!(options, &CompressOptions::default());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(FAKE_COMPRESSED.to_vec())
    }
}

/// LibreOffice stand-in for both directions.
#[derive(Default)]
pub struct FakeOffice {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PdfToDocx for FakeOffice {
    async fn convert(&self, input: &Path, output: &Path) -> ConversionStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.is_file());
        match tokio::fs::write(output, FAKE_DOCX).await {
            Ok(()) => ConversionStatus::success(),
            Err(e) => ConversionStatus::failed(1, e.to_string()),
        }
    }
}

#[async_trait]
impl DocxToPdf for FakeOffice {
    async fn convert(&self, input: &Path, _out_dir: &Path) -> Result<Vec<u8>, TransformFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.is_file());
        Ok(FAKE_PDF.to_vec())
    }
}

/// Fake engines around the real lopdf merger.
pub struct TestEngines {
    pub ghostscript: Arc<FakeGhostscript>,
    pub office: Arc<FakeOffice>,
}

impl TestEngines {
    pub fn new() -> Self {
        Self::with_ghostscript(FakeGhostscript::default())
    }

    pub fn with_ghostscript(ghostscript: FakeGhostscript) -> Self {
        Self {
            ghostscript: Arc::new(ghostscript),
            office: Arc::new(FakeOffice::default()),
        }
    }

    pub fn engines(&self) -> Engines {
        Engines {
            compressor: self.ghostscript.clone(),
            merger: Arc::new(LopdfMerger),
            pdf_to_docx: self.office.clone(),
            docx_to_pdf: self.office.clone(),
        }
    }

    pub fn office_calls(&self) -> usize {
        self.office.calls.load(Ordering::SeqCst)
    }

    pub fn ghostscript_calls(&self) -> usize {
        self.ghostscript.calls.load(Ordering::SeqCst)
    }
}

/// Router over `engines` with scratch workspaces under `scratch_root`.
pub fn test_app(scratch_root: &Path, engines: &TestEngines) -> Router {
    let config = ServiceConfig::builder()
        .scratch_root(scratch_root)
        .build()
        .unwrap();
    test_app_with(config, engines)
}

pub fn test_app_with(config: ServiceConfig, engines: &TestEngines) -> Router {
    let service = Arc::new(DeskService::new(config, engines.engines()));
    pdfdesk::router(service)
}
