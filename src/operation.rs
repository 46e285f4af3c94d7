//! The four conversion operations and everything fixed about each of them.
//!
//! An [`Operation`] owns its route, multipart field, accepted input rule,
//! output content type and download filename. Keeping those in one `match`
//! per property means adding an operation is a compile error everywhere it
//! still needs handling.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// A conversion the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Re-encode one PDF with Ghostscript's "ebook" profile.
    Compress,
    /// Concatenate 2–N PDFs in upload order.
    Merge,
    /// PDF → Word (.docx).
    PdfToDocx,
    /// Word (.docx) → PDF.
    DocxToPdf,
}

/// How an operation decides whether an upload is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptRule {
    /// Declared MIME type must equal this value.
    MimeType(&'static str),
    /// Filename must end with this suffix (ASCII case-insensitive).
    Extension(&'static str),
}

impl AcceptRule {
    /// Check a declared name / MIME type pair. Never looks at content.
    pub fn accepts(&self, name: &str, mime_type: Option<&str>) -> bool {
        match self {
            AcceptRule::MimeType(expected) => mime_type
                .map(|m| m.split(';').next().unwrap_or("").trim())
                .is_some_and(|m| m.eq_ignore_ascii_case(expected)),
            AcceptRule::Extension(suffix) => {
                name.len() >= suffix.len()
                    && name
                        .get(name.len() - suffix.len()..)
                        .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
            }
        }
    }
}

impl Operation {
    /// Every operation, in the order the UI lists them.
    pub const ALL: [Operation; 4] = [
        Operation::Merge,
        Operation::Compress,
        Operation::PdfToDocx,
        Operation::DocxToPdf,
    ];

    /// HTTP route the operation is served on.
    pub fn route(self) -> &'static str {
        match self {
            Operation::Compress => "/compress-pdf/api/compress",
            Operation::Merge => "/merge-pdf/api/merge",
            Operation::PdfToDocx => "/pdf-to-word/api/convert",
            Operation::DocxToPdf => "/word-to-pdf/api/convert",
        }
    }

    /// Multipart field holding the upload(s).
    pub fn field(self) -> &'static str {
        match self {
            Operation::Merge => "files",
            _ => "file",
        }
    }

    /// Whether the field is repeated (ordered list of files).
    pub fn is_multi_file(self) -> bool {
        matches!(self, Operation::Merge)
    }

    pub fn accept_rule(self) -> AcceptRule {
        match self {
            Operation::Compress | Operation::PdfToDocx => AcceptRule::MimeType(PDF_MIME),
            Operation::Merge => AcceptRule::Extension(".pdf"),
            Operation::DocxToPdf => AcceptRule::Extension(".docx"),
        }
    }

    /// Human wording of the accepted input, used in validation messages.
    pub fn accepted_label(self) -> &'static str {
        match self {
            Operation::DocxToPdf => "Word .docx",
            _ => "PDF",
        }
    }

    /// Extension the client pre-check looks for.
    pub fn input_extension(self) -> &'static str {
        match self {
            Operation::DocxToPdf => ".docx",
            _ => ".pdf",
        }
    }

    pub fn output_content_type(self) -> &'static str {
        match self {
            Operation::PdfToDocx => DOCX_MIME,
            _ => PDF_MIME,
        }
    }

    /// Suggested download filename.
    pub fn output_filename(self) -> &'static str {
        match self {
            Operation::Compress => "compressed.pdf",
            Operation::Merge => "merged.pdf",
            Operation::PdfToDocx => "converted.docx",
            Operation::DocxToPdf => "converted.pdf",
        }
    }

    /// Prefix of the per-request scratch directory.
    pub fn scratch_prefix(self) -> &'static str {
        match self {
            Operation::Compress => "pdf-compress-",
            Operation::Merge => "merge-pdf-",
            Operation::PdfToDocx => "pdf-to-word-",
            Operation::DocxToPdf => "word-to-pdf-",
        }
    }

    /// "Failed to …" sentence stem for engine failures.
    pub fn action(self) -> &'static str {
        match self {
            Operation::Compress => "Failed to compress PDF",
            Operation::Merge => "Failed to merge PDFs",
            Operation::PdfToDocx => "Failed to convert PDF to DOCX",
            Operation::DocxToPdf => "Failed to convert DOCX to PDF",
        }
    }

    /// Short machine name, also the CLI subcommand name.
    pub fn slug(self) -> &'static str {
        match self {
            Operation::Compress => "compress",
            Operation::Merge => "merge",
            Operation::PdfToDocx => "pdf-to-word",
            Operation::DocxToPdf => "word-to-pdf",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
