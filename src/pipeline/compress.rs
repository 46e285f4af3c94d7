//! PDF compression through Ghostscript's `pdfwrite` device.
//!
//! Ghostscript re-distills the document: images are downsampled to the
//! profile's resolution and fonts are subset. Output is not guaranteed to be
//! smaller than the input, only to be a valid PDF at the requested
//! compatibility level.

use super::process::{classify_exit, read_output, run_tool};
use super::PdfCompressor;
use crate::error::TransformFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

const OUTPUT_NAME: &str = "compressed.pdf";

/// Ghostscript `-dPDFSETTINGS` profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// 72 dpi images. Smallest output.
    Screen,
    /// 150 dpi images. (default)
    #[default]
    Ebook,
    /// 300 dpi images.
    Printer,
    /// 300 dpi, colour preserving.
    Prepress,
}

impl Resolution {
    fn pdf_settings(self) -> &'static str {
        match self {
            Resolution::Screen => "/screen",
            Resolution::Ebook => "/ebook",
            Resolution::Printer => "/printer",
            Resolution::Prepress => "/prepress",
        }
    }
}

/// Options for a compression run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressOptions {
    /// Default: [`Resolution::Ebook`].
    pub resolution: Resolution,
    /// PDF version of the output. Default: `1.4`.
    pub compatibility_level: String,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::Ebook,
            compatibility_level: "1.4".to_string(),
        }
    }
}

/// [`PdfCompressor`] running the `gs` executable.
#[derive(Debug, Clone)]
pub struct GhostscriptCompressor {
    bin: PathBuf,
}

impl GhostscriptCompressor {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl PdfCompressor for GhostscriptCompressor {
    async fn compress(
        &self,
        input: &Path,
        out_dir: &Path,
        options: &CompressOptions,
    ) -> Result<Vec<u8>, TransformFailure> {
        let output_path = out_dir.join(OUTPUT_NAME);
        let out = run_tool(&self.bin, ghostscript_args(input, &output_path, options)).await?;
        if !out.status.success() {
            return Err(classify_exit("gs", &out));
        }

        let bytes = read_output("gs", &output_path).await?;
        info!(
            "Ghostscript wrote {} bytes ({:?}, PDF {})",
            bytes.len(),
            options.resolution,
            options.compatibility_level
        );
        Ok(bytes)
    }
}

/// Command line for one `pdfwrite` run.
fn ghostscript_args(input: &Path, output: &Path, options: &CompressOptions) -> Vec<OsString> {
    let mut out_arg = OsString::from("-sOutputFile=");
    out_arg.push(output);

    vec![
        "-sDEVICE=pdfwrite".into(),
        format!("-dCompatibilityLevel={}", options.compatibility_level).into(),
        format!("-dPDFSETTINGS={}", options.resolution.pdf_settings()).into(),
        "-dNOPAUSE".into(),
        "-dQUIET".into(),
        "-dBATCH".into(),
        "-dSAFER".into(),
        out_arg,
        input.as_os_str().to_owned(),
    ]
}
