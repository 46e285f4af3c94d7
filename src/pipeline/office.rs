//! LibreOffice headless conversions in both directions.
//!
//! `soffice` writes `<input stem>.<ext>` into `--outdir`. Concurrent
//! instances that share a user profile block on its lock file, so every call
//! points `-env:UserInstallation` at a profile inside its own output
//! directory. The profile goes away with the request's workspace.

use super::process::{classify_exit, read_output, run_tool};
use super::{ConversionStatus, DocxToPdf, PdfToDocx};
use crate::error::TransformFailure;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PROFILE_DIR: &str = ".lo-profile";

/// [`PdfToDocx`] and [`DocxToPdf`] through the `soffice` executable.
#[derive(Debug, Clone)]
pub struct LibreOffice {
    bin: PathBuf,
}

/// One `--convert-to` invocation.
struct Conversion<'a> {
    input: &'a Path,
    out_dir: &'a Path,
    /// `--infilter`, for inputs soffice would otherwise open in the wrong
    /// application.
    import_filter: Option<&'a str>,
    /// `<extension>[:<filter name>]`.
    target: &'a str,
    extension: &'a str,
}

impl LibreOffice {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run one conversion and return the path soffice wrote to.
    async fn run(&self, conversion: Conversion<'_>) -> Result<PathBuf, TransformFailure> {
        let profile = std::path::absolute(conversion.out_dir.join(PROFILE_DIR)).map_err(|e| {
            TransformFailure::unknown(format!("could not resolve profile directory: {e}"))
        })?;

        let mut args: Vec<OsString> = vec![
            profile_arg(&profile),
            "--headless".into(),
            "--norestore".into(),
            "--nolockcheck".into(),
        ];
        if let Some(filter) = conversion.import_filter {
            args.push(format!("--infilter={filter}").into());
        }
        args.extend([
            "--convert-to".into(),
            conversion.target.into(),
            "--outdir".into(),
            conversion.out_dir.as_os_str().to_owned(),
            conversion.input.as_os_str().to_owned(),
        ]);

        let out = run_tool(&self.bin, &args).await?;
        if !out.status.success() {
            return Err(classify_exit("soffice", &out));
        }

        let produced = produced_path(conversion.input, conversion.out_dir, conversion.extension);
        if tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            Ok(produced)
        } else {
            // soffice exits 0 when it cannot load the input.
            Err(classify_exit("soffice", &out))
        }
    }
}

#[async_trait]
impl PdfToDocx for LibreOffice {
    async fn convert(&self, input: &Path, output: &Path) -> ConversionStatus {
        let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
        let conversion = Conversion {
            input,
            out_dir,
            import_filter: Some("writer_pdf_import"),
            target: "docx:MS Word 2007 XML",
            extension: "docx",
        };

        let produced = match self.run(conversion).await {
            Ok(path) => path,
            Err(failure) => {
                warn!("soffice pdf → docx failed: {}", failure);
                return ConversionStatus::from_failure(&failure);
            }
        };

        if produced != output {
            if let Err(e) = tokio::fs::rename(&produced, output).await {
                return ConversionStatus::failed(1, format!("could not move soffice output: {e}"));
            }
        }
        info!("soffice wrote {}", output.display());
        ConversionStatus::success()
    }
}

#[async_trait]
impl DocxToPdf for LibreOffice {
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<Vec<u8>, TransformFailure> {
        let produced = self
            .run(Conversion {
                input,
                out_dir,
                import_filter: None,
                target: "pdf",
                extension: "pdf",
            })
            .await?;
        let bytes = read_output("soffice", &produced).await?;
        info!("soffice wrote {} bytes of PDF", bytes.len());
        Ok(bytes)
    }
}

fn profile_arg(profile: &Path) -> OsString {
    let mut arg = OsString::from("-env:UserInstallation=file://");
    arg.push(profile);
    arg
}

/// Where soffice puts the result of converting `input` to `extension`.
fn produced_path(input: &Path, out_dir: &Path, extension: &str) -> PathBuf {
    let mut name = input
        .file_stem()
        .unwrap_or_else(|| input.as_os_str())
        .to_os_string();
    name.push(".");
    name.push(extension);
    out_dir.join(name)
}
