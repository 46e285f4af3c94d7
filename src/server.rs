//! HTTP surface: one `POST` route per operation plus `GET /health`.
//!
//! Handlers only translate between HTTP and the pipeline. They read the
//! operation's multipart field into [`UploadedFile`]s, hand them to
//! [`DeskService::handle`], and turn the result into a download or a JSON
//! error body.
//!
//! Layers, outermost first:
//!
//! ```text
//! TraceLayer ─▶ CatchPanicLayer ─▶ DefaultBodyLimit ─▶ routes
//! ```

use crate::error::{DeskError, ErrorKind};
use crate::handle::{DeskService, TransformOutput, TransformRequest};
use crate::operation::Operation;
use crate::upload::UploadedFile;
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
}

impl IntoResponse for DeskError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, kind = ?self.kind(), "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for TransformOutput {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", self.filename),
                ),
            ],
            self.bytes,
        )
            .into_response()
    }
}

/// Build the router for `service`.
pub fn router(service: Arc<DeskService>) -> Router {
    let body_limit = service.config().limits.max_body_bytes();

    let mut router = Router::new().route("/health", get(health));
    for operation in Operation::ALL {
        router = router.route(
            operation.route(),
            post(
                move |State(service): State<Arc<DeskService>>,
                      multipart: Result<Multipart, MultipartRejection>| {
                    transform(service, operation, multipart)
                },
            ),
        );
    }

    router
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve `service` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    service: Arc<DeskService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeskError> {
    let addr = listener
        .local_addr()
        .map_err(|e| DeskError::Internal(format!("Failed to read listener address: {e}")))?;
    info!(%addr, "Server listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| DeskError::Internal(format!("Server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn transform(
    service: Arc<DeskService>,
    operation: Operation,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<TransformOutput, DeskError> {
    let multipart = multipart.map_err(|rejection| DeskError::MalformedUpload {
        detail: rejection.body_text(),
    })?;
    let limit_bytes = service.config().limits.max_body_bytes();
    let files = read_files(operation, multipart, limit_bytes).await?;
    service
        .handle(TransformRequest::new(operation, files))
        .await
}

/// Collect the files of `operation`'s field, in the order they were sent.
///
/// Other fields are skipped. Single-file operations stop at the first file.
async fn read_files(
    operation: Operation,
    mut multipart: Multipart,
    limit_bytes: u64,
) -> Result<Vec<UploadedFile>, DeskError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_bytes))?
    {
        if field.name() != Some(operation.field()) {
            continue;
        }

        let name = field.file_name().unwrap_or("").to_string();
        let mime_type = field.content_type().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, limit_bytes))?;

        // Browsers send an empty, unnamed part when nothing was chosen.
        if name.is_empty() && content.is_empty() {
            continue;
        }

        files.push(UploadedFile {
            name,
            mime_type,
            content: content.to_vec(),
        });
        if !operation.is_multi_file() {
            break;
        }
    }

    Ok(files)
}

fn multipart_error(e: MultipartError, limit_bytes: u64) -> DeskError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DeskError::BodyTooLarge { limit_bytes }
    } else {
        DeskError::MalformedUpload {
            detail: e.body_text(),
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic payload".to_string());
    DeskError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIB;
    use crate::error::{FailureKind, TransformFailure};
    use crate::handle::TransformStats;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_is_400_json() {
        let response = DeskError::TooFewFiles { got: 1, min: 2 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Please upload at least two PDF files.");
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn scratch_error_hides_details() {
        let err = DeskError::Scratch {
            action: "creating workspace",
            source: std::io::Error::other("/secret/path is full"),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error.");
        assert_eq!(body["kind"], "resource");
    }

    #[tokio::test]
    async fn merge_out_of_memory_message() {
        let err = DeskError::Transform {
            operation: Operation::Merge,
            failure: TransformFailure::new(FailureKind::ResourceExhausted, "lopdf"),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "Not enough memory to merge these files. Try with fewer files."
        );
        assert_eq!(body["kind"], "transform");
    }

    #[tokio::test]
    async fn body_too_large_is_413() {
        let response = DeskError::BodyTooLarge {
            limit_bytes: 101 * MIB,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn output_is_an_attachment() {
        let output = TransformOutput {
            operation: Operation::PdfToDocx,
            bytes: b"PK\x03\x04".to_vec(),
            content_type: Operation::PdfToDocx.output_content_type(),
            filename: "converted.docx",
            stats: TransformStats::default(),
        };
        let response = output.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"converted.docx\""
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"PK\x03\x04");
    }

    #[tokio::test]
    async fn panic_payload_becomes_generic_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error.");
        assert_eq!(body["kind"], "unexpected");
    }
}
