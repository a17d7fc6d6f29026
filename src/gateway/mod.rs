//! HTTP gateway: `POST /summarize` and `GET /health`.

use crate::config::GatewayConfig;
use crate::summarize::schema::{SummaryResponse, UploadedDocument};
use crate::summarize::{Pipeline, SummarizeError};
use anyhow::{Context, Result};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub max_upload_bytes: usize,
}

pub fn router(pipeline: Arc<Pipeline>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/summarize", post(summarize))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            pipeline,
            max_upload_bytes,
        })
}

/// Bind and serve until Ctrl-C.
pub async fn run_gateway(config: &GatewayConfig, pipeline: Arc<Pipeline>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("docsum listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(pipeline, config.max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;
    info!("docsum stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn summarize(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let span = info_span!(
        "summarize",
        request_id = %Uuid::new_v4(),
        filename = tracing::field::Empty,
    );

    async move {
        debug!("Request received for /summarize endpoint");
        let outcome = match read_form(multipart, state.max_upload_bytes).await {
            Ok((document, prompt)) => state.pipeline.summarize(document, prompt).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(summary) => {
                info!(chars = summary.as_str().len(), "Summary returned");
                let body = SummaryResponse {
                    summary: summary.into_string(),
                };
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(err) => {
                log_failure(&err);
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

fn log_failure(err: &SummarizeError) {
    match err {
        SummarizeError::Unhandled(cause) => {
            error!(kind = err.kind(), "{err}: {cause:?}");
        }
        _ => match err.details() {
            Some(details) => error!(kind = err.kind(), "{err}: {details}"),
            None => error!(kind = err.kind(), "{err}"),
        },
    }
}

/// Pull `file` and `prompt` out of the form. A request that is not multipart
/// at all has no file part.
async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
    limit: usize,
) -> Result<(UploadedDocument, Option<String>), SummarizeError> {
    let read_err = |e| malformed(e, limit);
    let Ok(mut multipart) = multipart else {
        return Err(SummarizeError::MissingFile);
    };

    let mut file = None;
    let mut prompt = None;
    while let Some(field) = multipart.next_field().await.map_err(read_err)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if file.is_none() => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(read_err)?;
                file = Some((filename, data));
            }
            Some("prompt") => {
                prompt = Some(field.text().await.map_err(read_err)?);
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or(SummarizeError::MissingFile)?;
    let filename = filename
        .filter(|f| !f.trim().is_empty())
        .ok_or(SummarizeError::EmptyFilename)?;

    Span::current().record("filename", filename.as_str());
    debug!(bytes = data.len(), "File uploaded");
    Ok((UploadedDocument::new(filename, data.to_vec()), prompt))
}

/// The body limit trips while fields are read, so it arrives here as a
/// multipart error carrying 413.
fn malformed(e: MultipartError, limit: usize) -> SummarizeError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return SummarizeError::UploadTooLarge { limit };
    }
    SummarizeError::Unhandled(anyhow::Error::new(e).context("Failed to read multipart body"))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    let err = SummarizeError::Unhandled(anyhow::anyhow!("handler panicked: {message}"));
    log_failure(&err);
    err.into_response()
}
