//! Informational HTTP listener for a share session.
//!
//! Every share runs a small HTTP server next to the control channel:
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | / | Landing page: file name, size, receive command |
//! | GET | /download | The shared file as an attachment |
//!
//! A browser on the LAN (usually a phone that scanned the QR code) can
//! fetch the file directly from `/download` without running `cpd` at all.

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;

use crate::error::Result;
use crate::file::{format_size, SharedFile};

/// Shared state for the info endpoints.
#[derive(Debug, Clone)]
pub struct InfoState {
    /// The file being shared
    pub file: Arc<SharedFile>,
    /// Primary advertised address
    pub address: Ipv4Addr,
    /// Control channel port receivers connect to
    pub control_port: u16,
}

/// Serve the info endpoints on an already-bound listener.
///
/// Runs until the listener fails; the share session owns its lifetime.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: InfoState) -> Result<()> {
    let app = Router::new()
        .route("/", get(landing_page))
        .route("/download", get(download))
        .fallback(not_found)
        .with_state(Arc::new(state));

    axum::serve(listener, app).await?;
    Ok(())
}

/// GET / - Human-readable landing page.
async fn landing_page(State(state): State<Arc<InfoState>>) -> Html<String> {
    let name = &state.file.display_name;
    let size = format_size(state.file.size);
    let receive_command = format!(
        "cpd receive {} {} {}",
        state.address, state.control_port, name
    );

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>cpd - {name}</title>
<style>
  body {{ font-family: -apple-system, system-ui, sans-serif; max-width: 40rem;
         margin: 3rem auto; padding: 0 1rem; color: #222; }}
  h1 {{ font-size: 1.4rem; }}
  a.button {{ display: inline-block; padding: 0.6rem 1.2rem; background: #2563eb;
              color: #fff; text-decoration: none; border-radius: 6px; }}
  pre {{ background: #f4f4f5; padding: 0.8rem; border-radius: 6px; overflow-x: auto; }}
  .size {{ color: #666; }}
</style>
</head>
<body>
<h1>{name}</h1>
<p class="size">{size}</p>
<p><a class="button" href="/download">Download</a></p>
<p>Or receive it with cpd on the command line:</p>
<pre>{receive_command}</pre>
</body>
</html>
"#
    ))
}

/// GET /download - Stream the shared file as an attachment.
async fn download(State(state): State<Arc<InfoState>>) -> Response {
    let file = match tokio::fs::File::open(&state.file.path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("download failed to open {}: {e}", state.file.path.display());
            return status_response(StatusCode::INTERNAL_SERVER_ERROR, "file unavailable");
        }
    };

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", state.file.display_name),
        )
        .header(header::CONTENT_LENGTH, state.file.size)
        .body(body)
        .unwrap()
}

async fn not_found() -> Response {
    status_response(StatusCode::NOT_FOUND, "not found")
}

fn status_response(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(message.to_string()))
        .unwrap()
}
