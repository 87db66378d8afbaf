//! HTTP client for the daemon API over a Unix socket

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_client_sockets::{Backend, tokio::TokioBackend};
use log::error;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::DaemonFault;

/// Make a PUT request with a JSON body; the daemon answers 204 on success
pub async fn api_put<T: Serialize>(socket_path: &Path, path: &str, body: &T) -> Result<()> {
    let json_body = serde_json::to_vec(body).context("Failed to serialize request body")?;
    let (status, body_bytes) = send(socket_path, Method::PUT, path, Bytes::from(json_body)).await?;

    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }
    Err(fault_error(status, &body_bytes))
}

/// Make a DELETE request; the daemon answers 204 on success
pub async fn api_delete(socket_path: &Path, path: &str) -> Result<()> {
    let (status, body_bytes) = send(socket_path, Method::DELETE, path, Bytes::new()).await?;

    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }
    Err(fault_error(status, &body_bytes))
}

/// Make a GET request and decode the JSON response body
pub async fn api_get<T: DeserializeOwned>(socket_path: &Path, path: &str) -> Result<T> {
    let (status, body_bytes) = send(socket_path, Method::GET, path, Bytes::new()).await?;

    if status != StatusCode::OK {
        return Err(fault_error(status, &body_bytes));
    }
    serde_json::from_slice(&body_bytes).context("Failed to decode API response body")
}

/// One request/response exchange on a fresh connection
async fn send(
    socket_path: &Path,
    method: Method,
    path: &str,
    body: Bytes,
) -> Result<(StatusCode, Bytes)> {
    // Connect to Unix socket
    let io = TokioBackend::connect_to_unix_socket(socket_path)
        .await
        .context("Failed to connect to daemon API socket")?;

    // Create HTTP/1 connection
    let (mut send_request, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
        .await
        .context("Failed to perform HTTP handshake")?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            error!("daemon API connection error: {}", e);
        }
    });

    // Build HTTP request
    let uri = format!("http://localhost/{}", path.trim_start_matches('/'));
    let request = Request::builder()
        .method(method)
        .uri(&uri)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(Full::new(body))
        .context("Failed to build HTTP request")?;

    // Send request and await response
    let response = send_request
        .send_request(request)
        .await
        .context("Failed to send API request")?;

    let status = response.status();
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .context("Failed to read API response")?
        .to_bytes();

    Ok((status, body_bytes))
}

/// Turn a non-success response into an error, preferring the daemon's own
/// fault message when the body carries one
fn fault_error(status: StatusCode, body_bytes: &[u8]) -> anyhow::Error {
    if let Ok(fault) = serde_json::from_slice::<DaemonFault>(body_bytes) {
        return anyhow::anyhow!("daemon API error ({}): {}", status, fault.fault_message);
    }
    let error_text = String::from_utf8_lossy(body_bytes);
    anyhow::anyhow!("daemon API request failed with status {}: {}", status, error_text)
}
