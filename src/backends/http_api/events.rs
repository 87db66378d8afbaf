//! Unsolicited event stream from the daemon
//!
//! The daemon exposes `GET /v1/events` as a long-lived newline-delimited
//! JSON stream. One watcher task per backend consumes it; the stream ending
//! for any reason means the daemon is gone and triggers death notification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_client_sockets::{Backend, tokio::TokioBackend};
use log::{debug, error, warn};
use serde::Deserialize;

use super::Shared;
use crate::backends::types::{ApInfo, MacAddr};

/// One event line from the daemon
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// An AP instance stopped working on its own
    ApFailure { iface: String, instance: String },

    /// Operating parameters of an instance changed
    ApInfoChanged {
        #[serde(flatten)]
        info: ApInfo,
    },

    /// A client associated or disassociated
    ClientChanged {
        iface: String,
        client: MacAddr,
        connected: bool,
    },
}

/// Consume the event stream until it breaks, then report the channel dead.
pub(super) async fn watch_events(socket_path: PathBuf, shared: Arc<Shared>) {
    match run_stream(&socket_path, &shared).await {
        Ok(()) => debug!("daemon event stream ended"),
        Err(err) => debug!("daemon event stream failed: {err:#}"),
    }
    // A finished stream and a broken one mean the same thing here: nobody
    // is on the other end anymore.
    shared.channel_broken();
}

async fn run_stream(socket_path: &Path, shared: &Shared) -> Result<()> {
    let io = TokioBackend::connect_to_unix_socket(socket_path)
        .await
        .context("Failed to connect to daemon API socket")?;

    let (mut send_request, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
        .await
        .context("Failed to perform HTTP handshake")?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            error!("daemon event connection error: {}", e);
        }
    });

    let request = Request::builder()
        .method(Method::GET)
        .uri("http://localhost/v1/events")
        .header("Accept", "application/x-ndjson")
        .body(Full::new(Bytes::new()))
        .context("Failed to build event stream request")?;

    let response = send_request
        .send_request(request)
        .await
        .context("Failed to open event stream")?;

    if response.status() != StatusCode::OK {
        anyhow::bail!("event stream refused with status {}", response.status());
    }

    let mut body = response.into_body();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.context("event stream read failed")?;
        if let Ok(data) = frame.into_data() {
            buf.extend_from_slice(&data);
            while let Some(line) = next_line(&mut buf) {
                handle_line(&line, shared);
            }
        }
    }
    Ok(())
}

/// Pop one complete line off the front of `buf`, if one is buffered.
fn next_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buf.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned())
}

fn handle_line(line: &str, shared: &Shared) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<DaemonEvent>(line) {
        Ok(event) => shared.dispatch(event),
        Err(err) => warn!("ignoring malformed daemon event: {err} ({line})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_failure_event() {
        let event: DaemonEvent =
            serde_json::from_str(r#"{"event":"ap_failure","iface":"wlan1","instance":"wlan1-1"}"#)
                .expect("decodes");
        match event {
            DaemonEvent::ApFailure { iface, instance } => {
                assert_eq!(iface, "wlan1");
                assert_eq!(instance, "wlan1-1");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decodes_info_event() {
        let event: DaemonEvent = serde_json::from_str(
            r#"{"event":"ap_info_changed","iface":"wlan1","instance":"wlan1",
                "freq_mhz":5180,"bssid":"aa:bb:cc:dd:ee:ff"}"#,
        )
        .expect("decodes");
        match event {
            DaemonEvent::ApInfoChanged { info } => {
                assert_eq!(info.freq_mhz, 5180);
                assert_eq!(info.bssid.to_string(), "aa:bb:cc:dd:ee:ff");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decodes_client_event() {
        let event: DaemonEvent = serde_json::from_str(
            r#"{"event":"client_changed","iface":"wlan1","client":"02:00:00:00:00:01","connected":true}"#,
        )
        .expect("decodes");
        match event {
            DaemonEvent::ClientChanged { connected, .. } => assert!(connected),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn next_line_buffers_partial_input() {
        let mut buf = b"first".to_vec();
        assert_eq!(next_line(&mut buf), None);
        buf.extend_from_slice(b" line\nsecond");
        assert_eq!(next_line(&mut buf), Some("first line".to_string()));
        assert_eq!(next_line(&mut buf), None);
        assert_eq!(buf, b"second");
    }
}
