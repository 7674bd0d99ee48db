//! Alerting System
//!
//! Everything after a slot raises an alert: evidence capture, delivery to
//! the alert receiver, receiver-side SMS/WhatsApp notification and the
//! alert log.

pub mod dispatcher;
pub mod evidence;
pub mod log;
pub mod notifier;

pub use dispatcher::{
    capture_and_dispatch, AlertDispatcher, DeliveryOutcome, DispatchConfig, DispatchOutcome,
    HttpAlertDispatcher,
};
pub use evidence::{CaptureConfig, Evidence, EvidenceCapture};
pub use log::{AlertLog, AlertLogConfig, AlertRecord};
pub use notifier::{
    AlertNotice, ChannelResult, FreeMobileConfig, NotificationReport, NotifierConfig, Notifiers,
    TwilioConfig,
};

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Receiver rejected alert ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(end) = header_end(buf) else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        if head.contains("transfer-encoding: chunked") {
            return buf.ends_with(b"0\r\n\r\n");
        }
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= end + length
    }

    /// Serves a single request with a canned reply and yields the raw request
    pub(crate) async fn reply_once(reply: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&received) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).to_string()
        });
        (format!("http://{}", addr), handle)
    }
}
