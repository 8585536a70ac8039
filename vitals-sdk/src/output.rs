//! Transports for flushed batches.

use std::fmt::Debug;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;
use vitals_types::BatchPayload;

use crate::error::TransportError;

/// Upper bound on how long a beacon may spend on a socket.
const BEACON_TIMEOUT: Duration = Duration::from_millis(200);

/// Something that accepts flushed batches.
///
/// `send` is the normal asynchronous delivery used for timed and size
/// flushes. `beacon` is the last-chance path used at teardown: it must
/// return promptly, never retry, and report only whether the payload was
/// handed off.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, payload: &BatchPayload) -> Result<(), TransportError>;

    fn beacon(&self, payload: &BatchPayload) -> bool;
}

/// Built-in destinations for batches.
///
/// Every variant writes one JSON document per batch.
#[derive(Debug, Clone)]
pub enum Output {
    /// Append batches to a file as newline-delimited JSON.
    File(PathBuf),

    /// Send newline-delimited JSON to a TCP collector.
    Tcp(TcpTarget),

    /// Send batches through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<BatchPayload>),

    /// Print newline-delimited JSON to stdout.
    Stdout,

    /// A host-supplied transport.
    Custom(Arc<dyn Transport>),
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use vitals_sdk::Output;
    ///
    /// let output = Output::file("vitals.ndjson");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a TCP output.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(TcpTarget::new(addr))
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use vitals_sdk::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // Later, receive batches
    /// // while let Some(batch) = rx.recv().await {
    /// //     println!("Got {} metrics", batch.len());
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<BatchPayload>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Wrap a host-supplied transport.
    pub fn custom(transport: impl Transport + 'static) -> Self {
        Output::Custom(Arc::new(transport))
    }
}

/// Address of a TCP collector.
///
/// The beacon never resolves names: it uses the address itself when it is
/// a literal socket address, otherwise the peer of the last successful send.
#[derive(Debug, Clone)]
pub struct TcpTarget {
    addr: String,
    resolved: Arc<Mutex<Option<SocketAddr>>>,
}

impl TcpTarget {
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let resolved = addr.parse().ok();
        Self {
            addr,
            resolved: Arc::new(Mutex::new(resolved)),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The address the beacon would connect to.
    pub fn resolved(&self) -> Option<SocketAddr> {
        *self.resolved.lock()
    }

    fn remember(&self, peer: SocketAddr) {
        *self.resolved.lock() = Some(peer);
    }
}

fn encode_line(payload: &BatchPayload) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(payload)?;
    line.push(b'\n');
    Ok(line)
}

#[async_trait]
impl Transport for Output {
    async fn send(&self, payload: &BatchPayload) -> Result<(), TransportError> {
        match self {
            Output::File(path) => {
                let line = encode_line(payload)?;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&line).await?;
                file.flush().await?;
            }
            Output::Tcp(target) => {
                let line = encode_line(payload)?;
                let mut stream = tokio::net::TcpStream::connect(target.addr()).await?;
                target.remember(stream.peer_addr()?);
                stream.write_all(&line).await?;
                stream.shutdown().await?;
            }
            Output::Channel(tx) => {
                tx.send(payload.clone())
                    .await
                    .map_err(|_| TransportError::Closed)?;
            }
            Output::Stdout => {
                let line = encode_line(payload)?;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&line).await?;
                stdout.flush().await?;
            }
            Output::Custom(transport) => transport.send(payload).await?,
        }
        Ok(())
    }

    fn beacon(&self, payload: &BatchPayload) -> bool {
        match self {
            Output::File(path) => encode_line(payload).is_ok_and(|line| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut file| file.write_all(&line))
                    .is_ok()
            }),
            Output::Tcp(target) => encode_line(payload).is_ok_and(|line| tcp_beacon(target, &line)),
            Output::Channel(tx) => tx.try_send(payload.clone()).is_ok(),
            Output::Stdout => encode_line(payload).is_ok_and(|line| {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&line).and_then(|_| stdout.flush()).is_ok()
            }),
            Output::Custom(transport) => transport.beacon(payload),
        }
    }
}

/// One connection attempt, one write, bounded by [`BEACON_TIMEOUT`].
fn tcp_beacon(target: &TcpTarget, line: &[u8]) -> bool {
    let Some(addr) = target.resolved() else {
        debug!(addr = target.addr(), "no resolved address for beacon");
        return false;
    };
    let sent = TcpStream::connect_timeout(&addr, BEACON_TIMEOUT).and_then(|mut stream| {
        stream.set_write_timeout(Some(BEACON_TIMEOUT))?;
        stream.write_all(line)
    });
    sent.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use vitals_types::FlushReason;

    fn payload(reason: FlushReason) -> BatchPayload {
        BatchPayload::new("session", 1, reason, Vec::new())
    }

    #[tokio::test]
    async fn file_output_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batches.ndjson");
        let output = Output::file(&path);

        output.send(&payload(FlushReason::Interval)).await.unwrap();
        assert!(output.beacon(&payload(FlushReason::Teardown)));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<BatchPayload> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].reason, FlushReason::Interval);
        assert_eq!(lines[1].reason, FlushReason::Teardown);
    }

    #[tokio::test]
    async fn file_output_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::file(dir.path().join("missing").join("batches.ndjson"));

        let err = output.send(&payload(FlushReason::Size)).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(!output.beacon(&payload(FlushReason::Teardown)));
    }

    #[tokio::test]
    async fn channel_output_delivers_payloads() {
        let (output, mut rx) = Output::channel(4);
        output.send(&payload(FlushReason::Size)).await.unwrap();
        assert!(output.beacon(&payload(FlushReason::Teardown)));

        assert_eq!(rx.recv().await.unwrap().reason, FlushReason::Size);
        assert_eq!(rx.recv().await.unwrap().reason, FlushReason::Teardown);
    }

    #[tokio::test]
    async fn channel_beacon_does_not_wait_for_capacity() {
        let (output, _rx) = Output::channel(1);
        assert!(output.beacon(&payload(FlushReason::Size)));
        assert!(!output.beacon(&payload(FlushReason::Teardown)));
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (output, rx) = Output::channel(1);
        drop(rx);
        let err = output.send(&payload(FlushReason::Manual)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn tcp_output_sends_one_line_per_batch() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let collector = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        Output::tcp(addr).send(&payload(FlushReason::Interval)).await.unwrap();

        let line = collector.await.unwrap();
        let received: BatchPayload = serde_json::from_str(&line).unwrap();
        assert_eq!(received.reason, FlushReason::Interval);
    }

    #[tokio::test]
    async fn tcp_beacon_to_bad_address_fails_fast() {
        let output = Output::tcp("not a socket address");
        assert!(!output.beacon(&payload(FlushReason::Teardown)));
    }

    #[tokio::test]
    async fn tcp_beacon_never_resolves_names() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let collector = tokio::spawn(async move {
            let mut received = Vec::new();
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut lines = tokio::io::BufReader::new(stream).lines();
                received.push(lines.next_line().await.unwrap().unwrap());
            }
            received
        });

        let output = Output::tcp(format!("localhost:{port}"));
        assert!(!output.beacon(&payload(FlushReason::Teardown)));

        // A successful send pins the peer address for later beacons.
        output.send(&payload(FlushReason::Interval)).await.unwrap();
        assert!(output.beacon(&payload(FlushReason::Teardown)));

        let reasons: Vec<FlushReason> = collector
            .await
            .unwrap()
            .iter()
            .map(|line| serde_json::from_str::<BatchPayload>(line).unwrap().reason)
            .collect();
        assert_eq!(reasons, [FlushReason::Interval, FlushReason::Teardown]);
    }

    #[test]
    fn literal_tcp_address_is_ready_for_beacons() {
        let target = TcpTarget::new("127.0.0.1:9000");
        assert_eq!(target.resolved(), Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(TcpTarget::new("collector:9000").resolved(), None);
    }
}
