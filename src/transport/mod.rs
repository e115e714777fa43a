use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

pub mod fast;
pub mod persistent;
pub mod request_reply;

pub use fast::FastTransport;
pub use persistent::PersistentTransport;
pub use request_reply::RequestReplyTransport;

/// The three transports under comparison, in dispatch order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Raw TCP stream with Nagle disabled
    Fast,
    /// HTTP/1.1 request and response
    RequestReply,
    /// WebSocket channel
    Persistent,
}

impl TransportKind {
    /// All transports in the order a race dispatches them
    pub const ALL: [TransportKind; 3] = [
        TransportKind::Fast,
        TransportKind::RequestReply,
        TransportKind::Persistent,
    ];
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Fast => write!(f, "Fast"),
            TransportKind::RequestReply => write!(f, "Request-Reply"),
            TransportKind::Persistent => write!(f, "Persistent"),
        }
    }
}

/// Error categories surfaced by transport operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Mismatch,
    Timeout,
    Bind,
}

/// Errors raised by a single transport operation or listener
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, send or receive failure reported by the adapter
    #[error("{transport} transport failure: {message}")]
    Transport {
        transport: TransportKind,
        message: String,
    },

    /// A reply arrived but differs from the payload that was sent
    #[error("{transport} reply did not match payload (sent {sent} bytes, received {received} bytes)")]
    Mismatch {
        transport: TransportKind,
        sent: usize,
        received: usize,
    },

    /// No reply arrived within the operation timeout
    #[error("{transport} reply not received within {timeout:?}")]
    Timeout {
        transport: TransportKind,
        timeout: Duration,
    },

    /// A listener could not bind its assigned address
    #[error("{transport} listener failed to bind {address}: {source}")]
    Bind {
        transport: TransportKind,
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Wrap any adapter-level failure as a TRANSPORT error
    pub fn transport(transport: TransportKind, err: impl std::fmt::Display) -> Self {
        TransportError::Transport {
            transport,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Transport { .. } => ErrorKind::Transport,
            TransportError::Mismatch { .. } => ErrorKind::Mismatch,
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            TransportError::Bind { .. } => ErrorKind::Bind,
        }
    }

    pub fn transport_kind(&self) -> TransportKind {
        match self {
            TransportError::Transport { transport, .. }
            | TransportError::Mismatch { transport, .. }
            | TransportError::Timeout { transport, .. }
            | TransportError::Bind { transport, .. } => *transport,
        }
    }
}

/// Per-message callback invoked by a listener; the returned bytes are
/// written back to the sender unmodified.
pub type DataHandler = Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>;

/// A running listener
pub struct Listener {
    pub transport: TransportKind,
    pub local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Listener {
    pub fn new(transport: TransportKind, local_addr: SocketAddr, task: JoinHandle<()>) -> Self {
        Self {
            transport,
            local_addr,
            task,
        }
    }

    /// Whether the serve loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop serving and release the port
    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Adapter contract every transport under test implements
#[async_trait]
pub trait EchoTransport: Send + Sync {
    /// Which transport this adapter drives
    fn kind(&self) -> TransportKind;

    /// Bind `addr` and serve until aborted, answering every received
    /// message with `on_data(message)`
    async fn listen(
        &self,
        addr: SocketAddr,
        on_data: DataHandler,
    ) -> Result<Listener, TransportError>;

    /// Send one payload to `addr` and return the single reply
    async fn exchange(&self, addr: SocketAddr, payload: Bytes) -> Result<Bytes, TransportError>;
}

/// One adapter per transport kind
#[derive(Clone)]
pub struct TransportSet {
    pub fast: Arc<dyn EchoTransport>,
    pub request_reply: Arc<dyn EchoTransport>,
    pub persistent: Arc<dyn EchoTransport>,
}

impl TransportSet {
    /// The production adapters: raw TCP, HTTP and WebSocket
    pub fn standard() -> Self {
        Self {
            fast: Arc::new(FastTransport::new()),
            request_reply: Arc::new(RequestReplyTransport::new()),
            persistent: Arc::new(PersistentTransport::new()),
        }
    }

    pub fn get(&self, kind: TransportKind) -> &Arc<dyn EchoTransport> {
        match kind {
            TransportKind::Fast => &self.fast,
            TransportKind::RequestReply => &self.request_reply,
            TransportKind::Persistent => &self.persistent,
        }
    }
}

/// Resolve a host name or literal address plus port into a socket address
pub async fn resolve(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address found for {}:{}", host, port),
            )
        })
}
