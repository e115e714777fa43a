use super::{DataHandler, EchoTransport, Listener, TransportError, TransportKind};
use async_trait::async_trait;
use axum::{body::Bytes, extract::State, routing::post, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error};

/// HTTP/1.1 transport: one `POST /` per exchange, body echoed in the response
#[derive(Debug, Clone)]
pub struct RequestReplyTransport {
    client: reqwest::Client,
}

impl Default for RequestReplyTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestReplyTransport {
    pub fn new() -> Self {
        // Loopback benchmarks must never be routed through an environment proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .tcp_nodelay(true)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

async fn echo(State(on_data): State<DataHandler>, body: Bytes) -> Bytes {
    on_data(body)
}

#[async_trait]
impl EchoTransport for RequestReplyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RequestReply
    }

    async fn listen(
        &self,
        addr: SocketAddr,
        on_data: DataHandler,
    ) -> Result<Listener, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::RequestReply,
            address: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let router = Router::new().route("/", post(echo)).with_state(on_data);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Request-reply server on {} stopped: {}", local_addr, e);
            }
        });

        Ok(Listener::new(TransportKind::RequestReply, local_addr, task))
    }

    async fn exchange(
        &self,
        addr: SocketAddr,
        payload: bytes::Bytes,
    ) -> Result<bytes::Bytes, TransportError> {
        let fail = |e: reqwest::Error| TransportError::transport(TransportKind::RequestReply, e);

        let response = self
            .client
            .post(format!("http://{}/", addr))
            .body(payload)
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?;

        let reply = response.bytes().await.map_err(fail)?;
        debug!(
            "Request-reply exchange with {} returned {} bytes",
            addr,
            reply.len()
        );
        Ok(reply)
    }
}
