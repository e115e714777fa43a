use super::{DataHandler, EchoTransport, Listener, TransportError, TransportKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error};

/// WebSocket transport
///
/// Each exchange opens a channel, sends a single binary message, waits for
/// exactly one data message back and closes the channel.
#[derive(Debug, Clone, Default)]
pub struct PersistentTransport;

impl PersistentTransport {
    pub fn new() -> Self {
        Self
    }

    async fn handle_connection(stream: TcpStream, peer: SocketAddr, on_data: DataHandler) {
        let _ = stream.set_nodelay(true);
        let mut ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        };

        while let Some(frame) = ws.next().await {
            let data = match frame {
                Ok(Message::Binary(data)) => Bytes::from(data),
                Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                Ok(Message::Close(_)) => break,
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket connection from {} closed: {}", peer, e);
                    break;
                }
            };

            let reply = on_data(data);
            if let Err(e) = ws.send(Message::Binary(reply.into())).await {
                debug!("WebSocket echo to {} failed: {}", peer, e);
                break;
            }
        }
        debug!("WebSocket connection from {} finished", peer);
    }
}

#[async_trait]
impl EchoTransport for PersistentTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Persistent
    }

    async fn listen(
        &self,
        addr: SocketAddr,
        on_data: DataHandler,
    ) -> Result<Listener, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::Persistent,
            address: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tokio::spawn(Self::handle_connection(stream, peer, on_data.clone()));
                    }
                    Err(e) => {
                        error!("Persistent listener on {} stopped accepting: {}", local_addr, e);
                        break;
                    }
                }
            }
        });

        Ok(Listener::new(TransportKind::Persistent, local_addr, task))
    }

    async fn exchange(&self, addr: SocketAddr, payload: Bytes) -> Result<Bytes, TransportError> {
        let fail = |e: tokio_tungstenite::tungstenite::Error| {
            TransportError::transport(TransportKind::Persistent, e)
        };

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", addr))
            .await
            .map_err(fail)?;

        ws.send(Message::Binary(payload.into())).await.map_err(fail)?;

        let reply = loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => break Bytes::from(data),
                Some(Ok(Message::Text(text))) => {
                    break Bytes::copy_from_slice(text.as_str().as_bytes())
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::transport(
                        TransportKind::Persistent,
                        "channel closed before a reply arrived",
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(fail(e)),
            }
        };

        let _ = ws.close(None).await;
        debug!("Persistent exchange with {} returned {} bytes", addr, reply.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_persistent_echo_round_trip() {
        let transport = PersistentTransport::new();
        let listener = transport
            .listen("127.0.0.1:0".parse().unwrap(), Arc::new(|data: Bytes| data))
            .await
            .unwrap();

        let payload = Bytes::from(vec![3u8; 1024]);
        let reply = transport
            .exchange(listener.local_addr, payload.clone())
            .await
            .unwrap();
        assert_eq!(reply, payload);

        listener.shutdown();
    }

    #[tokio::test]
    async fn test_persistent_listener_reports_address() {
        let transport = PersistentTransport::new();
        let listener = transport
            .listen("127.0.0.1:0".parse().unwrap(), Arc::new(|data: Bytes| data))
            .await
            .unwrap();

        assert_eq!(listener.transport, TransportKind::Persistent);
        assert_ne!(listener.local_addr.port(), 0);
        assert!(!listener.is_finished());

        listener.shutdown();
    }
}
