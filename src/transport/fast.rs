use super::{DataHandler, EchoTransport, Listener, TransportError, TransportKind};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// Socket buffer size applied to both ends of a connection
const SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Read chunk size for the echo loop
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Unframed TCP transport tuned for low latency
///
/// The server echoes every chunk it reads as soon as it arrives. The client
/// knows how many bytes it sent and reads until the same number came back,
/// so no framing is needed on the wire.
#[derive(Debug, Clone)]
pub struct FastTransport {
    buffer_size: usize,
}

impl Default for FastTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FastTransport {
    pub fn new() -> Self {
        Self {
            buffer_size: SOCKET_BUFFER_SIZE,
        }
    }

    /// Disable Nagle and size the kernel buffers for the payloads we race
    fn configure(stream: TcpStream, buffer_size: usize) -> std::io::Result<TcpStream> {
        let std_stream = stream.into_std()?;
        let socket = socket2::Socket::from(std_stream.try_clone()?);
        socket.set_nodelay(true)?;
        socket.set_recv_buffer_size(buffer_size)?;
        socket.set_send_buffer_size(buffer_size)?;
        TcpStream::from_std(std_stream)
    }

    async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, on_data: DataHandler) {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Fast connection from {} closed: {}", peer, e);
                    break;
                }
            };

            let reply = on_data(Bytes::copy_from_slice(&buf[..n]));
            if let Err(e) = stream.write_all(&reply).await {
                debug!("Fast echo to {} failed: {}", peer, e);
                break;
            }
        }
        debug!("Fast connection from {} finished", peer);
    }
}

#[async_trait]
impl EchoTransport for FastTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Fast
    }

    async fn listen(
        &self,
        addr: SocketAddr,
        on_data: DataHandler,
    ) -> Result<Listener, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::Fast,
            address: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        let buffer_size = self.buffer_size;

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let stream = match Self::configure(stream, buffer_size) {
                            Ok(stream) => stream,
                            Err(e) => {
                                error!("Failed to configure fast connection from {}: {}", peer, e);
                                continue;
                            }
                        };
                        tokio::spawn(Self::handle_connection(stream, peer, on_data.clone()));
                    }
                    Err(e) => {
                        error!("Fast listener on {} stopped accepting: {}", local_addr, e);
                        break;
                    }
                }
            }
        });

        Ok(Listener::new(TransportKind::Fast, local_addr, task))
    }

    async fn exchange(&self, addr: SocketAddr, payload: Bytes) -> Result<Bytes, TransportError> {
        let fail = |e: std::io::Error| TransportError::transport(TransportKind::Fast, e);

        let stream = TcpStream::connect(addr).await.map_err(fail)?;
        let mut stream = Self::configure(stream, self.buffer_size).map_err(fail)?;

        stream.write_all(&payload).await.map_err(fail)?;

        // A short reply surfaces as a mismatch, so stop at EOF instead of failing
        let mut reply = BytesMut::with_capacity(payload.len());
        while reply.len() < payload.len() {
            let n = stream.read_buf(&mut reply).await.map_err(fail)?;
            if n == 0 {
                break;
            }
        }

        let _ = stream.shutdown().await;
        debug!("Fast exchange with {} returned {} bytes", addr, reply.len());
        Ok(reply.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_echo_round_trip() {
        let transport = FastTransport::new();
        let listener = transport
            .listen("127.0.0.1:0".parse().unwrap(), Arc::new(|data: Bytes| data))
            .await
            .unwrap();

        let payload = Bytes::from(vec![7u8; 100 * 1024]);
        let reply = transport
            .exchange(listener.local_addr, payload.clone())
            .await
            .unwrap();
        assert_eq!(reply, payload);

        listener.shutdown();
    }

    #[tokio::test]
    async fn test_fast_short_reply_waits_for_full_payload() {
        let transport = FastTransport::new();
        let listener = transport
            .listen(
                "127.0.0.1:0".parse().unwrap(),
                Arc::new(|data: Bytes| data.slice(..data.len() / 2)),
            )
            .await
            .unwrap();

        let payload = Bytes::from_static(b"ping");
        let reply = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            transport.exchange(listener.local_addr, payload),
        )
        .await;
        // The server keeps the connection open, so a short echo never completes
        assert!(reply.is_err());

        listener.shutdown();
    }

    #[tokio::test]
    async fn test_fast_connect_refused() {
        let transport = FastTransport::new();
        // Bind then drop to obtain a port nobody listens on
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let err = transport
            .exchange(addr, Bytes::from_static(b"ping"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), super::super::ErrorKind::Transport);
    }
}
