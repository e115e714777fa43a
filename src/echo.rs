use crate::{
    coordination::PortTriple,
    logging::{EventSink, HarnessEvent},
    transport::{self, DataHandler, Listener, TransportError, TransportKind, TransportSet},
};
use bytes::Bytes;
use std::sync::Arc;

/// Three echo listeners, one per transport, for a single instance
pub struct EchoServerSet {
    pub instance: usize,
    pub ports: PortTriple,
    pub listeners: Vec<Listener>,
    pub failures: Vec<TransportError>,
}

impl EchoServerSet {
    /// Start all three listeners. A listener that fails to start is reported
    /// to `sink` and left out; the other two keep serving.
    pub async fn start(
        transports: &TransportSet,
        host: &str,
        instance: usize,
        ports: PortTriple,
        sink: &dyn EventSink,
    ) -> Self {
        let echo: DataHandler = Arc::new(|data: Bytes| data);
        let mut listeners = Vec::with_capacity(TransportKind::ALL.len());
        let mut failures = Vec::new();

        for kind in TransportKind::ALL {
            let port = ports.get(kind);
            let started = match transport::resolve(host, port).await {
                Ok(addr) => transports.get(kind).listen(addr, echo.clone()).await,
                Err(source) => Err(TransportError::Bind {
                    transport: kind,
                    address: format!("{}:{}", host, port),
                    source,
                }),
            };

            match started {
                Ok(listener) => {
                    sink.emit(HarnessEvent::Listening {
                        instance,
                        transport: kind,
                        addr: listener.local_addr,
                    });
                    listeners.push(listener);
                }
                Err(e) => {
                    sink.emit(HarnessEvent::ListenerFailed {
                        instance,
                        transport: kind,
                        error: e.to_string(),
                    });
                    failures.push(e);
                }
            }
        }

        Self {
            instance,
            ports,
            listeners,
            failures,
        }
    }

    /// Whether every transport is serving
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Stop every listener in the set
    pub fn shutdown(self) {
        for listener in self.listeners {
            listener.shutdown();
        }
    }
}
