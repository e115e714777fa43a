//! # Race Runner Module
//!
//! One race sends the same payload over all three transports at once and
//! times each round trip independently.
//!
//! ## Timing
//!
//! Each operation starts its own [`Stopwatch`] immediately before the payload
//! is handed to the adapter, and stops it once the reply has arrived and
//! matched the payload byte for byte. There is no shared start instant, so a
//! slow dispatch of one transport does not inflate another's duration.
//!
//! ## Join semantics
//!
//! Despite the name, a race is not first-wins: the runner waits for all three
//! operations to settle. Operations are polled in the fixed order fast,
//! request-reply, persistent, and their completions may arrive in any order.
//! Any failed operation fails the whole race, and the failure lists every
//! operation that went wrong.
//!
//! ## Errors
//!
//! - `Transport`: the adapter reported a connection, send or receive failure
//! - `Mismatch`: a reply arrived but is not the payload that was sent
//! - `Timeout`: no reply within the configured operation timeout
//!
//! None of them are retried.

use crate::{
    coordination::PortTriple,
    metrics::Stopwatch,
    payload::Payload,
    transport::{self, EchoTransport, TransportError, TransportKind, TransportSet},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Round-trip durations of one race, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingTriple {
    pub fast_ms: f64,
    pub request_reply_ms: f64,
    pub persistent_ms: f64,
}

impl TimingTriple {
    pub fn new(fast_ms: f64, request_reply_ms: f64, persistent_ms: f64) -> Self {
        Self {
            fast_ms,
            request_reply_ms,
            persistent_ms,
        }
    }

    pub fn get(&self, kind: TransportKind) -> f64 {
        match kind {
            TransportKind::Fast => self.fast_ms,
            TransportKind::RequestReply => self.request_reply_ms,
            TransportKind::Persistent => self.persistent_ms,
        }
    }
}

/// A race that did not produce a usable timing triple
#[derive(Debug, Error)]
#[error("instance {instance} failed: {}", describe(.errors))]
pub struct RaceFailure {
    pub instance: usize,
    pub errors: Vec<TransportError>,
}

fn describe(errors: &[TransportError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Timing triples of a client run, in launch order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub samples: Vec<TimingTriple>,
    /// Indices of instances dropped under the exclude policy
    pub excluded: Vec<usize>,
}

impl SampleSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            excluded: Vec::new(),
        }
    }

    pub fn from_samples(samples: Vec<TimingTriple>) -> Self {
        Self {
            samples,
            excluded: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: TimingTriple) {
        self.samples.push(sample);
    }

    pub fn exclude(&mut self, instance: usize) {
        self.excluded.push(instance);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Durations of one transport across all samples
    pub fn column(&self, kind: TransportKind) -> Vec<f64> {
        self.samples.iter().map(|s| s.get(kind)).collect()
    }
}

/// Races one payload through every transport of a [`TransportSet`]
pub struct RaceRunner {
    transports: TransportSet,
    operation_timeout: Duration,
}

impl RaceRunner {
    pub fn new(transports: TransportSet, operation_timeout: Duration) -> Self {
        Self {
            transports,
            operation_timeout,
        }
    }

    /// Run one race for `instance` against the servers on `ports`
    pub async fn run(
        &self,
        instance: usize,
        host: &str,
        ports: PortTriple,
        payload: &Payload,
    ) -> Result<TimingTriple, RaceFailure> {
        let (fast, request_reply, persistent) = tokio::join!(
            self.timed(self.transports.fast.as_ref(), host, ports.fast, payload),
            self.timed(
                self.transports.request_reply.as_ref(),
                host,
                ports.request_reply,
                payload
            ),
            self.timed(
                self.transports.persistent.as_ref(),
                host,
                ports.persistent,
                payload
            ),
        );

        match (fast, request_reply, persistent) {
            (Ok(fast_ms), Ok(request_reply_ms), Ok(persistent_ms)) => {
                debug!(
                    "Instance {} finished: fast={:.3}ms request_reply={:.3}ms persistent={:.3}ms",
                    instance, fast_ms, request_reply_ms, persistent_ms
                );
                Ok(TimingTriple::new(fast_ms, request_reply_ms, persistent_ms))
            }
            (fast, request_reply, persistent) => Err(RaceFailure {
                instance,
                errors: [fast.err(), request_reply.err(), persistent.err()]
                    .into_iter()
                    .flatten()
                    .collect(),
            }),
        }
    }

    /// One timed round trip; the clock covers dispatch, reply and verification
    async fn timed(
        &self,
        transport: &dyn EchoTransport,
        host: &str,
        port: u16,
        payload: &Payload,
    ) -> Result<f64, TransportError> {
        let kind = transport.kind();
        let addr = transport::resolve(host, port)
            .await
            .map_err(|e| TransportError::transport(kind, e))?;

        let clock = Stopwatch::start();
        let reply = tokio::time::timeout(
            self.operation_timeout,
            transport.exchange(addr, payload.bytes().clone()),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            transport: kind,
            timeout: self.operation_timeout,
        })??;

        if reply != *payload.bytes() {
            return Err(TransportError::Mismatch {
                transport: kind,
                sent: payload.len(),
                received: reply.len(),
            });
        }
        Ok(clock.elapsed_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DataHandler, ErrorKind, Listener};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::sync::Arc;

    /// In-process adapter whose replies are computed by a closure
    struct ScriptedTransport {
        kind: TransportKind,
        reply: fn(Bytes) -> Result<Bytes, TransportError>,
        delay: Duration,
    }

    #[async_trait]
    impl EchoTransport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn listen(
            &self,
            addr: SocketAddr,
            _on_data: DataHandler,
        ) -> Result<Listener, TransportError> {
            Ok(Listener::new(self.kind, addr, tokio::spawn(async {})))
        }

        async fn exchange(
            &self,
            _addr: SocketAddr,
            payload: Bytes,
        ) -> Result<Bytes, TransportError> {
            tokio::time::sleep(self.delay).await;
            (self.reply)(payload)
        }
    }

    fn scripted(
        kind: TransportKind,
        reply: fn(Bytes) -> Result<Bytes, TransportError>,
        delay: Duration,
    ) -> Arc<dyn EchoTransport> {
        Arc::new(ScriptedTransport { kind, reply, delay })
    }

    fn echo(payload: Bytes) -> Result<Bytes, TransportError> {
        Ok(payload)
    }

    fn corrupt(_payload: Bytes) -> Result<Bytes, TransportError> {
        Ok(Bytes::from_static(b"pong"))
    }

    fn refuse(_payload: Bytes) -> Result<Bytes, TransportError> {
        Err(TransportError::transport(
            TransportKind::RequestReply,
            "connection refused",
        ))
    }

    fn ports() -> PortTriple {
        PortTriple {
            fast: 9000,
            request_reply: 9001,
            persistent: 9002,
        }
    }

    fn echo_set() -> TransportSet {
        TransportSet {
            fast: scripted(TransportKind::Fast, echo, Duration::from_millis(1)),
            request_reply: scripted(TransportKind::RequestReply, echo, Duration::from_millis(5)),
            persistent: scripted(TransportKind::Persistent, echo, Duration::from_millis(3)),
        }
    }

    #[tokio::test]
    async fn test_race_times_each_transport_independently() {
        let runner = RaceRunner::new(echo_set(), Duration::from_secs(1));
        let payload = Payload::new(Bytes::from_static(b"ping"));

        let timing = runner.run(0, "127.0.0.1", ports(), &payload).await.unwrap();
        assert!(timing.fast_ms >= 1.0);
        assert!(timing.request_reply_ms >= 5.0);
        assert!(timing.persistent_ms >= 3.0);
        // Concurrent, not sequential: fast must not include the others' delays
        assert!(timing.fast_ms < timing.request_reply_ms);
    }

    #[tokio::test]
    async fn test_race_reports_mismatch() {
        let mut set = echo_set();
        set.persistent = scripted(TransportKind::Persistent, corrupt, Duration::ZERO);
        let runner = RaceRunner::new(set, Duration::from_secs(1));
        let payload = Payload::new(Bytes::from_static(b"ping"));

        let failure = runner.run(4, "127.0.0.1", ports(), &payload).await.unwrap_err();
        assert_eq!(failure.instance, 4);
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].kind(), ErrorKind::Mismatch);
        assert_eq!(failure.errors[0].transport_kind(), TransportKind::Persistent);
    }

    #[tokio::test]
    async fn test_race_collects_every_failure() {
        let mut set = echo_set();
        set.fast = scripted(TransportKind::Fast, corrupt, Duration::ZERO);
        set.request_reply = scripted(TransportKind::RequestReply, refuse, Duration::ZERO);
        let runner = RaceRunner::new(set, Duration::from_secs(1));
        let payload = Payload::new(Bytes::from_static(b"ping"));

        let failure = runner.run(0, "127.0.0.1", ports(), &payload).await.unwrap_err();
        let kinds: Vec<ErrorKind> = failure.errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![ErrorKind::Mismatch, ErrorKind::Transport]);
        assert!(failure.to_string().starts_with("instance 0 failed: "));
    }

    #[tokio::test]
    async fn test_race_times_out_stalled_operation() {
        let mut set = echo_set();
        set.request_reply = scripted(TransportKind::RequestReply, echo, Duration::from_secs(60));
        let runner = RaceRunner::new(set, Duration::from_millis(50));
        let payload = Payload::new(Bytes::from_static(b"ping"));

        let failure = runner.run(1, "127.0.0.1", ports(), &payload).await.unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].kind(), ErrorKind::Timeout);
        assert_eq!(
            failure.errors[0].transport_kind(),
            TransportKind::RequestReply
        );
    }

    #[test]
    fn test_sample_set_columns_preserve_order() {
        let mut set = SampleSet::with_capacity(2);
        set.push(TimingTriple::new(1.0, 2.0, 3.0));
        set.push(TimingTriple::new(4.0, 5.0, 6.0));
        set.exclude(2);

        assert_eq!(set.len(), 2);
        assert_eq!(set.column(TransportKind::Fast), vec![1.0, 4.0]);
        assert_eq!(set.column(TransportKind::RequestReply), vec![2.0, 5.0]);
        assert_eq!(set.column(TransportKind::Persistent), vec![3.0, 6.0]);
        assert_eq!(set.excluded, vec![2]);
    }
}
