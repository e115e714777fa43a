use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use transport_race::{
    transport::{DataHandler, Listener, RequestReplyTransport},
    EchoServerSet, EchoTransport, FailurePolicy, HarnessEvent, MemorySink, Orchestrator, Payload,
    PayloadSize, RunConfiguration, TransportError, TransportKind, TransportSet,
};

/// Request-reply adapter whose server answers with the payload reversed.
struct ReversingTransport {
    inner: RequestReplyTransport,
}

#[async_trait]
impl EchoTransport for ReversingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RequestReply
    }

    async fn listen(
        &self,
        addr: SocketAddr,
        on_data: DataHandler,
    ) -> Result<Listener, TransportError> {
        let reversing: DataHandler = Arc::new(move |data: Bytes| {
            let mut reply = on_data(data).to_vec();
            reply.reverse();
            Bytes::from(reply)
        });
        self.inner.listen(addr, reversing).await
    }

    async fn exchange(&self, addr: SocketAddr, payload: Bytes) -> Result<Bytes, TransportError> {
        self.inner.exchange(addr, payload).await
    }
}

fn config(base_port: u16, instance_count: usize, policy: FailurePolicy) -> RunConfiguration {
    RunConfiguration {
        instance_count,
        base_port,
        operation_timeout: Duration::from_secs(5),
        failure_policy: policy,
        ..Default::default()
    }
}

async fn start_all(orchestrator: &Orchestrator) -> Result<Vec<EchoServerSet>> {
    let mut sets = Vec::new();
    for handle in orchestrator.start_servers()? {
        sets.push(handle.await?);
    }
    Ok(sets)
}

/// A corrupted reply fails the run under fail-fast and never becomes a sample.
#[tokio::test]
async fn mismatched_reply_fails_the_run() -> Result<()> {
    let mut transports = TransportSet::standard();
    transports.request_reply = Arc::new(ReversingTransport {
        inner: RequestReplyTransport::new(),
    });
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(
        config(25200, 1, FailurePolicy::FailFast),
        transports,
        sink.clone(),
    )?;

    let servers = start_all(&orchestrator).await?;

    let err = orchestrator
        .run_clients(Payload::synthetic(PayloadSize::Tiny))
        .await
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Request-Reply reply did not match payload"), "{}", message);

    let failed = sink.events().into_iter().any(|e| {
        matches!(
            e,
            HarnessEvent::RaceFailed {
                instance: 0,
                excluded: false,
                ..
            }
        )
    });
    assert!(failed);

    for set in servers {
        set.shutdown();
    }
    Ok(())
}

/// Under the exclude policy a dead instance is dropped and the rest are kept.
#[tokio::test]
async fn exclude_policy_keeps_healthy_instances() -> Result<()> {
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(
        config(25300, 3, FailurePolicy::Exclude),
        TransportSet::standard(),
        sink.clone(),
    )?;

    let mut servers = start_all(&orchestrator).await?;
    // Take instance 1 offline so every connection to it is refused
    servers.remove(1).shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let samples = orchestrator
        .run_clients(Payload::synthetic(PayloadSize::OneKb))
        .await?;
    assert_eq!(samples.len(), 2);
    assert_eq!(samples.excluded, vec![1]);

    let excluded = sink.events().into_iter().any(|e| {
        matches!(
            e,
            HarnessEvent::RaceFailed {
                instance: 1,
                excluded: true,
                ..
            }
        )
    });
    assert!(excluded);

    for set in servers {
        set.shutdown();
    }
    Ok(())
}

/// The same dead instance aborts the whole run under fail-fast.
#[tokio::test]
async fn fail_fast_aborts_on_dead_instance() -> Result<()> {
    let orchestrator = Orchestrator::new(
        config(25400, 3, FailurePolicy::FailFast),
        TransportSet::standard(),
        Arc::new(MemorySink::new()),
    )?;

    let mut servers = start_all(&orchestrator).await?;
    servers.remove(1).shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = orchestrator
        .run_clients(Payload::synthetic(PayloadSize::Tiny))
        .await;
    assert!(result.is_err());

    for set in servers {
        set.shutdown();
    }
    Ok(())
}

/// With no servers at all, every instance fails and the run reports it.
#[tokio::test]
async fn exclude_policy_with_no_servers_fails() -> Result<()> {
    let orchestrator = Orchestrator::new(
        config(25500, 2, FailurePolicy::Exclude),
        TransportSet::standard(),
        Arc::new(MemorySink::new()),
    )?;

    let err = orchestrator
        .run_clients(Payload::synthetic(PayloadSize::Tiny))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("All 2 instances failed"));
    Ok(())
}
