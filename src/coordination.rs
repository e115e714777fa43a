//! # Spin-up Orchestration Module
//!
//! Turns a [`RunConfiguration`] into running instances. Every instance gets
//! its own [`PortTriple`], derived from the instance index so that no two
//! listeners in a run ever share a port:
//!
//! ```text
//! instance i:  fast = base + i
//!              request-reply = base + i + count
//!              persistent = base + i + 2 * count
//! ```
//!
//! A process runs either all servers or all clients, never a mix.
//!
//! ## Server mode
//!
//! One [`EchoServerSet`] per instance is spawned without waiting for the
//! previous one to be ready. Bind failures are reported and do not stop
//! other listeners.
//!
//! ## Client mode
//!
//! One [`RaceRunner`] task per instance, launched with a short delay between
//! launches so that spawning one race does not skew the timing of the next.
//! Results are awaited in launch order, so the [`SampleSet`] preserves it.
//! A failed instance is handled according to the [`FailurePolicy`].

use crate::{
    benchmark::{RaceRunner, SampleSet},
    cli::{FailurePolicy, RunConfiguration},
    echo::EchoServerSet,
    logging::{EventSink, HarnessEvent},
    payload::Payload,
    transport::{TransportKind, TransportSet},
};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Ports of one instance's three listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortTriple {
    pub fast: u16,
    pub request_reply: u16,
    pub persistent: u16,
}

impl PortTriple {
    /// Derive the ports of instance `index` out of `count`
    pub fn for_instance(base_port: u16, index: usize, count: usize) -> Result<Self> {
        if index >= count {
            bail!("Instance index {} out of range for {} instances", index, count);
        }
        let port = |stride: usize| -> Result<u16> {
            count
                .checked_mul(stride)
                .and_then(|offset| offset.checked_add(index))
                .and_then(|offset| offset.checked_add(base_port as usize))
                .and_then(|value| u16::try_from(value).ok())
                .ok_or_else(|| {
                    anyhow!(
                        "Instance {} of {} starting at port {} needs a port beyond 65535",
                        index,
                        count,
                        base_port
                    )
                })
        };
        Ok(Self {
            fast: port(0)?,
            request_reply: port(1)?,
            persistent: port(2)?,
        })
    }

    pub fn get(&self, kind: TransportKind) -> u16 {
        match kind {
            TransportKind::Fast => self.fast,
            TransportKind::RequestReply => self.request_reply,
            TransportKind::Persistent => self.persistent,
        }
    }
}

impl std::fmt::Display for PortTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fast={} request_reply={} persistent={}",
            self.fast, self.request_reply, self.persistent
        )
    }
}

/// Starts server sets or race runners for every instance of a run
pub struct Orchestrator {
    config: RunConfiguration,
    transports: TransportSet,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        config: RunConfiguration,
        transports: TransportSet,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transports,
            sink,
        })
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    fn announce(&self) {
        self.sink.emit(HarnessEvent::Configured {
            summary: self.config.to_string(),
        });
    }

    /// Spawn one echo server set per instance and return their handles
    ///
    /// The handles resolve once the corresponding set has finished binding;
    /// awaiting them is optional.
    pub fn start_servers(&self) -> Result<Vec<JoinHandle<EchoServerSet>>> {
        self.announce();

        let count = self.config.instance_count;
        let mut handles = Vec::with_capacity(count);
        for instance in 0..count {
            let ports = PortTriple::for_instance(self.config.base_port, instance, count)?;
            let transports = self.transports.clone();
            let host = self.config.bind_address.clone();
            let sink = self.sink.clone();

            handles.push(tokio::spawn(async move {
                EchoServerSet::start(&transports, &host, instance, ports, sink.as_ref()).await
            }));
        }
        Ok(handles)
    }

    /// Race `payload` on every instance and collect the timing triples
    pub async fn run_clients(&self, payload: Payload) -> Result<SampleSet> {
        self.announce();

        let count = self.config.instance_count;
        let runner = Arc::new(RaceRunner::new(
            self.transports.clone(),
            self.config.operation_timeout,
        ));

        let mut handles = Vec::with_capacity(count);
        for instance in 0..count {
            if instance > 0 && !self.config.launch_delay.is_zero() {
                tokio::time::sleep(self.config.launch_delay).await;
            }

            let ports = PortTriple::for_instance(self.config.base_port, instance, count)?;
            self.sink.emit(HarnessEvent::RaceLaunched { instance, ports });

            let runner = runner.clone();
            let payload = payload.clone();
            let host = self.config.bind_address.clone();
            handles.push(tokio::spawn(async move {
                runner.run(instance, &host, ports, &payload).await
            }));
        }

        let mut samples = SampleSet::with_capacity(count);
        let mut pending = handles.into_iter().enumerate();
        let mut aborted = None;
        for (instance, handle) in pending.by_ref() {
            let outcome = handle.await.context("Race runner task panicked")?;
            match outcome {
                Ok(timing) => {
                    self.sink
                        .emit(HarnessEvent::RaceCompleted { instance, timing });
                    samples.push(timing);
                }
                Err(failure) => {
                    let excluded = self.config.failure_policy == FailurePolicy::Exclude;
                    self.sink.emit(HarnessEvent::RaceFailed {
                        instance: failure.instance,
                        error: failure.to_string(),
                        excluded,
                    });
                    if !excluded {
                        aborted = Some(failure);
                        break;
                    }
                    samples.exclude(failure.instance);
                }
            }
        }

        if let Some(failure) = aborted {
            for (_, rest) in pending {
                rest.abort();
            }
            return Err(anyhow!(failure).context("Benchmark run aborted"));
        }

        if samples.is_empty() {
            bail!("All {} instances failed; no samples to analyze", count);
        }
        Ok(samples)
    }
}
