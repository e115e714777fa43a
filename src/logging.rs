//! Console logging and the event sink harness components report through.
//!
//! Orchestrator, echo servers and race runners never log their
//! contract-level events directly: they emit [`HarnessEvent`]s into an
//! injected [`EventSink`]. Production wires in [`TracingSink`], tests use
//! [`MemorySink`] to assert on exactly what was reported.

use crate::benchmark::TimingTriple;
use crate::coordination::PortTriple;
use crate::transport::TransportKind;
use colored::*;
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Something observable that happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum HarnessEvent {
    /// The run configuration was resolved; emitted before any work
    Configured { summary: String },
    /// A listener is bound and serving
    Listening {
        instance: usize,
        transport: TransportKind,
        addr: SocketAddr,
    },
    /// A listener could not start; its siblings are unaffected
    ListenerFailed {
        instance: usize,
        transport: TransportKind,
        error: String,
    },
    /// A race runner was launched
    RaceLaunched { instance: usize, ports: PortTriple },
    /// A race finished with a valid timing triple
    RaceCompleted {
        instance: usize,
        timing: TimingTriple,
    },
    /// A race failed; `excluded` tells whether the run continues without it
    RaceFailed {
        instance: usize,
        error: String,
        excluded: bool,
    },
}

/// Destination for [`HarnessEvent`]s
pub trait EventSink: Send + Sync {
    fn emit(&self, event: HarnessEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: HarnessEvent) {
        match event {
            HarnessEvent::Configured { summary } => info!("Run configuration: {}", summary),
            HarnessEvent::Listening {
                instance,
                transport,
                addr,
            } => info!(
                "Instance {}: {} server listening on {}",
                instance, transport, addr
            ),
            HarnessEvent::ListenerFailed {
                instance,
                transport,
                error,
            } => error!(
                "Instance {}: {} server failed: {}",
                instance, transport, error
            ),
            HarnessEvent::RaceLaunched { instance, ports } => {
                debug!("Instance {}: racing on ports {}", instance, ports)
            }
            HarnessEvent::RaceCompleted { instance, timing } => debug!(
                "Instance {}: fast={:.3}ms request_reply={:.3}ms persistent={:.3}ms",
                instance, timing.fast_ms, timing.request_reply_ms, timing.persistent_ms
            ),
            HarnessEvent::RaceFailed {
                instance,
                error,
                excluded: true,
            } => warn!("Instance {} excluded from results: {}", instance, error),
            HarnessEvent::RaceFailed { instance, error, .. } => {
                error!("Instance {} failed: {}", instance, error)
            }
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<HarnessEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: HarnessEvent) {
        self.events.lock().push(event);
    }
}

/// A tracing event formatter that prefixes a wall-clock time and colors the
/// message by level.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Fields are buffered so the whole message takes one color
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string();

        writeln!(writer, "{} {}", timestamp.dimmed(), colored_output)
    }
}

/// Install the colorized subscriber; `RUST_LOG` takes precedence over `verbose`
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(ColorizedFormatter)
        .try_init();
}
