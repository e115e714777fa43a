//! # Transport Race Library
//!
//! A latency benchmark that races identical payloads through three
//! transports at once and compares their round-trip times.
//!
//! ## Transports Under Comparison
//!
//! - **Fast**: unframed TCP with Nagle disabled, echoing chunks as they arrive
//! - **Request-Reply**: HTTP/1.1, one `POST /` per round trip
//! - **Persistent**: WebSocket, one binary message each way over a channel
//!
//! ## Architecture Overview
//!
//! - `cli`: argument parsing with environment overrides and `RunConfiguration`
//! - `payload`: fixture loading and synthetic payloads per size class
//! - `transport`: the `EchoTransport` adapter contract and its three adapters
//! - `echo`: one echo listener per transport for an instance
//! - `benchmark`: the race runner, timing triples and sample sets
//! - `coordination`: port derivation and the spin-up orchestrator
//! - `metrics`: the stopwatch and per-transport descriptive statistics
//! - `results`: structured report and console summary
//! - `logging`: colorized console output and the injected event sink
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use transport_race::{
//!     EchoServerSet, Orchestrator, Payload, PayloadSize, RunConfiguration, RunStatistics,
//!     TracingSink, TransportSet,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfiguration {
//!         instance_count: 4,
//!         base_port: 9000,
//!         ..Default::default()
//!     };
//!     let orchestrator = Orchestrator::new(config, TransportSet::standard(), Arc::new(TracingSink))?;
//!
//!     let mut servers: Vec<EchoServerSet> = Vec::new();
//!     for handle in orchestrator.start_servers()? {
//!         servers.push(handle.await?);
//!     }
//!
//!     let samples = orchestrator.run_clients(Payload::synthetic(PayloadSize::OneKb)).await?;
//!     let stats = RunStatistics::from_samples(&samples)?;
//!     println!("fast median: {:.3}ms", stats.fast.median);
//!     Ok(())
//! }
//! ```

/// Race runner and sample collection
///
/// Runs the three transports concurrently for one instance and joins their
/// outcomes into a `TimingTriple`, or a `RaceFailure` listing every failed
/// operation.
pub mod benchmark;

/// Command-line interface and run configuration
pub mod cli;

/// Port derivation and the spin-up orchestrator
pub mod coordination;

/// Echo server set for one instance
pub mod echo;

/// Console log formatting and the harness event sink
pub mod logging;

/// Stopwatch and descriptive statistics
///
/// Statistics are computed per transport with identical formulas: stable
/// ascending sort, arithmetic mean, upper-middle median, population variance
/// and standard deviation, extremes, five-element tails and HDR tail
/// percentiles.
pub mod metrics;

/// Payload size classes and fixtures
pub mod payload;

/// Structured report and console summary
pub mod results;

/// Transport adapter contract and implementations
///
/// Each adapter can listen with a per-message data handler and perform a
/// single request/reply exchange. Errors are typed so the race runner can
/// tell transport failures, mismatched replies, timeouts and bind failures
/// apart.
pub mod transport;

pub mod utils;

pub use benchmark::{RaceFailure, RaceRunner, SampleSet, TimingTriple};
pub use cli::{Args, FailurePolicy, Mode, RunConfiguration};
pub use coordination::{Orchestrator, PortTriple};
pub use echo::EchoServerSet;
pub use logging::{EventSink, HarnessEvent, MemorySink, TracingSink};
pub use metrics::{RunStatistics, Stopwatch, TransportStatistics};
pub use payload::{Payload, PayloadSize};
pub use results::{BenchmarkReport, Reporter};
pub use transport::{EchoTransport, ErrorKind, TransportError, TransportKind, TransportSet};

/// The current version of the benchmark, recorded in every report
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default number of instances
    ///
    /// Enough samples for the five-element tails to be distinct from each
    /// other while keeping the port range small (three ports per instance).
    pub const INSTANCE_COUNT: usize = 10;

    /// Default first port
    pub const BASE_PORT: u16 = 8000;

    /// Default bind and connect address
    pub const BIND_ADDRESS: &str = "127.0.0.1";

    /// Default per-operation reply timeout
    pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default delay between race runner launches
    pub const LAUNCH_DELAY: Duration = Duration::from_millis(1);
}
