//! # Transport Race - Main Entry Point
//!
//! 1. **Initialize logging**: colorized `tracing` output on stderr
//! 2. **Parse arguments**: CLI flags with `BENCH_*` environment overrides
//! 3. **Resolve configuration**: validated once, passed by reference
//! 4. **Server mode**: start every echo server set and serve until Ctrl-C
//! 5. **Client mode**: race every instance, compute statistics, print the
//!    JSON report to stdout
//!
//! The runtime is single-threaded: all instances and transports interleave
//! at I/O suspension points on one thread.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use transport_race::{
    cli::{Args, Mode, RunConfiguration},
    logging::{self, TracingSink},
    BenchmarkReport, Orchestrator, Payload, Reporter, RunStatistics, TransportSet,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    info!("Starting Transport Race v{}", transport_race::VERSION);

    let config = RunConfiguration::from_args(&args)?;
    let orchestrator = Orchestrator::new(config, TransportSet::standard(), Arc::new(TracingSink))?;

    match orchestrator.config().mode {
        Mode::Server => serve(&orchestrator).await,
        Mode::Client => race(&orchestrator).await,
    }
}

/// Start all echo servers and keep serving until interrupted
async fn serve(orchestrator: &Orchestrator) -> Result<()> {
    let handles = orchestrator.start_servers()?;
    info!(
        "Started {} echo server sets, press Ctrl-C to stop",
        handles.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down echo servers");
    for handle in handles {
        match handle.await {
            Ok(set) => set.shutdown(),
            Err(e) => error!("Echo server set task failed: {}", e),
        }
    }
    Ok(())
}

/// Race every instance once and report
async fn race(orchestrator: &Orchestrator) -> Result<()> {
    let config = orchestrator.config();
    let payload = Payload::load(config.payload_size, config.payload_dir.as_deref())?;
    info!(
        "Loaded {} payload ({} bytes)",
        config.payload_size,
        payload.len()
    );

    let samples = orchestrator.run_clients(payload).await?;
    let statistics = RunStatistics::from_samples(&samples)?;
    let report = BenchmarkReport::new(config, &samples, &statistics)?;

    Reporter::new(config.output_file.clone()).emit(&report, &mut std::io::stdout().lock())?;

    info!("Transport Race completed successfully");
    Ok(())
}
