use crate::payload::PayloadSize;
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Transport Race - compare round-trip latency of a fast TCP transport,
/// HTTP request/reply and a WebSocket channel under identical payloads
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Run the echo servers or the racing clients
    #[clap(value_enum, env = "BENCH_MODE", default_value_t = Mode::Client, help_heading = "Core Options")]
    pub mode: Mode,

    /// Number of instances (server sets or race runners)
    #[clap(short = 'n', long, env = "BENCH_INSTANCES", default_value_t = crate::defaults::INSTANCE_COUNT)]
    pub instances: usize,

    /// First port; each instance uses three ports derived from it
    #[clap(short = 'p', long, env = "BENCH_BASE_PORT", default_value_t = crate::defaults::BASE_PORT)]
    pub base_port: u16,

    /// Address servers bind to and clients connect to
    #[clap(long, env = "BENCH_BIND_ADDRESS", default_value = crate::defaults::BIND_ADDRESS)]
    pub bind_address: String,

    /// Payload size class
    #[clap(short = 's', long, value_enum, env = "BENCH_PAYLOAD_SIZE", default_value_t = PayloadSize::Tiny)]
    pub payload_size: PayloadSize,

    /// Directory holding payload fixtures (tiny.txt, 1kb.txt, 10kb.txt, 100kb.txt)
    #[clap(long, env = "BENCH_PAYLOAD_DIR")]
    pub payload_dir: Option<PathBuf>,

    /// Per-operation reply timeout (e.g. "500ms", "10s")
    #[clap(short = 't', long, env = "BENCH_TIMEOUT", value_parser = parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// Delay between consecutive race runner launches
    #[clap(long, env = "BENCH_LAUNCH_DELAY", value_parser = parse_duration, default_value = "1ms")]
    pub launch_delay: Duration,

    /// What to do when an instance fails
    #[clap(long, value_enum, env = "BENCH_FAILURE_POLICY", default_value_t = FailurePolicy::FailFast)]
    pub failure_policy: FailurePolicy,

    /// Also write the JSON report to this file
    #[clap(short = 'o', long, env = "BENCH_OUTPUT")]
    pub output_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Which half of the benchmark this process plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Start echo servers and serve until interrupted
    #[value(name = "server")]
    Server,

    /// Race payloads against running servers and report
    #[value(name = "client")]
    Client,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Client => write!(f, "client"),
        }
    }
}

/// Handling of an instance whose race failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole run on the first failed instance
    #[value(name = "fail-fast")]
    FailFast,

    /// Drop failed instances from the sample and continue
    #[value(name = "exclude")]
    Exclude,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::Exclude => write!(f, "exclude"),
        }
    }
}

/// Resolved configuration for one process invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub mode: Mode,
    pub instance_count: usize,
    pub base_port: u16,
    pub bind_address: String,
    pub payload_size: PayloadSize,
    pub payload_dir: Option<PathBuf>,
    pub operation_timeout: Duration,
    pub launch_delay: Duration,
    pub failure_policy: FailurePolicy,
    pub output_file: Option<PathBuf>,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            mode: Mode::Client,
            instance_count: crate::defaults::INSTANCE_COUNT,
            base_port: crate::defaults::BASE_PORT,
            bind_address: crate::defaults::BIND_ADDRESS.to_string(),
            payload_size: PayloadSize::Tiny,
            payload_dir: None,
            operation_timeout: crate::defaults::OPERATION_TIMEOUT,
            launch_delay: crate::defaults::LAUNCH_DELAY,
            failure_policy: FailurePolicy::FailFast,
            output_file: None,
        }
    }
}

impl RunConfiguration {
    /// Build and validate the configuration from parsed arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            mode: args.mode,
            instance_count: args.instances,
            base_port: args.base_port,
            bind_address: args.bind_address.clone(),
            payload_size: args.payload_size,
            payload_dir: args.payload_dir.clone(),
            operation_timeout: args.timeout,
            launch_delay: args.launch_delay,
            failure_policy: args.failure_policy,
            output_file: args.output_file.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants port derivation relies on
    pub fn validate(&self) -> Result<()> {
        crate::utils::validate_instance_count(self.instance_count)?;
        crate::utils::validate_port(self.base_port)?;
        if self.bind_address.trim().is_empty() {
            bail!("Bind address cannot be empty");
        }
        if self.operation_timeout.is_zero() {
            bail!("Operation timeout must be greater than zero");
        }
        self.highest_port()?;
        Ok(())
    }

    /// Last port used by the persistent listener of the last instance
    pub fn highest_port(&self) -> Result<u16> {
        let beyond = || {
            anyhow::anyhow!(
                "{} instances starting at port {} need ports beyond 65535",
                self.instance_count,
                self.base_port
            )
        };
        let highest = self
            .instance_count
            .checked_mul(3)
            .and_then(|span| span.checked_sub(1))
            .and_then(|span| span.checked_add(self.base_port as usize))
            .ok_or_else(beyond)?;
        u16::try_from(highest).map_err(|_| beyond())
    }
}

impl std::fmt::Display for RunConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mode={} instances={} base_port={} bind_address={} payload={} timeout={:?} launch_delay={:?} failure_policy={}",
            self.mode,
            self.instance_count,
            self.base_port,
            self.bind_address,
            self.payload_size,
            self.operation_timeout,
            self.launch_delay,
            self.failure_policy
        )
    }
}

/// Parse duration from string (e.g., "500ms", "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let secs = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Duration::try_from_secs_f64(secs).map_err(|e| format!("Duration out of range: {}: {}", s, e))
}
