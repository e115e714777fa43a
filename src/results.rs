use crate::{
    benchmark::SampleSet,
    cli::RunConfiguration,
    metrics::{RunStatistics, TransportStatistics},
    transport::TransportKind,
    utils::{format_duration_list, format_duration_ms, table_row, table_separator},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Complete report of one client run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub metadata: ReportMetadata,
    pub config: RunConfiguration,
    pub sample_count: usize,
    pub excluded_instances: Vec<usize>,
    pub transports: Vec<TransportReport>,
}

/// Statistics of one transport plus its sorted durations as JSON text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportReport {
    pub transport: TransportKind,
    pub statistics: TransportStatistics,
    pub sorted_serialized: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub version: String,
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
        }
    }
}

impl BenchmarkReport {
    /// Project the statistics of a run into a report
    pub fn new(
        config: &RunConfiguration,
        samples: &SampleSet,
        statistics: &RunStatistics,
    ) -> Result<Self> {
        let transports = TransportKind::ALL
            .into_iter()
            .map(|kind| -> Result<TransportReport> {
                let stats = statistics.get(kind);
                Ok(TransportReport {
                    transport: kind,
                    sorted_serialized: serde_json::to_string(&stats.sorted_durations)?,
                    statistics: stats.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            metadata: ReportMetadata {
                version: crate::VERSION.to_string(),
                run_id: uuid::Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now(),
                system_info: SystemInfo::default(),
            },
            config: config.clone(),
            sample_count: samples.len(),
            excluded_instances: samples.excluded.clone(),
            transports,
        })
    }

    pub fn transport(&self, kind: TransportKind) -> Option<&TransportReport> {
        self.transports.iter().find(|t| t.transport == kind)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Fixed-width comparison table, one row per transport
    pub fn summary_lines(&self) -> Vec<String> {
        const HEADERS: [&str; 8] = [
            "Transport", "Mean", "Median", "Low", "High", "Std Dev", "P95", "P99",
        ];
        const WIDTHS: [usize; 8] = [13, 10, 10, 10, 10, 10, 10, 10];

        let mut lines = vec![
            table_separator(&WIDTHS),
            table_row(&HEADERS, &WIDTHS),
            table_separator(&WIDTHS),
        ];
        for report in &self.transports {
            let s = &report.statistics;
            let cells = [
                report.transport.to_string(),
                format_duration_ms(s.mean),
                format_duration_ms(s.median),
                format_duration_ms(s.low),
                format_duration_ms(s.high),
                format_duration_ms(s.std_dev),
                format_duration_ms(s.p95),
                format_duration_ms(s.p99),
            ];
            let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
            lines.push(table_row(&cells, &WIDTHS));
        }
        lines.push(table_separator(&WIDTHS));

        for report in &self.transports {
            lines.push(format!(
                "{} bottom five: {}  top five: {}",
                report.transport,
                format_duration_list(&report.statistics.bottom_five),
                format_duration_list(&report.statistics.top_five)
            ));
        }
        if !self.excluded_instances.is_empty() {
            lines.push(format!("Excluded instances: {:?}", self.excluded_instances));
        }
        lines
    }
}

/// Writes reports to stdout and optionally to a file
pub struct Reporter {
    output_file: Option<PathBuf>,
}

impl Reporter {
    pub fn new(output_file: Option<PathBuf>) -> Self {
        Self { output_file }
    }

    /// Emit the JSON report to `out`, the summary table to the log, and the
    /// JSON to the output file when one is configured
    pub fn emit<W: Write>(&self, report: &BenchmarkReport, out: &mut W) -> Result<()> {
        for line in report.summary_lines() {
            info!("{}", line);
        }

        let json = report.to_json()?;
        writeln!(out, "{}", json)?;
        out.flush()?;

        if let Some(ref path) = self.output_file {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            info!("Results written to: {:?}", path);
        }
        Ok(())
    }
}
