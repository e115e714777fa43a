use crate::benchmark::SampleSet;
use crate::transport::TransportKind;
use anyhow::{bail, Result};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Number of samples kept in each tail slice
pub const TAIL_LEN: usize = 5;

/// Monotonic clock for timing a single request/response cycle
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start timing now
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in fractional milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

/// Descriptive statistics for one transport's durations, all in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportStatistics {
    pub sorted_durations: Vec<f64>,
    pub mean: f64,
    /// Element at index `n / 2` of the sorted sequence (upper middle for even `n`)
    pub median: f64,
    pub high: f64,
    pub low: f64,
    /// Population variance
    pub variance: f64,
    pub std_dev: f64,
    pub top_five: Vec<f64>,
    pub bottom_five: Vec<f64>,
    /// Tail percentiles from an HDR histogram at microsecond resolution
    pub p95: f64,
    pub p99: f64,
}

impl TransportStatistics {
    /// Compute statistics over `durations` (milliseconds, any order)
    pub fn from_durations(durations: &[f64]) -> Result<Self> {
        if durations.is_empty() {
            bail!("Cannot compute statistics over an empty sample");
        }
        if let Some(bad) = durations.iter().find(|d| !d.is_finite() || **d < 0.0) {
            bail!("Invalid duration in sample: {}", bad);
        }

        let sorted = sort_ascending(durations);
        let low = sorted[0];
        let high = sorted[sorted.len() - 1];
        // Summation error must not push the mean outside the observed range
        let mean = mean(&sorted).clamp(low, high);
        let variance = if low == high {
            0.0
        } else {
            population_variance(&sorted, mean)
        };
        let (p95, p99) = tail_percentiles(&sorted)?;

        Ok(Self {
            mean,
            median: median(&sorted),
            high,
            low,
            variance,
            std_dev: variance.sqrt(),
            top_five: top_five(&sorted),
            bottom_five: bottom_five(&sorted),
            p95: p95.clamp(low, high),
            p99: p99.clamp(low, high),
            sorted_durations: sorted,
        })
    }
}

/// Statistics for all three transports of a run, computed independently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub fast: TransportStatistics,
    pub request_reply: TransportStatistics,
    pub persistent: TransportStatistics,
}

impl RunStatistics {
    /// Split the sample set by transport and summarize each column
    pub fn from_samples(samples: &SampleSet) -> Result<Self> {
        if samples.is_empty() {
            bail!("No successful samples to analyze");
        }
        Ok(Self {
            fast: TransportStatistics::from_durations(&samples.column(TransportKind::Fast))?,
            request_reply: TransportStatistics::from_durations(
                &samples.column(TransportKind::RequestReply),
            )?,
            persistent: TransportStatistics::from_durations(
                &samples.column(TransportKind::Persistent),
            )?,
        })
    }

    pub fn get(&self, kind: TransportKind) -> &TransportStatistics {
        match kind {
            TransportKind::Fast => &self.fast,
            TransportKind::RequestReply => &self.request_reply,
            TransportKind::Persistent => &self.persistent,
        }
    }
}

/// Stable ascending sort
pub fn sort_ascending(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Upper-middle median of an already sorted slice
pub fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[sorted.len() / 2]
}

/// Mean of squared deviations from `mean`
pub fn population_variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Last `TAIL_LEN` elements of a sorted slice
pub fn top_five(sorted: &[f64]) -> Vec<f64> {
    sorted[sorted.len().saturating_sub(TAIL_LEN)..].to_vec()
}

/// First `TAIL_LEN` elements of a sorted slice
pub fn bottom_five(sorted: &[f64]) -> Vec<f64> {
    sorted[..sorted.len().min(TAIL_LEN)].to_vec()
}

/// P95 and P99 in milliseconds, recorded at microsecond resolution
fn tail_percentiles(sorted: &[f64]) -> Result<(f64, f64)> {
    let mut histogram = Histogram::<u64>::new(3)?;
    for &ms in sorted {
        histogram.record((ms * 1000.0).round() as u64)?;
    }
    Ok((
        histogram.value_at_quantile(0.95) as f64 / 1000.0,
        histogram.value_at_quantile(0.99) as f64 / 1000.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::TimingTriple;

    /// Small deterministic generator so property checks need no extra crates
    fn lcg_samples(seed: u64, n: usize) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) % 100_000) as f64 / 100.0
            })
            .collect()
    }

    #[test]
    fn test_stopwatch_measures_elapsed_time() {
        let clock = Stopwatch::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.elapsed_ms() >= 5.0);
    }

    #[test]
    fn test_median_uses_upper_middle_for_even_counts() {
        let stats = TransportStatistics::from_durations(&[40.0, 10.0, 30.0, 20.0]).unwrap();
        assert_eq!(stats.sorted_durations, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(stats.median, 30.0);
        assert_eq!(stats.mean, 25.0);
        assert_eq!(stats.low, 10.0);
        assert_eq!(stats.high, 40.0);
        assert_eq!(stats.variance, 125.0);
        assert!((stats.std_dev - 125.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_is_trivial() {
        let stats = TransportStatistics::from_durations(&[3.7]).unwrap();
        assert_eq!(stats.mean, 3.7);
        assert_eq!(stats.median, 3.7);
        assert_eq!(stats.high, 3.7);
        assert_eq!(stats.low, 3.7);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.top_five, vec![3.7]);
        assert_eq!(stats.bottom_five, vec![3.7]);
    }

    #[test]
    fn test_equal_samples_have_zero_std_dev() {
        let stats = TransportStatistics::from_durations(&[0.1; 7]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.mean, 0.1);

        let spread = TransportStatistics::from_durations(&[0.1, 0.1, 0.2]).unwrap();
        assert!(spread.std_dev > 0.0);
    }

    #[test]
    fn test_tails() {
        let values: Vec<f64> = (1..=12).rev().map(|v| v as f64).collect();
        let stats = TransportStatistics::from_durations(&values).unwrap();
        assert_eq!(stats.bottom_five, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(stats.top_five, vec![8.0, 9.0, 10.0, 11.0, 12.0]);

        let few = TransportStatistics::from_durations(&[2.0, 1.0, 3.0]).unwrap();
        assert_eq!(few.bottom_five, vec![1.0, 2.0, 3.0]);
        assert_eq!(few.top_five, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_statistics_invariants_hold_for_many_samples() {
        for (seed, n) in [(1u64, 1usize), (7, 2), (42, 5), (99, 17), (1234, 250)] {
            let values = lcg_samples(seed, n);
            let stats = TransportStatistics::from_durations(&values).unwrap();
            let sorted = &stats.sorted_durations;

            assert_eq!(sorted.len(), n);
            assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
            let mut expected = values.clone();
            expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(sorted, &expected);

            assert_eq!(stats.low, sorted[0]);
            assert_eq!(stats.high, sorted[n - 1]);
            assert_eq!(stats.median, sorted[n / 2]);
            assert!(stats.low <= stats.median && stats.median <= stats.high);
            assert!(stats.low <= stats.mean && stats.mean <= stats.high);
            assert!(stats.low <= stats.p95 && stats.p95 <= stats.p99 && stats.p99 <= stats.high);
            assert!(stats.std_dev >= 0.0);
            assert_eq!(stats.top_five.len(), n.min(TAIL_LEN));
            assert_eq!(stats.bottom_five.len(), n.min(TAIL_LEN));
        }
    }

    #[test]
    fn test_rejects_empty_and_invalid_samples() {
        assert!(TransportStatistics::from_durations(&[]).is_err());
        assert!(TransportStatistics::from_durations(&[1.0, f64::NAN]).is_err());
        assert!(TransportStatistics::from_durations(&[-1.0]).is_err());
    }

    #[test]
    fn test_run_statistics_are_per_transport() {
        let samples = SampleSet::from_samples(vec![
            TimingTriple::new(1.0, 10.0, 100.0),
            TimingTriple::new(3.0, 30.0, 300.0),
            TimingTriple::new(2.0, 20.0, 200.0),
        ]);
        let stats = RunStatistics::from_samples(&samples).unwrap();

        assert_eq!(stats.fast.sorted_durations, vec![1.0, 2.0, 3.0]);
        assert_eq!(stats.request_reply.median, 20.0);
        assert_eq!(stats.persistent.high, 300.0);
        assert_eq!(stats.get(TransportKind::Persistent).low, 100.0);
    }

    #[test]
    fn test_run_statistics_rejects_empty_sample_set() {
        assert!(RunStatistics::from_samples(&SampleSet::default()).is_err());
    }
}
