use std::fmt;

/// Telemetry events sent from split pipelines to the runner for progress tracking
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A split's schema was probed and its row stream opened
    SplitStarted,
    /// A batch of rows was converted into records
    BatchConverted { records: u64, duration_ms: u64 },
    /// Every record of a split reached the sink
    SplitCompleted { records_written: u64 },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub splits_started: usize,
    pub splits_completed: usize,
    pub records_converted: u64,
    pub records_written: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::SplitStarted => {
                self.splits_started += 1;
            }
            TelemetryEvent::BatchConverted {
                records,
                duration_ms,
            } => {
                self.records_converted += records;
                self.batch_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::SplitCompleted { records_written } => {
                self.splits_completed += 1;
                self.records_written += records_written;
            }
        }
    }

    /// Nearest-rank p50 / p90 / p99 over every converted batch, `None` before the first one
    pub fn batch_percentiles(&self) -> Option<BatchPercentiles> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }
        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        Some(BatchPercentiles {
            p50: nearest_rank(&sorted, 50),
            p90: nearest_rank(&sorted, 90),
            p99: nearest_rank(&sorted, 99),
        })
    }
}

/// Batch conversion time in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

impl fmt::Display for BatchPercentiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p50 {}ms, p90 {}ms, p99 {}ms", self.p50, self.p90, self.p99)
    }
}

/// Smallest value with at least `pct` percent of `sorted` at or below it
fn nearest_rank(sorted: &[u64], pct: usize) -> u64 {
    let rank = (pct * sorted.len()).div_ceil(100).clamp(1, sorted.len());
    sorted[rank - 1]
}
