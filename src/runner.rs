//! High-level runner API for the example generator.
//!
//! This module wires the query client, read strategy, converter and sinks together
//! for a set of output splits. It is the primary API for the CLI and for embedding
//! the generator in other programs.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
use crate::hints::ExecutionHints;
use crate::pipeline::{ExamplePipeline, Split, SplitOutcome};
use crate::query::{ClientArgsBuilder, QueryClient, RestQueryClient};
use crate::sink::JsonLinesSink;
use crate::telemetry::{ProgressStats, TelemetryEvent};

pub use crate::telemetry::BatchPercentiles;

/// Name of the run summary written next to the split outputs
pub const SUMMARY_FILE: &str = "summary.json";

/// Arguments for one generation run
#[derive(Clone)]
pub struct GenArgs {
    // Query configuration
    pub splits: Vec<Split>,
    pub output_dir: PathBuf,

    // Execution hints
    /// Engine-style arguments (`--runner=..`, `--project=..`); explicit fields below win
    pub pipeline_args: Vec<String>,
    pub runner: Option<String>,
    pub project: Option<String>,
    pub use_legacy_source: bool,

    // Connection configuration
    pub access_token: Option<String>,
    pub endpoint: Option<String>,

    // Performance tuning
    pub batch_size: usize,
    pub concurrency: usize,

    pub cancel: CancellationToken,

    // Test-only: inject a client instead of connecting over REST
    #[cfg(test)]
    pub test_client: Option<Arc<dyn QueryClient>>,
}

impl GenArgs {
    pub fn new(splits: Vec<Split>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            splits,
            output_dir: output_dir.into(),
            pipeline_args: Vec::new(),
            runner: None,
            project: None,
            use_legacy_source: false,
            access_token: None,
            endpoint: None,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
            #[cfg(test)]
            test_client: None,
        }
    }

    /// Hints from the pipeline arguments, overridden by the explicit options
    pub fn execution_hints(&self) -> ExecutionHints {
        let mut hints = ExecutionHints::from_pipeline_args(&self.pipeline_args);
        if let Some(runner) = &self.runner {
            hints.runtime_name = runner.clone();
        }
        if let Some(project) = &self.project {
            hints.project_id = Some(project.clone());
        }
        hints.force_legacy |= self.use_legacy_source;
        hints
    }
}

/// Contents of `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub runtime_name: String,
    pub project_id: Option<String>,
    pub splits: Vec<SplitOutcome>,
}

/// Result of a completed generation run
#[derive(Debug)]
pub struct GenResult {
    pub run_id: String,
    pub splits: Vec<SplitOutcome>,
    pub records_written: u64,
    pub duration: Duration,
    pub summary_path: PathBuf,
    /// `None` when no batch was converted
    pub batch_percentiles: Option<BatchPercentiles>,
}

/// Run every split and write its records plus a run summary to `output_dir`
///
/// Splits run one after another. The first failing split aborts the run and no
/// summary is written.
///
/// # Example
///
/// ```no_run
/// use bq_example_gen::pipeline::Split;
/// use bq_example_gen::runner::{GenArgs, run_generate};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut args = GenArgs::new(
///     vec![
///         Split::new("train", "SELECT * FROM `proj.ds.table` WHERE MOD(id, 10) < 8"),
///         Split::new("eval", "SELECT * FROM `proj.ds.table` WHERE MOD(id, 10) >= 8"),
///     ],
///     "/tmp/examples",
/// );
/// args.access_token = Some(std::env::var("BQ_ACCESS_TOKEN")?);
/// args.runner = Some("DirectRunner".to_string());
///
/// let result = run_generate(args).await?;
/// println!("Wrote {} records", result.records_written);
/// # Ok(())
/// # }
/// ```
pub async fn run_generate(args: GenArgs) -> Result<GenResult> {
    validate_splits(&args.splits)?;

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start = Instant::now();
    let hints = args.execution_hints();

    info!(
        "Run {}: {} splits, runtime '{}'",
        run_id,
        args.splits.len(),
        hints.runtime_name
    );

    let client = connect(&args, &hints)?;

    let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
    let progress = spawn_progress_tracking(telemetry_rx);

    let pipeline = ExamplePipeline::new(client, &hints)?
        .with_batch_size(args.batch_size)
        .with_concurrency(args.concurrency)
        .with_cancellation(args.cancel.clone())
        .with_telemetry(telemetry_tx);

    let mut outcomes = Vec::with_capacity(args.splits.len());
    for split in &args.splits {
        let mut sink = JsonLinesSink::create(&args.output_dir, &split.name).await?;
        let outcome = pipeline.run_split(split, &mut sink).await?;
        outcomes.push(outcome);
    }

    // Closes the telemetry channel
    drop(pipeline);
    let stats = progress
        .await
        .context("Progress tracking task failed")?;

    let summary = RunSummary {
        run_id: run_id.clone(),
        started_at,
        completed_at: Utc::now(),
        runtime_name: hints.runtime_name.clone(),
        project_id: hints.project_id.clone(),
        splits: outcomes.clone(),
    };
    let summary_path = args.output_dir.join(SUMMARY_FILE);
    let json = serde_json::to_vec_pretty(&summary).context("Failed to serialize run summary")?;
    tokio::fs::write(&summary_path, json)
        .await
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    let records_written: u64 = outcomes.iter().map(|o| o.records_written).sum();
    let duration = start.elapsed();
    info!(
        "Run {} complete: {} splits, {} records in {:.2}s",
        run_id,
        outcomes.len(),
        records_written,
        duration.as_secs_f64()
    );

    Ok(GenResult {
        run_id,
        splits: outcomes,
        records_written,
        duration,
        summary_path,
        batch_percentiles: stats.batch_percentiles(),
    })
}

fn validate_splits(splits: &[Split]) -> Result<()> {
    if splits.is_empty() {
        bail!("At least one split is required");
    }
    let mut seen = HashSet::new();
    for split in splits {
        if !seen.insert(split.name.as_str()) {
            bail!("Split '{}' is given more than once", split.name);
        }
    }
    Ok(())
}

fn connect(args: &GenArgs, hints: &ExecutionHints) -> Result<Arc<dyn QueryClient>> {
    #[cfg(test)]
    if let Some(client) = &args.test_client {
        return Ok(Arc::clone(client));
    }

    let Some(token) = &args.access_token else {
        bail!("An access token is required (--access-token or BQ_ACCESS_TOKEN)");
    };

    let mut builder = ClientArgsBuilder::default();
    builder.access_token(token.as_str());
    if let Some(project) = &hints.project_id {
        builder.default_project(project.as_str());
    }
    if let Some(endpoint) = &args.endpoint {
        builder.endpoint(endpoint.as_str());
    }
    let client_args = builder.build()?;

    Ok(Arc::new(RestQueryClient::new(client_args)?))
}

/// Aggregate telemetry until every sender is dropped
fn spawn_progress_tracking(
    mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
) -> JoinHandle<ProgressStats> {
    tokio::spawn(async move {
        let mut stats = ProgressStats::new();

        while let Some(event) = telemetry_rx.recv().await {
            stats.update(&event);

            if let TelemetryEvent::SplitCompleted { .. } = event {
                if let Some(pct) = stats.batch_percentiles() {
                    info!(
                        "Progress: {}/{} splits, {} records converted, {} written | batch time {}",
                        stats.splits_completed,
                        stats.splits_started,
                        stats.records_converted,
                        stats.records_written,
                        pct
                    );
                }
            }
        }

        stats
    })
}
