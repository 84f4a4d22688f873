//! Drives one query per output split through probe, read, convert and sink.

use anyhow::{Context, Result, anyhow, bail};
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
use crate::convert::{Converter, Record, Row};
use crate::error::Error;
use crate::hints::ExecutionHints;
use crate::query::QueryClient;
use crate::sink::RecordSink;
use crate::source::{SourceAdapter, StrategyKind};
use crate::telemetry::TelemetryEvent;

/// A named output split and the query that produces it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Split {
    pub name: String,
    pub query: String,
}

impl Split {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

impl FromStr for Split {
    type Err = anyhow::Error;

    /// Parse `NAME=QUERY`
    fn from_str(s: &str) -> Result<Self> {
        let (name, query) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Split must be NAME=QUERY, got '{}'", s))?;
        let name = name.trim();
        let query = query.trim();

        if name.is_empty() {
            bail!("Split name must not be empty");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!(
                "Split name '{}' may only contain letters, digits, '_' and '-'",
                name
            );
        }
        if query.is_empty() {
            bail!("Query for split '{}' must not be empty", name);
        }

        Ok(Self::new(name, query))
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What one split produced
#[derive(Debug, Clone, Serialize)]
pub struct SplitOutcome {
    pub split: String,
    pub requested_strategy: StrategyKind,
    pub strategy: StrategyKind,
    pub columns: usize,
    pub records_written: u64,
    pub duration_ms: u64,
}

/// Converted batch plus how long conversion took
struct BatchResult {
    records: Vec<Record>,
    duration_ms: u64,
}

/// Runs splits against one query client with one resolved read strategy.
pub struct ExamplePipeline {
    client: Arc<dyn QueryClient>,
    adapter: SourceAdapter,
    project_id: Option<String>,
    batch_size: usize,
    concurrency: usize,
    cancel: CancellationToken,
    telemetry_tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl ExamplePipeline {
    /// Select and resolve the read strategy for `hints`. Fails if neither strategy is
    /// available to this client.
    pub fn new(client: Arc<dyn QueryClient>, hints: &ExecutionHints) -> Result<Self> {
        let adapter = SourceAdapter::new(Arc::clone(&client), hints)?;
        Ok(Self {
            client,
            adapter,
            project_id: hints.project_id.clone(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
            telemetry_tx: None,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn with_telemetry(mut self, tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        self.telemetry_tx = Some(tx);
        self
    }

    pub fn strategy(&self) -> StrategyKind {
        self.adapter.strategy()
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(tx) = &self.telemetry_tx {
            let _ = tx.send(event);
        }
    }

    /// Probe the split's schema, stream its rows, convert them in concurrent batches and
    /// hand the records to `sink`.
    ///
    /// The first failing batch fails the whole split. Records reach the sink in batch
    /// completion order, not row order.
    pub async fn run_split(&self, split: &Split, sink: &mut dyn RecordSink) -> Result<SplitOutcome> {
        let start = Instant::now();
        info!("Starting split '{}'", split.name);

        let converter = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled.into()),
            converter = Converter::for_query(
                self.client.as_ref(),
                &split.query,
                self.project_id.as_deref(),
            ) => converter.with_context(|| format!("Failed to build converter for split '{}'", split.name))?,
        };

        let rows = self
            .adapter
            .open_row_stream(&split.query, self.cancel.child_token())?;
        self.emit(TelemetryEvent::SplitStarted);

        let mut chunks = rows.chunks(self.batch_size);
        let mut join_set: JoinSet<crate::error::Result<BatchResult>> = JoinSet::new();

        while let Some(chunk) = chunks.next().await {
            let batch = chunk
                .into_iter()
                .collect::<crate::error::Result<Vec<Row>>>()
                .with_context(|| format!("Failed to read rows for split '{}'", split.name))?;

            // Wait if we've reached concurrency limit
            while join_set.len() >= self.concurrency {
                if let Some(result) = join_set.join_next().await {
                    self.write_result(result, split, sink).await?;
                }
            }

            let converter = converter.clone();
            join_set.spawn(async move { convert_batch(&converter, &batch) });
        }

        if self.cancel.is_cancelled() {
            info!("Split '{}' cancelled", split.name);
            return Err(Error::Cancelled.into());
        }

        // Wait for remaining tasks
        while let Some(result) = join_set.join_next().await {
            self.write_result(result, split, sink).await?;
        }

        let records_written = sink
            .finish()
            .await
            .with_context(|| format!("Failed to finish output for split '{}'", split.name))?;
        self.emit(TelemetryEvent::SplitCompleted { records_written });

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Split '{}' complete: {} records in {}ms",
            split.name, records_written, duration_ms
        );

        Ok(SplitOutcome {
            split: split.name.clone(),
            requested_strategy: self.adapter.requested(),
            strategy: self.adapter.strategy(),
            columns: converter.schema().len(),
            records_written,
            duration_ms,
        })
    }

    async fn write_result(
        &self,
        result: std::result::Result<crate::error::Result<BatchResult>, tokio::task::JoinError>,
        split: &Split,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        let batch = result
            .map_err(|e| anyhow!("Task panicked: {}", e))?
            .with_context(|| format!("Failed to convert rows for split '{}'", split.name))?;

        self.emit(TelemetryEvent::BatchConverted {
            records: batch.records.len() as u64,
            duration_ms: batch.duration_ms,
        });
        debug!(
            "Converted {} records for split '{}' in {}ms",
            batch.records.len(),
            split.name,
            batch.duration_ms
        );

        sink.write_batch(&batch.records)
            .await
            .with_context(|| format!("Failed to write records for split '{}'", split.name))
    }
}

fn convert_batch(converter: &Converter, rows: &[Row]) -> crate::error::Result<BatchResult> {
    let start = Instant::now();
    let records = rows
        .iter()
        .map(|row| converter.convert(row))
        .collect::<crate::error::Result<Vec<Record>>>()?;
    Ok(BatchResult {
        records,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
