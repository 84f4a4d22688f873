//! Destinations for converted records

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::convert::Record;

/// Receives the records of one split
#[async_trait]
pub trait RecordSink: Send {
    async fn write_batch(&mut self, records: &[Record]) -> Result<()>;

    /// Flush everything written so far and return the number of records written
    async fn finish(&mut self) -> Result<u64>;
}

/// Writes one JSON object per record to `<dir>/<split>.jsonl`
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl JsonLinesSink {
    pub async fn create(dir: &Path, split: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let path = dir.join(format!("{}.jsonl", split));
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).context("Failed to serialize record")?;
            buf.push(b'\n');
        }

        self.writer
            .write_all(&buf)
            .await
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        self.written += records.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64> {
        self.writer
            .flush()
            .await
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(self.written)
    }
}

/// Collects records in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    pub records: Vec<Record>,
    pub finished: bool,
}

#[cfg(test)]
#[async_trait]
impl RecordSink for MemorySink {
    async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        self.records.extend_from_slice(records);
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64> {
        self.finished = true;
        Ok(self.records.len() as u64)
    }
}
