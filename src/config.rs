//! Configuration constants for the example generator
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Query Service Configuration
// ============================================================================

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2/";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single HTTP request to the query service
///
/// Each `jobs.query` / `getQueryResults` call is itself bounded by
/// `SERVER_WAIT_TIMEOUT`, so this only has to cover that wait plus transfer time.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How long the service may hold a request open waiting for the job to finish
pub const SERVER_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum number of times to poll an unfinished query job
pub const MAX_JOB_POLLS: u32 = 60;

// ============================================================================
// Read Strategy Configuration
// ============================================================================

/// Runtime names that select the bulk (legacy) read strategy
pub const BULK_READ_RUNTIMES: &[&str] = &["dataflow", "DataflowRunner"];

/// Rows per page requested by the streaming strategy
pub const STREAMING_PAGE_SIZE: u32 = 10_000;

/// Rows per page requested by the bulk strategy while it drains the result set
pub const BULK_PAGE_SIZE: u32 = 100_000;

// ============================================================================
// Conversion Configuration
// ============================================================================

pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub const DEFAULT_CONCURRENCY: usize = 8;
