use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::convert::Row;

/// A query to run against the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    /// Project to bill and run the job under; the client's default when unset
    pub project_id: Option<String>,
    /// Upper bound on rows in the first page; `Some(0)` asks for metadata only
    pub max_results: Option<u32>,
}

/// Name and reported type of one result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Identifies a query job whose results can be paged through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One page of query results
#[derive(Debug, Clone)]
pub struct ResultPage {
    pub job: JobReference,
    pub fields: Vec<FieldSchema>,
    pub rows: Vec<Row>,
    /// Token for the next page, `None` on the last page
    pub page_token: Option<String>,
    pub total_rows: Option<u64>,
}

/// Read modes a client can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Can return a complete result set in one bulk read
    pub bulk_read: bool,
    /// Can hand out result pages on demand
    pub paged_read: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            bulk_read: true,
            paged_read: true,
        }
    }
}

/// Abstraction over the remote query service.
///
/// The probe query, both read strategies, and the tests all go through this trait, so
/// the transport can be swapped without touching conversion or source selection.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Run a query and return its first page of results, waiting for the job to finish
    async fn execute(&self, request: &QueryRequest) -> Result<ResultPage>;

    /// Fetch the page identified by `page_token` from a finished job
    async fn next_page(
        &self,
        job: &JobReference,
        page_token: &str,
        max_results: Option<u32>,
    ) -> Result<ResultPage>;

    /// Read modes this client supports
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }
}
