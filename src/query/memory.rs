//! In-memory query client used by unit and integration tests.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::client::{
    Capabilities, FieldSchema, JobReference, QueryClient, QueryRequest, ResultPage,
};
use crate::convert::{Row, Value};

/// Serves a fixed result set for any query, paging it like the real service
pub struct InMemoryQueryClient {
    fields: Vec<FieldSchema>,
    rows: Vec<Row>,
    capabilities: Capabilities,
    fail_execute: bool,
    fail_pages: bool,
    page_limit: Option<usize>,
    stall_pages: Option<Arc<Notify>>,
    requests: Mutex<Vec<QueryRequest>>,
    pages_served: AtomicUsize,
}

impl InMemoryQueryClient {
    pub fn new(fields: &[(&str, &str)], rows: Vec<Row>) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(name, ty)| FieldSchema {
                    name: name.to_string(),
                    field_type: ty.to_string(),
                })
                .collect(),
            rows,
            capabilities: Capabilities::all(),
            fail_execute: false,
            fail_pages: false,
            page_limit: None,
            stall_pages: None,
            requests: Mutex::new(Vec::new()),
            pages_served: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every `execute` call fails, as an unreachable service would
    pub fn failing(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    /// The first page is served, every later page request fails
    pub fn failing_pages(mut self) -> Self {
        self.fail_pages = true;
        self
    }

    /// Cap every page at `limit` rows, whatever the caller asks for
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    /// The first page is served, every later page request signals `started` and then
    /// never completes
    pub fn stalling_pages(mut self, started: Arc<Notify>) -> Self {
        self.stall_pages = Some(started);
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    fn page(&self, offset: usize, max_results: Option<u32>) -> ResultPage {
        let limit = max_results.map_or(self.rows.len(), |m| m as usize);
        let limit = self.page_limit.map_or(limit, |cap| limit.min(cap));
        let end = (offset + limit).min(self.rows.len());
        let rows = self.rows[offset.min(end)..end].to_vec();
        let page_token = (end < self.rows.len() && limit > 0).then(|| end.to_string());
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        ResultPage {
            job: JobReference {
                project_id: "test-project".to_string(),
                job_id: "job-1".to_string(),
                location: None,
            },
            fields: self.fields.clone(),
            rows,
            page_token,
            total_rows: Some(self.rows.len() as u64),
        }
    }
}

#[async_trait]
impl QueryClient for InMemoryQueryClient {
    async fn execute(&self, request: &QueryRequest) -> Result<ResultPage> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_execute {
            bail!("connection refused");
        }
        Ok(self.page(0, request.max_results))
    }

    async fn next_page(
        &self,
        _job: &JobReference,
        page_token: &str,
        max_results: Option<u32>,
    ) -> Result<ResultPage> {
        if self.fail_pages {
            bail!("page fetch failed");
        }
        if let Some(started) = &self.stall_pages {
            started.notify_one();
            std::future::pending::<()>().await;
        }
        let offset: usize = page_token
            .parse()
            .map_err(|_| anyhow!("bad page token {}", page_token))?;
        Ok(self.page(offset, max_results))
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Build a row from (column, value) pairs
pub fn row<V: Into<Value>>(values: Vec<(&str, V)>) -> Row {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.into()))
        .collect()
}
