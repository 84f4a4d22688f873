//! Bulk read: the whole result set is fetched in one go, then replayed.

use anyhow::Context;
use async_stream::try_stream;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::debug;

use crate::config::BULK_PAGE_SIZE;
use crate::convert::Row;
use crate::error::{Error, Result};
use crate::query::{QueryClient, QueryRequest};

pub(crate) fn read_bulk(
    client: Arc<dyn QueryClient>,
    query: String,
    project_id: Option<String>,
) -> BoxStream<'static, Result<Row>> {
    let request = QueryRequest {
        query,
        project_id,
        max_results: Some(BULK_PAGE_SIZE),
    };

    Box::pin(try_stream! {
        let rows = fetch_all(client.as_ref(), &request)
            .await
            .map_err(Error::read)?;
        for row in rows {
            yield row;
        }
    })
}

async fn fetch_all(client: &dyn QueryClient, request: &QueryRequest) -> anyhow::Result<Vec<Row>> {
    let mut page = client.execute(request).await?;
    let job = page.job.clone();
    let mut rows = std::mem::take(&mut page.rows);
    let mut pages = 1;

    while let Some(token) = page.page_token.take() {
        page = client
            .next_page(&job, &token, Some(BULK_PAGE_SIZE))
            .await
            .with_context(|| format!("failed to fetch page {} of job {}", pages + 1, job.job_id))?;
        rows.append(&mut page.rows);
        pages += 1;
    }

    debug!("Bulk read of job {} returned {} rows in {} pages", job.job_id, rows.len(), pages);
    Ok(rows)
}
