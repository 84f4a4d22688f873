//! Paged read: each page is requested only when the consumer has drained the previous one.

use async_stream::try_stream;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::debug;

use crate::config::STREAMING_PAGE_SIZE;
use crate::convert::Row;
use crate::error::{Error, Result};
use crate::query::{QueryClient, QueryRequest};

pub(crate) fn read_pages(
    client: Arc<dyn QueryClient>,
    query: String,
    project_id: Option<String>,
) -> BoxStream<'static, Result<Row>> {
    let request = QueryRequest {
        query,
        project_id,
        max_results: Some(STREAMING_PAGE_SIZE),
    };

    Box::pin(try_stream! {
        let mut page = client.execute(&request).await.map_err(Error::read)?;
        let job = page.job.clone();
        let mut pages = 1;

        loop {
            let next_token = page.page_token.take();
            for row in std::mem::take(&mut page.rows) {
                yield row;
            }

            let Some(token) = next_token else {
                break;
            };
            page = client
                .next_page(&job, &token, Some(STREAMING_PAGE_SIZE))
                .await
                .map_err(Error::read)?;
            pages += 1;
        }

        debug!("Paged read of job {} finished after {} pages", job.job_id, pages);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::memory::{InMemoryQueryClient, row};
    use futures::{StreamExt, TryStreamExt};

    fn rows(n: i64) -> Vec<Row> {
        (0..n).map(|i| row(vec![("id", i)])).collect()
    }

    #[tokio::test]
    async fn test_paged_read_returns_every_row_in_order() {
        let client = Arc::new(InMemoryQueryClient::new(&[("id", "INTEGER")], rows(4)));
        let got: Vec<Row> = read_pages(client, "SELECT id FROM t".to_string(), None)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(got, rows(4));
    }

    #[tokio::test]
    async fn test_paged_read_empty_result() {
        let client = Arc::new(InMemoryQueryClient::new(&[("id", "INTEGER")], Vec::new()));
        let got: Vec<Row> = read_pages(client.clone(), "SELECT 1".to_string(), None)
            .try_collect()
            .await
            .unwrap();
        assert!(got.is_empty());
        assert_eq!(client.pages_served(), 1);
    }

    #[tokio::test]
    async fn test_paged_read_mid_stream_failure() {
        // More rows than one page holds, so a second page is requested
        let total = STREAMING_PAGE_SIZE as i64 + 2;
        let client = Arc::new(
            InMemoryQueryClient::new(&[("id", "INTEGER")], rows(total)).failing_pages(),
        );
        let mut stream = read_pages(client, "SELECT id FROM t".to_string(), None);

        let mut ok = 0;
        let err = loop {
            match stream.next().await {
                Some(Ok(_)) => ok += 1,
                Some(Err(e)) => break e,
                None => panic!("stream ended without reporting the page failure"),
            }
        };
        assert_eq!(ok, STREAMING_PAGE_SIZE as usize);
        assert!(matches!(err, Error::Read { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_paged_read_fetches_on_demand() {
        let total = STREAMING_PAGE_SIZE as i64 * 2 + 1;
        let client = Arc::new(InMemoryQueryClient::new(&[("id", "INTEGER")], rows(total)));
        let mut stream = read_pages(client.clone(), "SELECT id FROM t".to_string(), None);

        stream.next().await.unwrap().unwrap();
        assert_eq!(client.pages_served(), 1);

        let rest: Vec<Row> = stream.try_collect().await.unwrap();
        assert_eq!(rest.len(), total as usize - 1);
        assert_eq!(client.pages_served(), 3);
    }
}
