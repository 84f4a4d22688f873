//! Query client for the BigQuery v2 REST API.
//!
//! Queries run through `jobs.query` with standard SQL. When the service answers before
//! the job has finished we poll `jobs.getQueryResults` until it has; later pages are
//! fetched from the same endpoint with a page token. Cell values arrive as strings in
//! the `{"f": [{"v": ...}]}` row layout and are decoded here using the column types
//! the service reports alongside them.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::client::{FieldSchema, JobReference, QueryClient, QueryRequest, ResultPage};
use crate::config::{
    CONNECT_TIMEOUT, DEFAULT_ENDPOINT, MAX_JOB_POLLS, REQUEST_TIMEOUT, SERVER_WAIT_TIMEOUT,
};
use crate::convert::{ColumnType, Row, Value};

#[derive(Builder)]
pub struct ClientArgs {
    #[builder(setter(into))]
    access_token: String,
    /// Project used when a request does not name one
    #[builder(setter(into, strip_option), default)]
    default_project: Option<String>,
    #[builder(setter(into), default = "DEFAULT_ENDPOINT.to_string()")]
    endpoint: String,
}

/// [`QueryClient`] backed by the BigQuery REST API
pub struct RestQueryClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    default_project: Option<String>,
}

impl RestQueryClient {
    pub fn new(args: ClientArgs) -> Result<Self> {
        let ClientArgs {
            access_token,
            default_project,
            endpoint,
        } = args;

        let base_url = parse_endpoint(&endpoint)?;

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            access_token,
            default_project,
        })
    }

    fn project<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        requested
            .or(self.default_project.as_deref())
            .ok_or_else(|| anyhow!("No project id given and the client has no default project"))
    }

    async fn get_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<QueryResponse> {
        let url = self.base_url.join(&format!(
            "projects/{}/queries/{}",
            job.project_id, job.job_id
        ))?;

        let mut params = vec![(
            "timeoutMs",
            SERVER_WAIT_TIMEOUT.as_millis().to_string(),
        )];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        if let Some(max) = max_results {
            params.push(("maxResults", max.to_string()));
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await
            .context("Failed to send getQueryResults request")?;

        read_response(response).await
    }
}

#[async_trait]
impl QueryClient for RestQueryClient {
    async fn execute(&self, request: &QueryRequest) -> Result<ResultPage> {
        let project = self.project(request.project_id.as_deref())?;
        let url = self.base_url.join(&format!("projects/{}/queries", project))?;

        let body = QueryBody {
            query: &request.query,
            use_legacy_sql: false,
            max_results: request.max_results,
            timeout_ms: SERVER_WAIT_TIMEOUT.as_millis() as u64,
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("Failed to send jobs.query request")?;

        let mut result = read_response(response).await?;

        let mut polls = 0;
        while !result.job_complete {
            polls += 1;
            if polls > MAX_JOB_POLLS {
                bail!(
                    "Query job {} did not complete after {} polls",
                    result.job_reference.job_id,
                    MAX_JOB_POLLS
                );
            }
            debug!(
                "Job {} still running, polling ({}/{})",
                result.job_reference.job_id, polls, MAX_JOB_POLLS
            );
            let job = result.job_reference.clone();
            result = self.get_results(&job, None, request.max_results).await?;
        }

        result.into_page()
    }

    async fn next_page(
        &self,
        job: &JobReference,
        page_token: &str,
        max_results: Option<u32>,
    ) -> Result<ResultPage> {
        self.get_results(job, Some(page_token), max_results)
            .await?
            .into_page()
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    // Url::join replaces the last path segment unless the base ends with '/'
    let normalized = if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{}/", endpoint)
    };

    let url = Url::parse(&normalized)
        .with_context(|| format!("Invalid query service endpoint: {}", endpoint))?;

    match url.scheme() {
        "https" | "http" => Ok(url),
        scheme => Err(anyhow!("Unsupported endpoint scheme: {}", scheme)),
    }
}

async fn read_response(response: reqwest::Response) -> Result<QueryResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        bail!("Query service returned {}: {}", status, message);
    }

    response
        .json::<QueryResponse>()
        .await
        .context("Failed to decode query service response")
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: JobReference,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    total_rows: Option<String>,
    #[serde(default)]
    job_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl QueryResponse {
    fn into_page(self) -> Result<ResultPage> {
        let fields = self.schema.unwrap_or_default().fields;
        let rows = decode_rows(&fields, self.rows)?;
        let total_rows = self
            .total_rows
            .map(|n| n.parse::<u64>())
            .transpose()
            .context("Invalid totalRows in query response")?;

        Ok(ResultPage {
            job: self.job_reference,
            fields,
            rows,
            page_token: self.page_token,
            total_rows,
        })
    }
}

fn decode_rows(fields: &[FieldSchema], rows: Vec<TableRow>) -> Result<Vec<Row>> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| -> Result<Row> {
            if row.f.len() != fields.len() {
                bail!(
                    "Row {} has {} cells but the schema has {} fields",
                    idx,
                    row.f.len(),
                    fields.len()
                );
            }
            fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| {
                    let value = decode_cell(&field.field_type, cell.v).with_context(|| {
                        format!("Failed to decode column '{}' in row {}", field.name, idx)
                    })?;
                    Ok::<_, anyhow::Error>((field.name.clone(), value))
                })
                .collect::<Result<Row>>()
        })
        .collect()
}

/// Decode one wire cell. Columns outside the supported types are passed through as
/// their raw text so the converter can report them.
fn decode_cell(field_type: &str, raw: serde_json::Value) -> Result<Value> {
    let text = match raw {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::String(s) => s,
        other => return Ok(Value::String(other.to_string())),
    };

    let value = match ColumnType::parse(field_type) {
        Some(ColumnType::Integer) => Value::Int(
            text.parse()
                .with_context(|| format!("Invalid integer '{}'", text))?,
        ),
        Some(ColumnType::Float) => Value::Float(
            text.parse()
                .with_context(|| format!("Invalid float '{}'", text))?,
        ),
        Some(ColumnType::Boolean) => match text.to_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => bail!("Invalid boolean '{}'", text),
        },
        Some(ColumnType::String) | None => Value::String(text),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE_RESPONSE: &str = r#"{
        "kind": "bigquery#queryResponse",
        "schema": {
            "fields": [
                {"name": "id", "type": "INTEGER", "mode": "NULLABLE"},
                {"name": "name", "type": "STRING", "mode": "NULLABLE"},
                {"name": "score", "type": "FLOAT", "mode": "NULLABLE"},
                {"name": "active", "type": "BOOLEAN", "mode": "NULLABLE"}
            ]
        },
        "jobReference": {"projectId": "proj", "jobId": "job_123", "location": "US"},
        "totalRows": "2",
        "pageToken": "next-page",
        "rows": [
            {"f": [{"v": "7"}, {"v": "a"}, {"v": "3.5"}, {"v": "true"}]},
            {"f": [{"v": "8"}, {"v": null}, {"v": "1E2"}, {"v": "false"}]}
        ],
        "jobComplete": true,
        "cacheHit": false
    }"#;

    #[test]
    fn test_decode_query_response() {
        let response: QueryResponse = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        let page = response.into_page().unwrap();

        assert_eq!(page.job.job_id, "job_123");
        assert_eq!(page.job.location.as_deref(), Some("US"));
        assert_eq!(page.fields.len(), 4);
        assert_eq!(page.fields[3].field_type, "BOOLEAN");
        assert_eq!(page.total_rows, Some(2));
        assert_eq!(page.page_token.as_deref(), Some("next-page"));

        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0]["id"], Value::Int(7));
        assert_eq!(page.rows[0]["name"], Value::String("a".to_string()));
        assert_eq!(page.rows[0]["score"], Value::Float(3.5));
        assert_eq!(page.rows[0]["active"], Value::Bool(true));
        assert_eq!(page.rows[1]["name"], Value::Null);
        assert_eq!(page.rows[1]["score"], Value::Float(100.0));
        assert_eq!(page.rows[1]["active"], Value::Bool(false));
    }

    #[test]
    fn test_probe_response_without_rows() {
        let body = r#"{
            "schema": {"fields": [{"name": "area", "type": "GEOGRAPHY"}]},
            "jobReference": {"projectId": "proj", "jobId": "probe"},
            "totalRows": "0",
            "jobComplete": true
        }"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();
        let page = response.into_page().unwrap();

        assert!(page.rows.is_empty());
        assert_eq!(page.fields[0].field_type, "GEOGRAPHY");
        assert!(page.page_token.is_none());
    }

    #[test]
    fn test_unfinished_job_has_no_schema() {
        let body = r#"{"jobReference": {"projectId": "p", "jobId": "j"}, "jobComplete": false}"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();
        assert!(!response.job_complete);
        assert!(response.schema.is_none());
    }

    #[test]
    fn test_decode_cells() {
        let test_cases = [
            ("INTEGER", json!("-42"), Value::Int(-42)),
            ("INT64", json!("9007199254740993"), Value::Int(9007199254740993)),
            ("FLOAT", json!("2.5"), Value::Float(2.5)),
            ("BOOLEAN", json!("TRUE"), Value::Bool(true)),
            ("STRING", json!("hi"), Value::String("hi".to_string())),
            ("STRING", json!(null), Value::Null),
            ("GEOGRAPHY", json!("POINT(1 2)"), Value::String("POINT(1 2)".to_string())),
        ];

        for (field_type, raw, expected) in test_cases {
            assert_eq!(
                decode_cell(field_type, raw.clone()).unwrap(),
                expected,
                "type {} raw {}",
                field_type,
                raw
            );
        }
    }

    #[test]
    fn test_decode_cell_rejects_malformed_numbers() {
        assert!(decode_cell("INTEGER", json!("seven")).is_err());
        assert!(decode_cell("FLOAT", json!("")).is_err());
        assert!(decode_cell("BOOLEAN", json!("yes")).is_err());
    }

    #[test]
    fn test_decode_rows_rejects_short_row() {
        let fields = vec![
            FieldSchema {
                name: "a".to_string(),
                field_type: "INTEGER".to_string(),
            },
            FieldSchema {
                name: "b".to_string(),
                field_type: "INTEGER".to_string(),
            },
        ];
        let rows = vec![TableRow {
            f: vec![TableCell { v: json!("1") }],
        }];
        assert!(decode_rows(&fields, rows).is_err());
    }

    #[test]
    fn test_parse_endpoint() {
        let url = parse_endpoint("https://example.test/bigquery/v2").unwrap();
        assert_eq!(url.as_str(), "https://example.test/bigquery/v2/");
        assert_eq!(
            url.join("projects/p/queries").unwrap().as_str(),
            "https://example.test/bigquery/v2/projects/p/queries"
        );

        assert!(parse_endpoint("ftp://example.test/").is_err());
        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn test_client_args_defaults() {
        let args = ClientArgsBuilder::default()
            .access_token("token")
            .build()
            .unwrap();
        assert_eq!(args.endpoint, DEFAULT_ENDPOINT);
        assert!(args.default_project.is_none());

        let client = RestQueryClient::new(args).unwrap();
        assert!(client.project(None).is_err());
        assert_eq!(client.project(Some("explicit")).unwrap(), "explicit");
    }

    #[test]
    fn test_client_args_require_token() {
        assert!(ClientArgsBuilder::default().build().is_err());
    }

    #[test]
    fn test_query_body_shape() {
        let body = QueryBody {
            query: "SELECT 1",
            use_legacy_sql: false,
            max_results: Some(0),
            timeout_ms: 1000,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"query": "SELECT 1", "useLegacySql": false, "maxResults": 0, "timeoutMs": 1000})
        );
    }
}
