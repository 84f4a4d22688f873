use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::{FieldSchema, QueryClient, QueryRequest};

/// Column type as reported by the query service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Boolean,
    Float,
    String,
}

impl ColumnType {
    /// Parse a reported type name. The Standard SQL spellings are aliases of the
    /// legacy names the REST API reports.
    pub fn parse(reported: &str) -> Option<Self> {
        match reported.to_uppercase().as_str() {
            "INTEGER" | "INT64" => Some(ColumnType::Integer),
            "BOOLEAN" | "BOOL" => Some(ColumnType::Boolean),
            "FLOAT" | "FLOAT64" => Some(ColumnType::Float),
            "STRING" => Some(ColumnType::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Float => "FLOAT",
            ColumnType::String => "STRING",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable column name -> type mapping for one query's result set.
///
/// Built once per query before any row is converted and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    columns: BTreeMap<String, ColumnType>,
}

impl Schema {
    /// Build a schema from reported fields. Fails on the first field whose type is
    /// outside the supported set.
    pub fn from_fields(fields: &[FieldSchema]) -> Result<Self> {
        let mut columns = BTreeMap::new();

        for field in fields {
            let column_type =
                ColumnType::parse(&field.field_type).ok_or_else(|| Error::UnsupportedType {
                    column: field.name.clone(),
                    reported_type: field.field_type.clone(),
                })?;

            match columns.entry(field.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(column_type);
                }
                Entry::Occupied(_) => {
                    return Err(Error::DuplicateColumn {
                        column: field.name.clone(),
                    });
                }
            }
        }

        Ok(Self { columns })
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    /// Columns in name order
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, ColumnType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (S, ColumnType)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        }
    }
}

/// Wrap a query so that it returns its column metadata and no rows
pub fn probe_query(query: &str) -> String {
    format!("SELECT * FROM ({}) LIMIT 0", query)
}

/// Obtain the result schema of `query` with a zero-row probe against the service
pub async fn build_schema(
    client: &dyn QueryClient,
    query: &str,
    project_id: Option<&str>,
) -> Result<Schema> {
    let request = QueryRequest {
        query: probe_query(query),
        project_id: project_id.map(str::to_string),
        max_results: Some(0),
    };

    let page = client
        .execute(&request)
        .await
        .map_err(|e| Error::schema_fetch(query, e))?;

    let schema = Schema::from_fields(&page.fields)?;

    debug!("Probed schema with {} columns", schema.len());
    Ok(schema)
}
