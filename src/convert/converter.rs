use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::record::{Feature, Record, Row, Value};
use super::schema::{ColumnType, Schema, build_schema};
use crate::error::{Error, Result};
use crate::query::QueryClient;

/// Converts query result rows into typed records using a schema probed once.
///
/// Cloning is cheap and every clone shares the same schema, so one converter can be
/// handed to any number of concurrent conversion tasks.
#[derive(Debug, Clone)]
pub struct Converter {
    schema: Arc<Schema>,
}

impl Converter {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }

    /// Probe the result schema of `query` and build a converter for its rows
    pub async fn for_query(
        client: &dyn QueryClient,
        query: &str,
        project_id: Option<&str>,
    ) -> Result<Self> {
        let schema = build_schema(client, query, project_id).await?;
        info!("Built converter for {} result columns", schema.len());
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn convert(&self, row: &Row) -> Result<Record> {
        convert_row(&self.schema, row)
    }
}

/// Convert one row into a record.
///
/// Every key of the row must be a schema column. Schema columns the row does not
/// carry are treated like nulls, so the record always holds exactly the schema's
/// columns.
pub fn convert_row(schema: &Schema, row: &Row) -> Result<Record> {
    let mut features = BTreeMap::new();

    for (column, value) in row {
        let column_type = schema
            .column_type(column)
            .ok_or_else(|| Error::UnknownColumn {
                column: column.clone(),
            })?;
        let feature = convert_value(column, column_type, value)?;
        features.insert(column.clone(), feature);
    }

    for (column, _) in schema.columns() {
        if !features.contains_key(column) {
            features.insert(column.to_string(), Feature::Empty);
        }
    }

    Ok(Record::with_features(features))
}

fn convert_value(column: &str, column_type: ColumnType, value: &Value) -> Result<Feature> {
    let feature = match (column_type, value) {
        (_, Value::Null) => Feature::Empty,
        (ColumnType::Integer | ColumnType::Boolean, Value::Int(v)) => Feature::Int64List(vec![*v]),
        (ColumnType::Integer | ColumnType::Boolean, Value::Bool(v)) => {
            Feature::Int64List(vec![i64::from(*v)])
        }
        (ColumnType::Float, Value::Float(v)) => Feature::FloatList(vec![*v as f32]),
        (ColumnType::Float, Value::Int(v)) => Feature::FloatList(vec![*v as f32]),
        (ColumnType::String, Value::String(v)) => Feature::BytesList(vec![v.as_bytes().to_vec()]),
        (column_type, value) => {
            return Err(Error::TypeMismatch {
                column: column.to_string(),
                column_type,
                found: value.kind(),
            });
        }
    };
    Ok(feature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_schema() -> Schema {
        [
            ("id", ColumnType::Integer),
            ("name", ColumnType::String),
            ("score", ColumnType::Float),
            ("active", ColumnType::Boolean),
        ]
        .into_iter()
        .collect()
    }

    fn row(values: Vec<(&str, Value)>) -> Row {
        values
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    #[test]
    fn test_convert_full_row() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![
                ("id", Value::Int(7)),
                ("name", Value::from("a")),
                ("score", Value::Float(3.5)),
                ("active", Value::Bool(true)),
            ]))
            .unwrap();

        assert_eq!(record.len(), 4);
        assert_eq!(record.get("id"), Some(&Feature::Int64List(vec![7])));
        assert_eq!(
            record.get("name"),
            Some(&Feature::BytesList(vec![b"a".to_vec()]))
        );
        assert_eq!(record.get("score"), Some(&Feature::FloatList(vec![3.5])));
        assert_eq!(record.get("active"), Some(&Feature::Int64List(vec![1])));
    }

    #[test]
    fn test_convert_null_and_false() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![
                ("id", Value::Int(7)),
                ("name", Value::Null),
                ("score", Value::Float(3.5)),
                ("active", Value::Bool(false)),
            ]))
            .unwrap();

        assert_eq!(record.get("name"), Some(&Feature::Empty));
        assert_eq!(record.get("active"), Some(&Feature::Int64List(vec![0])));
    }

    #[test]
    fn test_null_is_empty_for_every_type() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![
                ("id", Value::Null),
                ("name", Value::Null),
                ("score", Value::Null),
                ("active", Value::Null),
            ]))
            .unwrap();

        assert_eq!(record.len(), 4);
        assert!(record.iter().all(|(_, feature)| feature.is_empty()));
    }

    #[test]
    fn test_missing_columns_become_empty() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![("id", Value::Int(1))]))
            .unwrap();

        assert_eq!(record.len(), 4);
        assert_eq!(record.get("id"), Some(&Feature::Int64List(vec![1])));
        assert_eq!(record.get("name"), Some(&Feature::Empty));
        assert_eq!(record.get("score"), Some(&Feature::Empty));
        assert_eq!(record.get("active"), Some(&Feature::Empty));
    }

    #[test]
    fn test_unknown_column_is_fatal() {
        let converter = Converter::new(scenario_schema());
        let err = converter
            .convert(&row(vec![("id", Value::Int(1)), ("extra", Value::Int(2))]))
            .unwrap_err();

        assert!(matches!(err, Error::UnknownColumn { ref column } if column == "extra"));
        assert!(err.is_unsupported_type());
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let converter = Converter::new(scenario_schema());
        let err = converter
            .convert(&row(vec![("name", Value::Int(5))]))
            .unwrap_err();

        match err {
            Error::TypeMismatch {
                column,
                column_type,
                found,
            } => {
                assert_eq!(column, "name");
                assert_eq!(column_type, ColumnType::String);
                assert_eq!(found, "integer");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_integer_widens_into_float() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![("score", Value::Int(2))]))
            .unwrap();
        assert_eq!(record.get("score"), Some(&Feature::FloatList(vec![2.0])));
    }

    #[test]
    fn test_boolean_column_accepts_integers() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![("active", Value::Int(1))]))
            .unwrap();
        assert_eq!(record.get("active"), Some(&Feature::Int64List(vec![1])));
    }

    #[test]
    fn test_utf8_strings_keep_their_bytes() {
        let converter = Converter::new(scenario_schema());
        let record = converter
            .convert(&row(vec![("name", Value::from("héllo"))]))
            .unwrap();
        assert_eq!(
            record.get("name"),
            Some(&Feature::BytesList(vec!["héllo".as_bytes().to_vec()]))
        );
    }

    #[test]
    fn test_clones_share_schema() {
        let converter = Converter::new(scenario_schema());
        let clone = converter.clone();
        assert!(std::ptr::eq(converter.schema(), clone.schema()));
    }
}
