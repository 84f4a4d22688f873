//! Error taxonomy for schema introspection, row conversion and source selection.
//!
//! Every variant is terminal for the step that raised it: nothing here is retried or
//! downgraded to a warning by this crate. Retry and dead-letter policy belong to
//! whatever drives the pipeline.

use thiserror::Error;

use crate::convert::ColumnType;
use crate::source::StrategyKind;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for the core conversion and source operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The zero-row probe query could not be executed.
    #[error("failed to fetch result schema for query `{query}`: {source}")]
    SchemaFetch {
        query: String,
        #[source]
        source: BoxError,
    },

    /// The probe reported the same column name twice.
    #[error("column '{column}' is reported more than once")]
    DuplicateColumn { column: String },

    /// A column reported a type outside INTEGER, BOOLEAN, FLOAT and STRING.
    #[error("column '{column}' has unsupported type {reported_type}")]
    UnsupportedType {
        column: String,
        reported_type: String,
    },

    /// A row carried a key the probed schema does not know about.
    #[error("column '{column}' is not present in the probed schema")]
    UnknownColumn { column: String },

    /// A row value cannot be represented as its column's declared type.
    #[error("column '{column}' is declared {column_type} but the row holds a {found} value")]
    TypeMismatch {
        column: String,
        column_type: ColumnType,
        found: &'static str,
    },

    /// Neither read strategy can be opened in this build.
    #[error("no read strategy is available (requested {requested})")]
    SourceUnavailable { requested: StrategyKind },

    /// A result page could not be fetched after the stream was opened.
    #[error("failed to read query results: {source}")]
    Read {
        #[source]
        source: BoxError,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn schema_fetch(query: &str, source: anyhow::Error) -> Self {
        Error::SchemaFetch {
            query: query.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn read(source: anyhow::Error) -> Self {
        Error::Read {
            source: source.into(),
        }
    }

    /// True for the unsupported-type class: a reported type outside the closed set, a
    /// row key missing from the schema, or a value that does not fit its column type.
    pub fn is_unsupported_type(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedType { .. } | Error::UnknownColumn { .. } | Error::TypeMismatch { .. }
        )
    }
}
