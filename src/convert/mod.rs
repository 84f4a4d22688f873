//! Schema introspection and row-to-record conversion

pub mod converter;
pub mod record;
pub mod schema;

pub use converter::{Converter, convert_row};
pub use record::{Feature, Record, Row, Value};
pub use schema::{ColumnType, Schema, build_schema, probe_query};
