// Public API - conversion core, row source and the runner built on them
pub mod convert;
pub mod error;
pub mod hints;
pub mod pipeline;
pub mod query;
pub mod runner;
pub mod sink;
pub mod source;

// Internal modules
mod config;
mod telemetry;


pub use convert::{ColumnType, Converter, Feature, Record, Row, Schema, Value};
pub use error::{Error, Result};
pub use hints::ExecutionHints;
pub use source::{SourceAdapter, StrategyKind};
