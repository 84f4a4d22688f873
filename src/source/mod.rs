//! Row source: read strategy selection and the two strategies themselves

pub mod adapter;
pub mod strategy;

#[cfg(feature = "legacy-source")]
mod legacy;
#[cfg(feature = "streaming-source")]
mod streaming;

pub use adapter::{RowStream, SourceAdapter, open_row_stream};
pub use strategy::{StrategyKind, resolve_strategy, select_read_strategy};
