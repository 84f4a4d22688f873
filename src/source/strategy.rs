use serde::Serialize;
use std::fmt;

use crate::config::BULK_READ_RUNTIMES;
use crate::error::{Error, Result};
use crate::hints::ExecutionHints;
use crate::query::Capabilities;

/// The two wire-level read strategies. Both yield the same rows for the same query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// One bulk read of the whole result set, replayed to the consumer
    Legacy,
    /// Lazy page-by-page read driven by the consumer
    Modern,
}

impl StrategyKind {
    pub fn alternate(self) -> Self {
        match self {
            Self::Legacy => Self::Modern,
            Self::Modern => Self::Legacy,
        }
    }

    /// Whether this build carries the strategy at all
    pub fn compiled_in(self) -> bool {
        match self {
            Self::Legacy => cfg!(feature = "legacy-source"),
            Self::Modern => cfg!(feature = "streaming-source"),
        }
    }

    fn supported_by(self, capabilities: &Capabilities) -> bool {
        match self {
            Self::Legacy => capabilities.bulk_read,
            Self::Modern => capabilities.paged_read,
        }
    }

    /// Compiled in and supported by the client
    pub fn is_available(self, capabilities: &Capabilities) -> bool {
        self.compiled_in() && self.supported_by(capabilities)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the preferred strategy for the target runtime
pub fn select_read_strategy(hints: &ExecutionHints) -> StrategyKind {
    let bulk_runtime = BULK_READ_RUNTIMES.contains(&hints.runtime_name.as_str());

    if hints.force_legacy || bulk_runtime {
        StrategyKind::Legacy
    } else {
        StrategyKind::Modern
    }
}

/// Settle on the strategy that will actually be used, falling back to the alternate
/// when the preferred one is unavailable
pub fn resolve_strategy(
    preferred: StrategyKind,
    capabilities: &Capabilities,
) -> Result<StrategyKind> {
    if preferred.is_available(capabilities) {
        return Ok(preferred);
    }
    let alternate = preferred.alternate();
    if alternate.is_available(capabilities) {
        return Ok(alternate);
    }
    Err(Error::SourceUnavailable {
        requested: preferred,
    })
}
