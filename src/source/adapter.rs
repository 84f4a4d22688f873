use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::strategy::{StrategyKind, resolve_strategy, select_read_strategy};
use crate::convert::Row;
use crate::error::{Error, Result};
use crate::hints::ExecutionHints;
use crate::query::QueryClient;

#[cfg(feature = "legacy-source")]
use super::legacy;
#[cfg(feature = "streaming-source")]
use super::streaming;

/// Lazy, finite, single-use sequence of raw rows
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Produces the row stream for a query using the read strategy chosen for the
/// pipeline's runtime.
///
/// The strategy is picked and checked against what this build and the client support
/// once, when the adapter is created. Every stream it opens uses that strategy.
pub struct SourceAdapter {
    client: Arc<dyn QueryClient>,
    requested: StrategyKind,
    strategy: StrategyKind,
    project_id: Option<String>,
}

impl SourceAdapter {
    pub fn new(client: Arc<dyn QueryClient>, hints: &ExecutionHints) -> Result<Self> {
        let requested = select_read_strategy(hints);
        let strategy = resolve_strategy(requested, &client.capabilities())?;

        if strategy != requested {
            warn!(
                "{} read strategy is unavailable, falling back to {}",
                requested, strategy
            );
        } else {
            info!("Using {} read strategy", strategy);
        }

        Ok(Self {
            client,
            requested,
            strategy,
            project_id: hints.project_id.clone(),
        })
    }

    /// Strategy the runtime asked for
    pub fn requested(&self) -> StrategyKind {
        self.requested
    }

    /// Strategy streams are actually opened with
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn open_row_stream(&self, query: &str, cancel: CancellationToken) -> Result<RowStream> {
        let stream = dispatch(
            self.strategy,
            Arc::clone(&self.client),
            query.to_string(),
            self.project_id.clone(),
        )?;
        Ok(stream.take_until(cancel.cancelled_owned()).boxed())
    }
}

/// Open a row stream for `query` with `strategy`, falling back to the alternate strategy
/// when the requested one is unavailable.
///
/// The stream ends early, without an error, once `cancel` fires.
pub fn open_row_stream(
    client: Arc<dyn QueryClient>,
    query: &str,
    project_id: Option<&str>,
    strategy: StrategyKind,
    cancel: CancellationToken,
) -> Result<RowStream> {
    let resolved = resolve_strategy(strategy, &client.capabilities())?;
    let stream = dispatch(
        resolved,
        client,
        query.to_string(),
        project_id.map(str::to_string),
    )?;
    Ok(stream.take_until(cancel.cancelled_owned()).boxed())
}

fn dispatch(
    strategy: StrategyKind,
    client: Arc<dyn QueryClient>,
    query: String,
    project_id: Option<String>,
) -> Result<RowStream> {
    match strategy {
        #[cfg(feature = "legacy-source")]
        StrategyKind::Legacy => Ok(legacy::read_bulk(client, query, project_id)),
        #[cfg(feature = "streaming-source")]
        StrategyKind::Modern => Ok(streaming::read_pages(client, query, project_id)),
        #[allow(unreachable_patterns)]
        requested => {
            let _ = (client, query, project_id);
            Err(Error::SourceUnavailable { requested })
        }
    }
}
