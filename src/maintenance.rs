use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::engine::{Engine, EngineError};

/// Compact the journal once it has grown past `threshold` appends.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.journal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    debug!(appends, threshold, "journal over threshold, compacting");
    engine.compact().await?;
    Ok(true)
}

/// Background task that keeps the journal from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    if !engine.is_durable() {
        return;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            error!("compaction failed: {e}");
        }
    }
}
