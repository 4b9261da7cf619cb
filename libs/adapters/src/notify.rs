//! `NotificationSink` — replaces the source's global callback lists with a
//! plain trait sinks implement; the Coordinator fans out over a
//! `tokio::sync::broadcast` channel that any number of sinks can subscribe
//! to (see `services/arbitrage-core::coordinator`).

use async_trait::async_trait;
use tracing::{info, warn};
use types::ExecutionResult;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, result: &ExecutionResult);
}

/// The one in-tree sink: logs the terminal result. Real chat-bot wiring
/// (the original's `telegram_alert.py`) stays out of scope.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, result: &ExecutionResult) {
        if result.success {
            info!(
                opportunity_id = %result.opportunity_id,
                profit_usd = %result.realized_profit_usd,
                "execution succeeded"
            );
        } else {
            warn!(
                opportunity_id = %result.opportunity_id,
                status = ?result.status,
                error = ?result.error,
                "execution did not succeed"
            );
        }
    }
}
