//! Standardized emoji logging for the arbitrage pipeline.
//!
//! Provides consistent emoji usage across scanner, aggregator, risk, and
//! coordinator modules to make a scrolling log scannable at a glance.

use tracing_subscriber::EnvFilter;

/// Standard emoji set for pipeline logging.
pub struct LogEmoji;

impl LogEmoji {
    pub const SUCCESS: &'static str = "✅";
    pub const ERROR: &'static str = "❌";
    pub const WARNING: &'static str = "⚠️";

    pub const SEARCH: &'static str = "🔍"; // scanning
    pub const CHART: &'static str = "📊"; // metrics
    pub const EXECUTE: &'static str = "⚡"; // execution
    pub const MONEY: &'static str = "💰"; // realized profit
    pub const GAS: &'static str = "⛽"; // gas price/cost
    pub const SHIELD: &'static str = "🛡️"; // risk gate
    pub const CLOCK: &'static str = "⏱️"; // timeouts/deadlines
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SUCCESS, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_search {
    ($($arg:tt)*) => {
        tracing::debug!("{} {}", $crate::logging::LogEmoji::SEARCH, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_risk_reject {
    ($($arg:tt)*) => {
        tracing::warn!("{} {}", $crate::logging::LogEmoji::SHIELD, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_profit {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::MONEY, format!($($arg)*))
    };
}

/// Initializes the global `tracing` subscriber: env-filtered (`RUST_LOG`,
/// defaulting to `info`), human-readable for a terminal. Must be called
/// once, before any other component starts logging.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
