//! # Orchestrator configuration
//!
//! ## Purpose
//!
//! Every tunable named in §6.4: profitability thresholds, portfolio limits,
//! per-chain scanner schedules, queue sizing, the §5 timeout table, and
//! blacklists. Loadable from TOML or JSON, overridable by environment
//! variables, validated before the orchestrator starts.
//!
//! ## Integration Points
//!
//! - `services/arbitrage-core::main` loads this at startup via
//!   [`OrchestratorConfig::from_file`] or [`OrchestratorConfig::from_env`]
//!   and calls [`OrchestratorConfig::validate`] before wiring components.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub profit: ProfitConfig,
    pub limits: LimitsConfig,
    pub scanner: ScannerConfig,
    pub queue: QueueConfig,
    pub timeouts: TimeoutsConfig,
    pub blacklist: BlacklistConfig,
    pub flash_loan: FlashLoanConfig,
}

/// Thresholds the Aggregator's validation gates (§4.3) check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitConfig {
    /// Required; e.g. 0.003 for 0.3%.
    pub min_profit_pct: Decimal,
    pub min_profit_usd: Decimal,
    pub min_liquidity_usd: Decimal,
    pub max_gas_cost_fraction: Decimal,
    pub max_price_impact: Decimal,
}

/// Portfolio-wide caps the Risk Manager (§4.4) enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_single_trade_usd: Decimal,
    /// Keyed by chain tag.
    pub max_daily_volume_usd: HashMap<String, Decimal>,
    pub max_concurrent_trades: usize,
    pub max_gas_cost_pct_of_profit: Decimal,
    pub min_liquidity_ratio: Decimal,
}

/// Per-chain scan schedule and strategy path configuration (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub interval_ms: HashMap<String, u64>,
    /// chain -> list of (token_a, token_b) pairs to scan cross-exchange.
    pub pairs: HashMap<String, Vec<(String, String)>>,
    /// chain -> strategy kind -> list of token paths (for triangular cycles
    /// and flash-loan candidates).
    pub paths: HashMap<String, HashMap<String, Vec<Vec<String>>>>,
}

/// Bounded priority queue sizing per strategy kind (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub capacity: HashMap<String, usize>,
    pub weights: HashMap<String, u32>,
}

/// The §5 timeout table, all configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub quote_deadline_ms: u64,
    pub step_deadline_secs: u64,
    pub execution_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub opportunity_ttl_secs: u64,
    pub execution_freshness_ttl_secs: u64,
    pub price_freshness_ttl_secs: u64,
    /// How often the Orchestrator re-polls each chain adapter's
    /// `is_healthy()` and feeds the result into the Risk Manager (§10
    /// chain health registry).
    pub chain_health_poll_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlacklistConfig {
    pub tokens: Vec<String>,
    pub venues: Vec<String>,
}

/// One flash-loan liquidity source the scanner may size a loan against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashLoanProviderConfig {
    pub id: String,
    pub max_liquidity_usd: Decimal,
    pub fee_bps: Decimal,
}

/// Flash-loan sizing policy (§4.2: `min(providerMax × capFraction, configuredCap)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashLoanConfig {
    pub providers: Vec<FlashLoanProviderConfig>,
    pub cap_fraction: Decimal,
    pub configured_cap_usd: Decimal,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            profit: ProfitConfig::default(),
            limits: LimitsConfig::default(),
            scanner: ScannerConfig::default(),
            queue: QueueConfig::default(),
            timeouts: TimeoutsConfig::default(),
            blacklist: BlacklistConfig::default(),
            flash_loan: FlashLoanConfig::default(),
        }
    }
}

impl Default for FlashLoanConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            cap_fraction: dec!(0.8),
            configured_cap_usd: dec!(100000),
        }
    }
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            min_profit_pct: dec!(0.003),
            min_profit_usd: dec!(10),
            min_liquidity_usd: dec!(10000),
            max_gas_cost_fraction: dec!(0.3),
            max_price_impact: dec!(0.02),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_single_trade_usd: dec!(5000),
            max_daily_volume_usd: HashMap::new(),
            max_concurrent_trades: 3,
            max_gas_cost_pct_of_profit: dec!(0.5),
            min_liquidity_ratio: dec!(0.1),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_ms: HashMap::new(),
            pairs: HashMap::new(),
            paths: HashMap::new(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        let mut capacity = HashMap::new();
        let mut weights = HashMap::new();
        for kind in ["cross_exchange", "triangular", "flash_loan", "backrun"] {
            capacity.insert(kind.to_string(), 256);
            weights.insert(kind.to_string(), 1);
        }
        Self { capacity, weights }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            quote_deadline_ms: 2_000,
            step_deadline_secs: 30,
            execution_timeout_secs: 300,
            shutdown_grace_secs: 30,
            opportunity_ttl_secs: 60,
            execution_freshness_ttl_secs: 10,
            price_freshness_ttl_secs: 120,
            chain_health_poll_secs: 15,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = if path.ends_with(".toml") {
            toml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let serialized = if path.ends_with(".toml") {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load defaults, then apply environment variable overrides, matching
    /// `FlashArbitrageConfig::from_env()`'s pattern.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("ARB_MIN_PROFIT_PCT") {
            if let Ok(parsed) = v.parse::<Decimal>() {
                config.profit.min_profit_pct = parsed;
            }
        }
        if let Ok(v) = std::env::var("ARB_MIN_PROFIT_USD") {
            if let Ok(parsed) = v.parse::<Decimal>() {
                config.profit.min_profit_usd = parsed;
            }
        }
        if let Ok(v) = std::env::var("ARB_MAX_SINGLE_TRADE_USD") {
            if let Ok(parsed) = v.parse::<Decimal>() {
                config.limits.max_single_trade_usd = parsed;
            }
        }
        if let Ok(v) = std::env::var("ARB_MAX_CONCURRENT_TRADES") {
            if let Ok(parsed) = v.parse::<usize>() {
                config.limits.max_concurrent_trades = parsed;
            }
        }
        if let Ok(v) = std::env::var("ARB_EXECUTION_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                config.timeouts.execution_timeout_secs = parsed;
            }
        }

        config
    }

    /// Enforces invariants before the orchestrator starts (§6.4).
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.profit.min_profit_pct <= Decimal::ZERO {
            anyhow::bail!("min_profit_pct must be positive");
        }
        if self.profit.max_gas_cost_fraction <= Decimal::ZERO
            || self.profit.max_gas_cost_fraction > Decimal::ONE
        {
            anyhow::bail!("max_gas_cost_fraction must be in (0, 1]");
        }
        if self.profit.max_price_impact <= Decimal::ZERO || self.profit.max_price_impact > Decimal::ONE
        {
            anyhow::bail!("max_price_impact must be in (0, 1]");
        }
        if self.limits.max_concurrent_trades == 0 {
            anyhow::bail!("max_concurrent_trades must be positive");
        }
        if self.limits.max_single_trade_usd <= Decimal::ZERO {
            anyhow::bail!("max_single_trade_usd must be positive");
        }
        if self.timeouts.execution_freshness_ttl_secs == 0 {
            anyhow::bail!("execution_freshness_ttl_secs must be positive");
        }
        if self.timeouts.opportunity_ttl_secs == 0 {
            anyhow::bail!("opportunity_ttl_secs must be positive");
        }
        if self.timeouts.execution_timeout_secs == 0 {
            anyhow::bail!("execution_timeout_secs must be positive");
        }
        if self.timeouts.chain_health_poll_secs == 0 {
            anyhow::bail!("chain_health_poll_secs must be positive");
        }
        if self.flash_loan.cap_fraction <= Decimal::ZERO || self.flash_loan.cap_fraction > Decimal::ONE {
            anyhow::bail!("flash_loan.cap_fraction must be in (0, 1]");
        }
        for (kind, cap) in &self.queue.capacity {
            if *cap == 0 {
                anyhow::bail!("queue capacity for {kind} must be positive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = OrchestratorConfig::default();
        config.limits.max_concurrent_trades = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trips() {
        let config = OrchestratorConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: OrchestratorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.profit.min_profit_pct, deserialized.profit.min_profit_pct);
    }

    #[test]
    fn toml_round_trips() {
        let config = OrchestratorConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: OrchestratorConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.limits.max_single_trade_usd,
            deserialized.limits.max_single_trade_usd
        );
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("ARB_MIN_PROFIT_PCT", "0.01");
        std::env::set_var("ARB_MAX_CONCURRENT_TRADES", "7");
        let config = OrchestratorConfig::from_env();
        assert_eq!(config.profit.min_profit_pct, dec!(0.01));
        assert_eq!(config.limits.max_concurrent_trades, 7);
        std::env::remove_var("ARB_MIN_PROFIT_PCT");
        std::env::remove_var("ARB_MAX_CONCURRENT_TRADES");
    }

    #[test]
    fn file_round_trip_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = OrchestratorConfig::default();
        config.save_to_file(path.to_str().unwrap()).unwrap();
        let loaded = OrchestratorConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.profit.min_profit_usd, loaded.profit.min_profit_usd);
    }
}
