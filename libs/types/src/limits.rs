//! Portfolio limits, blacklists and the daily volume ledger the Risk
//! Manager (C7) enforces.

use crate::ids::{ChainId, TokenId, VenueId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioLimits {
    pub max_single_trade_usd: Decimal,
    pub max_daily_volume_usd: HashMap<ChainId, Decimal>,
    pub max_gas_cost_pct_of_profit: Decimal,
    pub max_concurrent_trades: usize,
    pub min_liquidity_ratio: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blacklists {
    pub tokens: HashSet<TokenId>,
    pub venues: HashSet<VenueId>,
}

impl Blacklists {
    pub fn contains_any(&self, path: &[TokenId], venues: &[VenueId]) -> bool {
        path.iter().any(|t| self.tokens.contains(t)) || venues.iter().any(|v| self.venues.contains(v))
    }
}

/// `(chain, date) -> volume_usd`, reset at UTC midnight.
#[derive(Debug, Clone, Default)]
pub struct DailyCounters {
    volume: HashMap<(ChainId, NaiveDate), Decimal>,
}

impl DailyCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume_for(&self, chain: &ChainId, date: NaiveDate) -> Decimal {
        self.volume
            .get(&(chain.clone(), date))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn add(&mut self, chain: &ChainId, date: NaiveDate, amount_usd: Decimal) {
        *self
            .volume
            .entry((chain.clone(), date))
            .or_insert(Decimal::ZERO) += amount_usd;
    }

    /// Clears all counters. Scheduled at UTC midnight (§4.4 `Reset()`); does
    /// not touch success-rate estimators or blacklists.
    pub fn reset(&mut self) {
        self.volume.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_per_chain_per_day() {
        let mut counters = DailyCounters::new();
        let chain = ChainId::new("ethereum");
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        counters.add(&chain, date, Decimal::from(100));
        counters.add(&chain, date, Decimal::from(50));
        assert_eq!(counters.volume_for(&chain, date), Decimal::from(150));
    }

    #[test]
    fn reset_clears_all_chains() {
        let mut counters = DailyCounters::new();
        let chain = ChainId::new("ethereum");
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        counters.add(&chain, date, Decimal::from(100));
        counters.reset();
        assert_eq!(counters.volume_for(&chain, date), Decimal::ZERO);
    }
}
