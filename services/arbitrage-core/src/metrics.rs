//! # Metrics & History (C10)
//!
//! ## Purpose
//!
//! Per-strategy rolling counters and a bounded history ring of the last
//! 1000 `ExecutionResult`s (§4.7). Write-owned by the Coordinator; readers
//! (the HTTP surface, tests) get a consistent snapshot per call.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use types::{ExecutionResult, OpportunityKind, TerminalState};

const HISTORY_CAPACITY: usize = 1000;

fn kind_index(kind: OpportunityKind) -> u8 {
    match kind {
        OpportunityKind::CrossExchange => 0,
        OpportunityKind::Triangular => 1,
        OpportunityKind::FlashLoan => 2,
        OpportunityKind::Backrun => 3,
    }
}

#[derive(Debug, Clone, Default)]
struct KindCounters {
    attempts: u64,
    successes: u64,
    failures: u64,
    expired: u64,
    rejected: u64,
    cancelled: u64,
    cumulative_profit_usd: Decimal,
    cumulative_gas_cost_usd: Decimal,
    total_elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct KindSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub expired: u64,
    pub rejected: u64,
    pub cancelled: u64,
    pub cumulative_profit_usd: Decimal,
    pub cumulative_gas_cost_usd: Decimal,
    pub success_rate: f64,
    pub average_elapsed: Duration,
}

impl From<&KindCounters> for KindSnapshot {
    fn from(c: &KindCounters) -> Self {
        let success_rate = if c.attempts == 0 {
            0.0
        } else {
            c.successes as f64 / c.attempts as f64
        };
        let average_elapsed = if c.attempts == 0 {
            Duration::ZERO
        } else {
            c.total_elapsed / c.attempts as u32
        };
        Self {
            attempts: c.attempts,
            successes: c.successes,
            failures: c.failures,
            expired: c.expired,
            rejected: c.rejected,
            cancelled: c.cancelled,
            cumulative_profit_usd: c.cumulative_profit_usd,
            cumulative_gas_cost_usd: c.cumulative_gas_cost_usd,
            success_rate,
            average_elapsed,
        }
    }
}

pub struct Metrics {
    per_kind: Mutex<HashMap<u8, KindCounters>>,
    history: Mutex<VecDeque<ExecutionResult>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            per_kind: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Records one terminal outcome: updates the strategy-kind counters and
    /// pushes into the bounded history ring, dropping the oldest entry past
    /// capacity (§4.7). Callers must invoke this in `recorded_at` order for
    /// the monotone-history property to hold (§8) — the Coordinator does so
    /// by recording synchronously as each worker finishes.
    pub fn record(&self, kind: OpportunityKind, result: ExecutionResult) {
        {
            let mut per_kind = self.per_kind.lock();
            let counters = per_kind.entry(kind_index(kind)).or_default();
            counters.attempts += 1;
            match result.status {
                TerminalState::Success => counters.successes += 1,
                TerminalState::Failed => counters.failures += 1,
                TerminalState::Expired => counters.expired += 1,
                TerminalState::Rejected => counters.rejected += 1,
                TerminalState::Cancelled => counters.cancelled += 1,
            }
            counters.cumulative_profit_usd += result.realized_profit_usd;
            counters.cumulative_gas_cost_usd += result.realized_gas_cost_usd;
            counters.total_elapsed += result.elapsed;
        }

        let mut history = self.history.lock();
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(result);
    }

    pub fn snapshot(&self, kind: OpportunityKind) -> KindSnapshot {
        let per_kind = self.per_kind.lock();
        per_kind
            .get(&kind_index(kind))
            .map(KindSnapshot::from)
            .unwrap_or_else(|| KindSnapshot::from(&KindCounters::default()))
    }

    pub fn history(&self) -> Vec<ExecutionResult> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::{MonoTimestamp, OpportunityId};

    fn success(id: &str, profit: Decimal, ts: u64) -> ExecutionResult {
        ExecutionResult::success(
            OpportunityId::new(id),
            profit,
            dec!(2),
            vec!["0xabc".to_string()],
            Duration::from_secs(1),
            MonoTimestamp::from_nanos(ts),
        )
    }

    #[test]
    fn records_attempts_and_successes() {
        let metrics = Metrics::new();
        metrics.record(OpportunityKind::CrossExchange, success("a", dec!(10), 0));
        metrics.record(OpportunityKind::CrossExchange, success("b", dec!(20), 1));
        let snap = metrics.snapshot(OpportunityKind::CrossExchange);
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.successes, 2);
        assert_eq!(snap.cumulative_profit_usd, dec!(30));
        assert_eq!(snap.success_rate, 1.0);
    }

    #[test]
    fn history_ring_is_bounded() {
        let metrics = Metrics::new();
        for i in 0..(HISTORY_CAPACITY + 10) {
            metrics.record(
                OpportunityKind::CrossExchange,
                success(&format!("id{i}"), dec!(1), i as u64),
            );
        }
        assert_eq!(metrics.history_len(), HISTORY_CAPACITY);
        let history = metrics.history();
        // the oldest 10 entries were evicted; the ring now starts at id10
        assert_eq!(history.front().unwrap().opportunity_id, OpportunityId::new("id10"));
    }

    #[test]
    fn monotone_cumulative_counters() {
        let metrics = Metrics::new();
        metrics.record(OpportunityKind::Triangular, success("a", dec!(5), 0));
        let after_a = metrics.snapshot(OpportunityKind::Triangular).cumulative_profit_usd;
        metrics.record(OpportunityKind::Triangular, success("b", dec!(7), 1));
        let after_b = metrics.snapshot(OpportunityKind::Triangular).cumulative_profit_usd;
        assert!(after_b >= after_a);
    }

    #[test]
    fn different_kinds_track_independently() {
        let metrics = Metrics::new();
        metrics.record(OpportunityKind::CrossExchange, success("a", dec!(5), 0));
        assert_eq!(metrics.snapshot(OpportunityKind::Triangular).attempts, 0);
        assert_eq!(metrics.snapshot(OpportunityKind::CrossExchange).attempts, 1);
    }
}
