//! # Execution Queue (C8)
//!
//! ## Purpose
//!
//! One bounded priority queue per strategy kind so a slow strategy can't
//! starve another (§4.5). Enqueue is non-blocking with drop-lowest-priority
//! on overflow; dequeue blocks until an item is ready or the cancellation
//! token fires. Mirrors `pool_cache.rs`'s combination of a guarded
//! structure plus `tokio::sync::Notify` for async wakeup.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tokio_util::sync::CancellationToken;
use types::{MonoTimestamp, Opportunity, OpportunityKind};

#[derive(Clone)]
struct QueueEntry {
    priority: u8,
    net_profit_usd: Decimal,
    detected_at: MonoTimestamp,
    opportunity: Opportunity,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
            && self.net_profit_usd == other.net_profit_usd
            && self.detected_at == other.detected_at
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Descending priority, then descending net_profit_usd, then ascending
    /// detected_at (older first) — the tie-break rule from §4.3, applied
    /// here to dequeue order as well as to aggregator ranking.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.net_profit_usd.cmp(&other.net_profit_usd))
            .then(other.detected_at.cmp(&self.detected_at))
    }
}

/// A single strategy kind's bounded priority queue.
pub struct StrategyQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    capacity: usize,
    notify: tokio::sync::Notify,
}

impl StrategyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
            capacity,
            notify: tokio::sync::Notify::new(),
        }
    }

    /// Returns `true` if the opportunity was enqueued (possibly displacing
    /// a lower-priority item), `false` if it was dropped outright because
    /// the queue was full of items of equal or higher priority.
    pub fn enqueue(&self, opportunity: Opportunity) -> bool {
        let entry = QueueEntry {
            priority: opportunity.priority,
            net_profit_usd: opportunity.net_profit_usd,
            detected_at: opportunity.detected_at,
            opportunity,
        };

        let accepted = {
            let mut heap = self.heap.lock();
            if heap.len() < self.capacity {
                heap.push(entry);
                true
            } else {
                let min = heap.iter().min().cloned();
                match min {
                    Some(min_entry) if entry > min_entry => {
                        let mut items: Vec<QueueEntry> = std::mem::take(&mut *heap).into_vec();
                        if let Some(pos) = items
                            .iter()
                            .position(|e| e.priority == min_entry.priority
                                && e.net_profit_usd == min_entry.net_profit_usd
                                && e.detected_at == min_entry.detected_at)
                        {
                            items.remove(pos);
                        }
                        items.push(entry);
                        *heap = BinaryHeap::from(items);
                        true
                    }
                    _ => false,
                }
            }
        };

        if accepted {
            self.notify.notify_one();
        }
        accepted
    }

    /// Non-blocking pop of the highest-priority item, if any.
    pub fn try_dequeue(&self) -> Option<Opportunity> {
        self.heap.lock().pop().map(|entry| entry.opportunity)
    }

    /// Blocks until the highest-priority item is available or `token` is
    /// cancelled.
    pub async fn dequeue(&self, token: &CancellationToken) -> Option<Opportunity> {
        loop {
            if let Some(entry) = self.heap.lock().pop() {
                return Some(entry.opportunity);
            }
            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = token.cancelled() => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One queue per strategy kind plus the weighted round-robin the
/// Coordinator (C9) uses to pick which queue to drain next.
pub struct QueueManager {
    queues: HashMap<OpportunityKindKey, StrategyQueue>,
    weights: HashMap<OpportunityKindKey, u32>,
}

/// `OpportunityKind` has no `Hash`/`Eq` derive (it carries a custom `Debug`
/// only); this local key avoids adding those derives purely for map usage.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct OpportunityKindKey(u8);

fn kind_key(kind: OpportunityKind) -> OpportunityKindKey {
    OpportunityKindKey(match kind {
        OpportunityKind::CrossExchange => 0,
        OpportunityKind::Triangular => 1,
        OpportunityKind::FlashLoan => 2,
        OpportunityKind::Backrun => 3,
    })
}

/// Config keys for strategy kinds, per `config::QueueConfig` (e.g.
/// `"cross_exchange"`, `"triangular"`, `"flash_loan"`, `"backrun"`).
pub fn kind_config_key(kind: OpportunityKind) -> &'static str {
    match kind {
        OpportunityKind::CrossExchange => "cross_exchange",
        OpportunityKind::Triangular => "triangular",
        OpportunityKind::FlashLoan => "flash_loan",
        OpportunityKind::Backrun => "backrun",
    }
}

impl QueueManager {
    pub fn new(capacities: &HashMap<String, usize>, weights: &HashMap<String, u32>) -> Self {
        let mut queues = HashMap::new();
        let mut weight_map = HashMap::new();
        for kind in [
            OpportunityKind::CrossExchange,
            OpportunityKind::Triangular,
            OpportunityKind::FlashLoan,
            OpportunityKind::Backrun,
        ] {
            let key = kind_config_key(kind);
            let capacity = capacities.get(key).copied().unwrap_or(256);
            let weight = weights.get(key).copied().unwrap_or(1).max(1);
            queues.insert(kind_key(kind), StrategyQueue::new(capacity));
            weight_map.insert(kind_key(kind), weight);
        }
        Self {
            queues,
            weights: weight_map,
        }
    }

    pub fn enqueue(&self, kind: OpportunityKind, opportunity: Opportunity) -> bool {
        self.queues.get(&kind_key(kind)).map(|q| q.enqueue(opportunity)).unwrap_or(false)
    }

    pub fn queue_depth(&self, kind: OpportunityKind) -> usize {
        self.queues.get(&kind_key(kind)).map(|q| q.len()).unwrap_or(0)
    }

    pub fn total_depth(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    /// Weighted round-robin: visits kinds in declaration order, attempting
    /// up to `weight` non-blocking dequeues per kind before moving on.
    /// When every queue is empty, waits briefly and retries rather than
    /// blocking on a single queue's `Notify` (no single strategy kind can
    /// starve another — §4.5).
    pub async fn dequeue_next(&self, token: &CancellationToken) -> Option<(OpportunityKind, Opportunity)> {
        const EMPTY_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(5);
        let order = [
            OpportunityKind::CrossExchange,
            OpportunityKind::Triangular,
            OpportunityKind::FlashLoan,
            OpportunityKind::Backrun,
        ];
        loop {
            if token.is_cancelled() {
                return None;
            }
            for kind in order {
                let key = kind_key(kind);
                let weight = *self.weights.get(&key).unwrap_or(&1);
                let queue = self.queues.get(&key)?;
                for _ in 0..weight {
                    if let Some(opp) = queue.try_dequeue() {
                        return Some((kind, opp));
                    }
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(EMPTY_POLL_INTERVAL) => continue,
                _ = token.cancelled() => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::{ChainId, OpportunityId, TokenId, VenueId};

    fn opp(id: &str, priority: u8, profit: Decimal) -> Opportunity {
        Opportunity::new(
            OpportunityId::new(id),
            OpportunityKind::CrossExchange,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(0),
            vec![TokenId::new("A"), TokenId::new("B")],
            vec![VenueId::new("v")],
            dec!(1),
            dec!(1),
            profit,
            dec!(0),
            dec!(0),
            dec!(100000),
            None,
        )
        .unwrap()
        .with_enrichment(10, priority, 90)
    }

    #[tokio::test]
    async fn dequeues_highest_priority_first() {
        let queue = StrategyQueue::new(10);
        queue.enqueue(opp("low", 3, dec!(10)));
        queue.enqueue(opp("high", 9, dec!(10)));
        queue.enqueue(opp("mid", 5, dec!(10)));
        let token = CancellationToken::new();

        let first = queue.dequeue(&token).await.unwrap();
        assert_eq!(first.id, OpportunityId::new("high"));
        let second = queue.dequeue(&token).await.unwrap();
        assert_eq!(second.id, OpportunityId::new("mid"));
        let third = queue.dequeue(&token).await.unwrap();
        assert_eq!(third.id, OpportunityId::new("low"));
    }

    #[tokio::test]
    async fn overflow_drops_lowest_priority() {
        let queue = StrategyQueue::new(2);
        assert!(queue.enqueue(opp("a", 5, dec!(10))));
        assert!(queue.enqueue(opp("b", 6, dec!(10))));
        // queue full at capacity 2; a new lower-priority item is dropped
        assert!(!queue.enqueue(opp("c", 1, dec!(10))));
        // a new higher-priority item displaces the current minimum ("a")
        assert!(queue.enqueue(opp("d", 9, dec!(10))));
        assert_eq!(queue.len(), 2);

        let token = CancellationToken::new();
        let first = queue.dequeue(&token).await.unwrap();
        assert_eq!(first.id, OpportunityId::new("d"));
        let second = queue.dequeue(&token).await.unwrap();
        assert_eq!(second.id, OpportunityId::new("b"));
    }

    #[tokio::test]
    async fn dequeue_returns_none_on_cancellation() {
        let queue = StrategyQueue::new(2);
        let token = CancellationToken::new();
        token.cancel();
        assert!(queue.dequeue(&token).await.is_none());
    }
}
