//! `PriceQuote` — the unit the Price Cache (C4) stores and scanners (C5) read.

use crate::ids::{ChainId, MonoTimestamp, TokenId, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub chain: ChainId,
    pub venue: VenueId,
    pub token_a: TokenId,
    pub token_b: TokenId,
    pub price: Decimal,
    pub liquidity: Decimal,
    /// The venue's own slippage estimate for this quote, straight from
    /// `VenueAdapter::quote`'s `Quote.price_impact` — not re-derived.
    pub price_impact: Decimal,
    pub ts: MonoTimestamp,
}

impl PriceQuote {
    /// `now - ts > ttl`, per §3's staleness rule.
    pub fn is_stale(&self, now: MonoTimestamp, ttl: Duration) -> bool {
        self.ts.elapsed_since(now) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_when_older_than_ttl() {
        let q = PriceQuote {
            chain: ChainId::new("ethereum"),
            venue: VenueId::new("uniswap"),
            token_a: TokenId::new("WETH"),
            token_b: TokenId::new("USDC"),
            price: Decimal::ONE,
            liquidity: Decimal::ONE,
            price_impact: Decimal::ZERO,
            ts: MonoTimestamp::from_nanos(0),
        };
        let ttl = Duration::from_secs(120);
        assert!(!q.is_stale(MonoTimestamp::from_nanos(ttl.as_nanos() as u64), ttl));
        assert!(q.is_stale(
            MonoTimestamp::from_nanos(ttl.as_nanos() as u64 + 1),
            ttl
        ));
    }
}
