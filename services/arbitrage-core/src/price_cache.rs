//! # Price Cache (C4)
//!
//! ## Purpose
//!
//! Per-`(chain, venue, pair)` last quote and timestamp, read by every
//! scanner on every tick. Rationale from §4.1: scanners need low-latency
//! reads; a single coarse lock is acceptable given write frequency
//! (O(100ms) per chain-venue), but we use `DashMap`'s per-shard locking
//! over a single coarse `Mutex<HashMap>` since that is the teacher's
//! preferred concurrent map type for exactly this access pattern
//! (`pool_cache.rs`).

use dashmap::DashMap;
use std::time::Duration;
use types::{ChainId, MonoTimestamp, PriceQuote, TokenId, VenueId};

pub type PairKey = (TokenId, TokenId);

#[derive(Hash, PartialEq, Eq, Clone)]
struct CacheKey {
    chain: ChainId,
    venue: VenueId,
    pair: PairKey,
}

/// Shared-read, scanner-write (§3 Ownership).
pub struct PriceCache {
    quotes: DashMap<CacheKey, PriceQuote>,
    freshness_ttl: Duration,
}

impl PriceCache {
    pub fn new(freshness_ttl: Duration) -> Self {
        Self {
            quotes: DashMap::new(),
            freshness_ttl,
        }
    }

    /// Overwrites; no ordering guarantee between concurrent writers to
    /// distinct keys, atomic for the same key.
    pub fn put(&self, chain: ChainId, venue: VenueId, pair: PairKey, quote: PriceQuote) {
        self.quotes.insert(
            CacheKey {
                chain,
                venue,
                pair,
            },
            quote,
        );
    }

    /// Lazily expires: returns `None` if the stored quote is older than
    /// `freshness_ttl`.
    pub fn get(
        &self,
        chain: &ChainId,
        venue: &VenueId,
        pair: &PairKey,
        now: MonoTimestamp,
    ) -> Option<PriceQuote> {
        let key = CacheKey {
            chain: chain.clone(),
            venue: venue.clone(),
            pair: pair.clone(),
        };
        let entry = self.quotes.get(&key)?;
        if entry.is_stale(now, self.freshness_ttl) {
            None
        } else {
            Some(entry.clone())
        }
    }

    /// A coherent `venue -> quote` map for `(chain, pair)`; each entry read
    /// is atomic with respect to its own writer, though the snapshot as a
    /// whole is not a single global lock (per the "coarse lock acceptable"
    /// rationale, fine-grained is strictly better here).
    pub fn snapshot(
        &self,
        chain: &ChainId,
        pair: &PairKey,
        now: MonoTimestamp,
    ) -> Vec<(VenueId, PriceQuote)> {
        self.quotes
            .iter()
            .filter(|entry| &entry.key().chain == chain && &entry.key().pair == pair)
            .filter(|entry| !entry.value().is_stale(now, self.freshness_ttl))
            .map(|entry| (entry.key().venue.clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(price: rust_decimal::Decimal, ts: u64) -> PriceQuote {
        PriceQuote {
            chain: ChainId::new("ethereum"),
            venue: VenueId::new("uniswap"),
            token_a: TokenId::new("WETH"),
            token_b: TokenId::new("USDC"),
            price,
            liquidity: dec!(100000),
            price_impact: dec!(0.001),
            ts: MonoTimestamp::from_nanos(ts),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = PriceCache::new(Duration::from_secs(120));
        let chain = ChainId::new("ethereum");
        let venue = VenueId::new("uniswap");
        let pair = (TokenId::new("WETH"), TokenId::new("USDC"));
        cache.put(chain.clone(), venue.clone(), pair.clone(), quote(dec!(100), 0));
        let got = cache.get(&chain, &venue, &pair, MonoTimestamp::from_nanos(1));
        assert_eq!(got.unwrap().price, dec!(100));
    }

    #[test]
    fn get_returns_none_when_stale() {
        let ttl = Duration::from_secs(1);
        let cache = PriceCache::new(ttl);
        let chain = ChainId::new("ethereum");
        let venue = VenueId::new("uniswap");
        let pair = (TokenId::new("WETH"), TokenId::new("USDC"));
        cache.put(chain.clone(), venue.clone(), pair.clone(), quote(dec!(100), 0));
        let later = MonoTimestamp::from_nanos(ttl.as_nanos() as u64 + 1);
        assert!(cache.get(&chain, &venue, &pair, later).is_none());
    }

    #[test]
    fn snapshot_collects_all_venues_for_pair() {
        let cache = PriceCache::new(Duration::from_secs(120));
        let chain = ChainId::new("ethereum");
        let pair = (TokenId::new("WETH"), TokenId::new("USDC"));
        cache.put(
            chain.clone(),
            VenueId::new("uniswap"),
            pair.clone(),
            quote(dec!(100), 0),
        );
        cache.put(
            chain.clone(),
            VenueId::new("sushiswap"),
            pair.clone(),
            quote(dec!(101), 0),
        );
        let snap = cache.snapshot(&chain, &pair, MonoTimestamp::from_nanos(1));
        assert_eq!(snap.len(), 2);
    }
}
