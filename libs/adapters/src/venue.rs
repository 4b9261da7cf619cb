//! `VenueAdapter` (C3, consumed) — quote a pair, report liquidity, build an
//! opaque swap transaction (§6.2).

use crate::chain::OpaqueTx;
use crate::error::AdapterError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use types::{MonoTimestamp, TokenId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    AToB,
    BToA,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub price: Decimal,
    pub amount_out: Decimal,
    pub price_impact: Decimal,
}

#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Must complete within the caller-enforced `quoteDeadline`; the trait
    /// itself does not time out, callers wrap this in `tokio::time::timeout`.
    async fn quote(
        &self,
        token_a: &TokenId,
        token_b: &TokenId,
        amount_in: Decimal,
    ) -> Result<Quote, AdapterError>;

    async fn liquidity(&self, token_a: &TokenId, token_b: &TokenId) -> Result<Decimal, AdapterError>;

    async fn build_swap(
        &self,
        token_a: &TokenId,
        token_b: &TokenId,
        direction: SwapDirection,
        amount_in: Decimal,
        min_out: Decimal,
        recipient: &str,
        deadline: MonoTimestamp,
    ) -> Result<OpaqueTx, AdapterError>;
}
