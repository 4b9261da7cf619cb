//! USD valuation as an injected oracle, per the §9 Open Question decision:
//! if no oracle can price an asset, risk gates that need USD fail closed
//! rather than fabricate a constant.

use async_trait::async_trait;
use rust_decimal::Decimal;
use types::TokenId;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// `None` means "cannot price this token right now" — callers must
    /// treat that as a hard rejection, never substitute a guess.
    async fn usd_price(&self, token: &TokenId) -> Option<Decimal>;
}
