//! In-memory test doubles for [`ChainAdapter`], [`VenueAdapter`] and
//! [`PriceOracle`], used by the core's integration tests to exercise the
//! pipeline without real chain I/O (§6.1/§6.2 "test doubles... for
//! exercising the core").

use crate::chain::{ChainAdapter, GasPrice, OpaqueSigner, OpaqueTx, Receipt, ReceiptStatus, TxRef};
use crate::error::AdapterError;
use crate::oracle::PriceOracle;
use crate::venue::{Quote, SwapDirection, VenueAdapter};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::{MonoTimestamp, TokenId};

/// A [`ChainAdapter`] backed by in-memory state; healthiness and receipt
/// outcomes are controlled directly by the test.
pub struct InMemoryChainAdapter {
    healthy: Arc<std::sync::atomic::AtomicBool>,
    block: AtomicU64,
    balances: RwLock<HashMap<String, Decimal>>,
    next_receipt: Mutex<ReceiptStatus>,
    sent: Mutex<Vec<TxRef>>,
    next_tx_id: AtomicU64,
}

impl InMemoryChainAdapter {
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            block: AtomicU64::new(1),
            balances: RwLock::new(HashMap::new()),
            next_receipt: Mutex::new(ReceiptStatus::Success),
            sent: Mutex::new(Vec::new()),
            next_tx_id: AtomicU64::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_balance(&self, token: &TokenId, amount: Decimal) {
        self.balances.write().insert(token.as_str().to_string(), amount);
    }

    /// Every subsequent `wait_for_receipt` call returns this status until
    /// changed again.
    pub fn set_next_receipt(&self, status: ReceiptStatus) {
        *self.next_receipt.lock() = status;
    }

    pub fn sent_transactions(&self) -> Vec<TxRef> {
        self.sent.lock().clone()
    }
}

impl Default for InMemoryChainAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainAdapter for InMemoryChainAdapter {
    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_balance(&self, token: &TokenId, _wallet: &str) -> Result<Decimal, AdapterError> {
        Ok(self
            .balances
            .read()
            .get(token.as_str())
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_gas_price(&self) -> Result<GasPrice, AdapterError> {
        Ok(GasPrice::Legacy {
            price: Decimal::new(2, 1),
        })
    }

    async fn estimate_gas(&self, _tx: &OpaqueTx) -> Result<u64, AdapterError> {
        Ok(150_000)
    }

    async fn send_transaction(
        &self,
        _tx: OpaqueTx,
        _signer: &OpaqueSigner,
    ) -> Result<TxRef, AdapterError> {
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let tx_ref = TxRef(format!("0xfake{id}"));
        self.sent.lock().push(tx_ref.clone());
        Ok(tx_ref)
    }

    async fn wait_for_receipt(
        &self,
        _tx_ref: &TxRef,
        _deadline: Duration,
    ) -> Result<Receipt, AdapterError> {
        let status = *self.next_receipt.lock();
        Ok(Receipt {
            status,
            gas_used: 120_000,
            block_number: self.block.fetch_add(1, Ordering::SeqCst),
            logs: Vec::new(),
        })
    }

    async fn current_block(&self) -> Result<u64, AdapterError> {
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// A [`VenueAdapter`] whose quotes are set directly by the test, keyed by
/// `(token_a, token_b)`.
pub struct InMemoryVenueAdapter {
    quotes: RwLock<HashMap<(String, String), Quote>>,
    liquidity: RwLock<HashMap<(String, String), Decimal>>,
}

impl InMemoryVenueAdapter {
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            liquidity: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_quote(&self, a: &TokenId, b: &TokenId, quote: Quote) {
        self.quotes
            .write()
            .insert((a.as_str().to_string(), b.as_str().to_string()), quote);
    }

    pub fn set_liquidity(&self, a: &TokenId, b: &TokenId, amount_usd: Decimal) {
        self.liquidity
            .write()
            .insert((a.as_str().to_string(), b.as_str().to_string()), amount_usd);
    }
}

impl Default for InMemoryVenueAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for InMemoryVenueAdapter {
    async fn quote(
        &self,
        token_a: &TokenId,
        token_b: &TokenId,
        _amount_in: Decimal,
    ) -> Result<Quote, AdapterError> {
        self.quotes
            .read()
            .get(&(token_a.as_str().to_string(), token_b.as_str().to_string()))
            .cloned()
            .ok_or_else(|| AdapterError::QuoteUnavailable {
                venue: "in-memory".to_string(),
                pair: format!("{token_a}/{token_b}"),
            })
    }

    async fn liquidity(&self, token_a: &TokenId, token_b: &TokenId) -> Result<Decimal, AdapterError> {
        Ok(self
            .liquidity
            .read()
            .get(&(token_a.as_str().to_string(), token_b.as_str().to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn build_swap(
        &self,
        _token_a: &TokenId,
        _token_b: &TokenId,
        _direction: SwapDirection,
        _amount_in: Decimal,
        _min_out: Decimal,
        _recipient: &str,
        _deadline: MonoTimestamp,
    ) -> Result<OpaqueTx, AdapterError> {
        Ok(OpaqueTx(vec![0xde, 0xad, 0xbe, 0xef]))
    }
}

/// A [`PriceOracle`] with a fixed price table; tokens absent from the table
/// price as `None`, exercising the fail-closed path.
pub struct StaticOracle {
    prices: HashMap<String, Decimal>,
}

impl StaticOracle {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn usd_price(&self, token: &TokenId) -> Option<Decimal> {
        self.prices.get(token.as_str()).copied()
    }
}
