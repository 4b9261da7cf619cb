//! `ChainAdapter` (C2, consumed) — nonce, gas, balance, tx submit, receipt
//! wait. The core treats `OpaqueTx` and `OpaqueSigner` as opaque; address
//! and ABI details are the adapter's concern (§6.1).

use crate::error::AdapterError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use types::TokenId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueTx(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueSigner(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxRef(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub status: ReceiptStatus,
    pub gas_used: u64,
    pub block_number: u64,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy {
        price: Decimal,
    },
    Eip1559 {
        base: Decimal,
        max_fee: Decimal,
        priority: Decimal,
    },
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn initialize(&self) -> Result<(), AdapterError>;
    async fn shutdown(&self) -> Result<(), AdapterError>;
    async fn get_balance(&self, token: &TokenId, wallet: &str) -> Result<Decimal, AdapterError>;
    async fn get_gas_price(&self) -> Result<GasPrice, AdapterError>;
    async fn estimate_gas(&self, tx: &OpaqueTx) -> Result<u64, AdapterError>;
    async fn send_transaction(
        &self,
        tx: OpaqueTx,
        signer: &OpaqueSigner,
    ) -> Result<TxRef, AdapterError>;
    async fn wait_for_receipt(
        &self,
        tx_ref: &TxRef,
        deadline: Duration,
    ) -> Result<Receipt, AdapterError>;
    async fn current_block(&self) -> Result<u64, AdapterError>;
    async fn is_healthy(&self) -> bool;
}
