//! # External collaborator traits
//!
//! ## Purpose
//!
//! Everything the core depends on but does not implement: chain RPC and
//! signing (`ChainAdapter`), DEX quoting (`VenueAdapter`), USD valuation
//! (`PriceOracle`), and terminal-result fan-out (`NotificationSink`). The
//! core holds these behind `Arc<dyn Trait>`; real implementations (ethers
//! clients, DEX SDKs, chat-bot webhooks) are out of scope and live outside
//! this workspace.
//!
//! `testing` provides in-memory implementations of every trait so the core
//! can be exercised end-to-end without real chain I/O.

pub mod chain;
pub mod error;
pub mod notify;
pub mod oracle;
pub mod testing;
pub mod venue;

pub use chain::{ChainAdapter, GasPrice, OpaqueSigner, OpaqueTx, Receipt, ReceiptStatus, TxRef};
pub use error::AdapterError;
pub use notify::{LoggingSink, NotificationSink};
pub use oracle::PriceOracle;
pub use venue::{Quote, SwapDirection, VenueAdapter};
