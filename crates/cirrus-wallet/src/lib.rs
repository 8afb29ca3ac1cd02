//! # cirrus-wallet
//! Transaction construction engine: UTXO ledger with exclusive reservations,
//! deterministic coin selection, a bounded fee/size fixed point, per-input
//! signing, and a commit pipeline that never loses a spend to a relay failure.
//!
//! # Modules
//!
//! - [`ledger`]: `UtxoLedger`, reservations
//! - [`coin_selection`]: `CoinSelector`
//! - [`fee`]: `PerKilobyteFee`, size estimation
//! - [`builder`]: `TransactionBuilder`, `PaymentRequest`
//! - [`signer`]: `Signer`, `SignedTransaction`
//! - [`commit`]: `CommitPipeline`
//! - [`store`]: transaction history stores
//! - [`rebroadcast`]: pending relay retries and the background task
//! - [`keys`]: seed and key chain
//! - [`wallet`]: `Wallet` composition

pub mod builder;
pub mod coin_selection;
pub mod commit;
pub mod config;
pub mod error;
pub mod fee;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod rebroadcast;
pub mod signer;
pub mod store;
pub mod wallet;

pub use builder::{CandidateTransaction, PaymentRequest, TransactionBuilder, TransactionPlan};
pub use coin_selection::{CoinSelection, CoinSelector, SelectionTarget};
pub use commit::{CommitPipeline, CommitReceipt, CommitState};
pub use config::WalletConfig;
pub use error::WalletError;
pub use fee::{estimated_size, PerKilobyteFee};
pub use keys::{KeyChain, KeyChainData, Seed, SharedKeyChain};
pub use ledger::{Reservation, ReservationId, UtxoLedger};
pub use rebroadcast::{spawn_rebroadcaster, RebroadcastReport};
pub use signer::{SignedTransaction, Signer};
#[cfg(feature = "rocksdb")]
pub use store::RocksTransactionStore;
pub use store::MemoryTransactionStore;
pub use wallet::{Wallet, WalletBalance};
