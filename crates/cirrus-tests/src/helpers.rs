//! Shared fixtures: scripted relays, failing stores, funded wallets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use cirrus_core::address::{Address, Network};
use cirrus_core::error::StoreError;
use cirrus_core::record::{TransactionRecord, TxStatus};
use cirrus_core::traits::{FeePolicy, Relay, RelayOutcome, TransactionStore};
use cirrus_core::types::{Hash256, OutPoint, Transaction, TxOutput, UnspentOutput};
use cirrus_wallet::{
    MemoryTransactionStore, PaymentRequest, Seed, SharedKeyChain, UtxoLedger, Wallet, WalletConfig,
};

/// Height at which fixture outputs confirm.
pub const FUNDING_HEIGHT: u64 = 1;

/// Chain tip used by fixtures.
pub const TIP_HEIGHT: u64 = 10;

/// Simple pubkey hash from a seed byte.
pub fn pkh(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// External mainnet address not owned by any fixture key chain.
pub fn external(seed: u8) -> Address {
    Address::from_pubkey_hash(pkh(seed), Network::Mainnet)
}

pub fn pay(seed: u8, amount: u64) -> PaymentRequest {
    PaymentRequest::new(external(seed), amount)
}

/// Unspent output locked to `owner` with a distinct outpoint per `index`.
pub fn utxo(index: u32, value: u64, owner: Hash256) -> UnspentOutput {
    let mut txid = [0u8; 32];
    txid[..4].copy_from_slice(&index.to_le_bytes());
    txid[31] = 0xF0;
    UnspentOutput {
        outpoint: OutPoint::new(Hash256(txid), u64::from(index % 3)),
        output: TxOutput { value, pubkey_hash: owner },
        block_height: FUNDING_HEIGHT,
        is_coinbase: false,
    }
}

/// Config with a small dust threshold so change outputs are kept.
pub fn test_config() -> WalletConfig {
    WalletConfig {
        dust_threshold: 1,
        min_confirmations: 1,
        ..WalletConfig::default()
    }
}

/// Relay with a switchable outcome that records every broadcast.
pub struct RecordingRelay {
    outcome: Mutex<RelayOutcome>,
    sent: Mutex<Vec<Transaction>>,
}

impl RecordingRelay {
    pub fn new(outcome: RelayOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(RelayOutcome::Accepted)
    }

    pub fn unreachable() -> Self {
        Self::new(RelayOutcome::Unreachable("no peers".into()))
    }

    pub fn set_outcome(&self, outcome: RelayOutcome) {
        *self.outcome.lock() = outcome;
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Relay for RecordingRelay {
    fn broadcast(&self, tx: &Transaction) -> RelayOutcome {
        self.sent.lock().push(tx.clone());
        self.outcome.lock().clone()
    }
}

/// Store whose writes always fail; reads see nothing.
pub struct FailingStore;

impl TransactionStore for FailingStore {
    fn record_transaction(&self, _: &TransactionRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }

    fn update_status(&self, txid: &Hash256, _: TxStatus) -> Result<(), StoreError> {
        Err(StoreError::NotFound(txid.to_string()))
    }

    fn record_relay_attempt(&self, txid: &Hash256, _: &str) -> Result<(), StoreError> {
        Err(StoreError::NotFound(txid.to_string()))
    }

    fn get(&self, _: &Hash256) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(None)
    }

    fn all(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(Vec::new())
    }
}

/// A wallet plus handles on its collaborators.
pub struct TestWallet {
    pub wallet: Arc<Wallet>,
    pub ledger: Arc<UtxoLedger>,
    pub keys: Arc<SharedKeyChain>,
    pub relay: Arc<RecordingRelay>,
    next_index: AtomicU32,
}

impl TestWallet {
    /// Wallet with a memory store, flat fee, and accepting relay.
    pub fn new(fee: u64) -> Self {
        Self::with(
            Arc::new(RecordingRelay::accepting()),
            Arc::new(MemoryTransactionStore::new()),
            Arc::new(move |_: usize| fee),
        )
    }

    pub fn with(
        relay: Arc<RecordingRelay>,
        store: Arc<dyn TransactionStore>,
        fee_policy: Arc<dyn FeePolicy>,
    ) -> Self {
        let ledger = Arc::new(UtxoLedger::new());
        ledger.set_tip_height(TIP_HEIGHT);
        let keys = Arc::new(SharedKeyChain::from_seed(
            Seed::from_bytes([0x5E; 32]),
            Network::Mainnet,
        ));
        let wallet = Arc::new(Wallet::new(
            ledger.clone(),
            keys.clone(),
            relay.clone(),
            store,
            fee_policy,
            test_config(),
        ));
        Self {
            wallet,
            ledger,
            keys,
            relay,
            next_index: AtomicU32::new(0),
        }
    }

    /// Credit one owned output per value, each to a fresh address.
    pub fn fund(&self, values: &[u64]) -> Vec<UnspentOutput> {
        values
            .iter()
            .map(|value| {
                let owner = self.keys.next_address().pubkey_hash();
                let index = self.next_index.fetch_add(1, Ordering::Relaxed);
                let u = utxo(index, *value, owner);
                assert!(self.wallet.receive(u.clone()), "fixture output rejected");
                u
            })
            .collect()
    }
}
