//! Commit pipeline: ledger spend, durable record, relay.
//!
//! Order matters for crash safety. The spend is made final in the ledger
//! first, then the record is written as `PendingRelay`, then the transaction
//! is handed to the relay. A relay failure therefore never loses a spend:
//! the record stays pending and is picked up by the rebroadcaster.

use std::fmt;

use tracing::{error, info, warn};

use cirrus_core::record::{TransactionRecord, TxStatus};
use cirrus_core::traits::{Relay, RelayOutcome, TransactionStore};
use cirrus_core::types::Hash256;

use crate::error::WalletError;
use crate::ledger::{Reservation, UtxoLedger};
use crate::signer::SignedTransaction;

/// Where a build stands between planning and the ledger commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitState {
    /// Inputs reserved, not yet signed.
    Built,
    Signed,
    /// Inputs spent and the record written.
    Committed,
    /// Reservation released; the ledger is as before the build.
    RolledBack,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommitState::Built => "built",
            CommitState::Signed => "signed",
            CommitState::Committed => "committed",
            CommitState::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub txid: Hash256,
    /// `Relayed` if the first broadcast was accepted, otherwise `PendingRelay`.
    pub status: TxStatus,
    /// Reason the first broadcast failed, if it did.
    pub relay_error: Option<String>,
}

pub struct CommitPipeline<'a> {
    ledger: &'a UtxoLedger,
    store: &'a dyn TransactionStore,
    relay: &'a dyn Relay,
}

impl<'a> CommitPipeline<'a> {
    pub fn new(
        ledger: &'a UtxoLedger,
        store: &'a dyn TransactionStore,
        relay: &'a dyn Relay,
    ) -> Self {
        Self { ledger, store, relay }
    }

    /// Release a reservation that will not be committed.
    pub fn roll_back(&self, reservation: &Reservation) -> CommitState {
        if self.ledger.release(reservation) {
            info!(reservation = %reservation.id(), "build rolled back");
        }
        CommitState::RolledBack
    }

    /// Spend, persist, and relay `signed`.
    ///
    /// Fails before persistence only with the ledger rolled back. A
    /// [`WalletError::PersistenceFailure`] leaves the spend in place.
    /// Relay failures are not errors: the receipt carries `PendingRelay`.
    pub fn commit(&self, signed: SignedTransaction) -> Result<CommitReceipt, WalletError> {
        let txid = signed.txid();

        if let Err(e) = self.ledger.commit_spend(signed.reservation()) {
            let state = self.roll_back(signed.reservation());
            warn!(%txid, error = %e, %state, "ledger spend failed");
            return Err(e);
        }

        let record = TransactionRecord {
            txid,
            tx: signed.tx().clone(),
            spent: signed.reservation().outpoints().to_vec(),
            fee: signed.fee(),
            amount_sent: signed.amount_sent(),
            change_index: signed.change_index(),
            memo: signed.memo().map(str::to_string),
            status: TxStatus::PendingRelay,
            relay_attempts: 0,
            last_relay_error: None,
            created_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self.store.record_transaction(&record) {
            error!(
                %txid,
                error = %e,
                spent = ?record.spent,
                "inputs spent in ledger but transaction not persisted; manual reconciliation required"
            );
            return Err(WalletError::PersistenceFailure(e.to_string()));
        }
        info!(%txid, fee = record.fee, amount = record.amount_sent, state = %CommitState::Committed, "transaction committed");

        let (status, relay_error) = match self.relay.broadcast(signed.tx()) {
            RelayOutcome::Accepted => {
                if let Err(e) = self.store.update_status(&txid, TxStatus::Relayed) {
                    warn!(%txid, error = %e, "relayed but status update failed");
                }
                info!(%txid, "transaction relayed");
                (TxStatus::Relayed, None)
            }
            RelayOutcome::Rejected(reason) | RelayOutcome::Unreachable(reason) => {
                if let Err(e) = self.store.record_relay_attempt(&txid, &reason) {
                    warn!(%txid, error = %e, "failed to record relay attempt");
                }
                warn!(%txid, %reason, "relay failed; transaction left pending");
                (TxStatus::PendingRelay, Some(reason))
            }
        };

        Ok(CommitReceipt {
            txid,
            status,
            relay_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::address::{Address, Network};
    use cirrus_core::error::StoreError;
    use cirrus_core::types::{OutPoint, Transaction, TxOutput, UnspentOutput};
    use parking_lot::Mutex;

    use crate::builder::TransactionBuilder;
    use crate::config::WalletConfig;
    use crate::keys::{Seed, SharedKeyChain};
    use crate::signer::Signer;
    use crate::store::MemoryTransactionStore;
    use cirrus_core::traits::KeyStore;

    struct FixedRelay {
        outcome: RelayOutcome,
        sent: Mutex<Vec<Hash256>>,
    }

    impl FixedRelay {
        fn new(outcome: RelayOutcome) -> Self {
            Self { outcome, sent: Mutex::new(Vec::new()) }
        }
    }

    impl Relay for FixedRelay {
        fn broadcast(&self, tx: &Transaction) -> RelayOutcome {
            if let Ok(txid) = tx.txid() {
                self.sent.lock().push(txid);
            }
            self.outcome.clone()
        }
    }

    struct BrokenStore;

    impl TransactionStore for BrokenStore {
        fn record_transaction(&self, _: &TransactionRecord) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
        fn update_status(&self, _: &Hash256, _: TxStatus) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
        fn record_relay_attempt(&self, _: &Hash256, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
        fn get(&self, _: &Hash256) -> Result<Option<TransactionRecord>, StoreError> {
            Ok(None)
        }
        fn all(&self) -> Result<Vec<TransactionRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn signed(ledger: &UtxoLedger, keys: &SharedKeyChain) -> SignedTransaction {
        ledger.set_tip_height(10);
        let owner = keys.next_address().pubkey_hash();
        ledger.insert(UnspentOutput {
            outpoint: OutPoint::new(Hash256([1; 32]), 0),
            output: TxOutput { value: 100, pubkey_hash: owner },
            block_height: 1,
            is_coinbase: false,
        });
        let mut b = TransactionBuilder::new(&WalletConfig {
            dust_threshold: 1,
            ..WalletConfig::default()
        });
        b.add_payment(Address::from_pubkey_hash(Hash256([0x77; 32]), Network::Mainnet), 40);
        let candidate = b.build(ledger, keys.change_destination(), &|_: usize| 1u64).unwrap();
        Signer::sign(&candidate, keys).unwrap()
    }

    fn keys() -> SharedKeyChain {
        SharedKeyChain::from_seed(Seed::from_bytes([8; 32]), Network::Mainnet)
    }

    #[test]
    fn accepted_is_relayed() {
        let (ledger, store, keys) = (UtxoLedger::new(), MemoryTransactionStore::new(), keys());
        let relay = FixedRelay::new(RelayOutcome::Accepted);
        let s = signed(&ledger, &keys);
        let spent = s.reservation().outpoints().to_vec();

        let receipt = CommitPipeline::new(&ledger, &store, &relay).commit(s).unwrap();
        assert_eq!(receipt.status, TxStatus::Relayed);
        assert!(ledger.is_spent(&spent[0]));
        let record = store.get(&receipt.txid).unwrap().unwrap();
        assert_eq!(record.status, TxStatus::Relayed);
        assert_eq!(record.fee, 1);
        assert_eq!(record.change_value(), 59);
        assert_eq!(relay.sent.lock().as_slice(), &[receipt.txid]);
    }

    #[test]
    fn unreachable_stays_pending_and_spent() {
        let (ledger, store, keys) = (UtxoLedger::new(), MemoryTransactionStore::new(), keys());
        let relay = FixedRelay::new(RelayOutcome::Unreachable("no peers".into()));
        let s = signed(&ledger, &keys);
        let spent = s.reservation().outpoints().to_vec();

        let receipt = CommitPipeline::new(&ledger, &store, &relay).commit(s).unwrap();
        assert_eq!(receipt.status, TxStatus::PendingRelay);
        assert_eq!(receipt.relay_error.as_deref(), Some("no peers"));
        assert!(ledger.is_spent(&spent[0]));

        let record = store.get(&receipt.txid).unwrap().unwrap();
        assert_eq!(record.status, TxStatus::PendingRelay);
        assert_eq!(record.relay_attempts, 1);
    }

    #[test]
    fn rejected_stays_pending() {
        let (ledger, store, keys) = (UtxoLedger::new(), MemoryTransactionStore::new(), keys());
        let relay = FixedRelay::new(RelayOutcome::Rejected("policy".into()));
        let receipt = CommitPipeline::new(&ledger, &store, &relay)
            .commit(signed(&ledger, &keys))
            .unwrap();
        assert_eq!(receipt.status, TxStatus::PendingRelay);
        assert_eq!(store.pending().unwrap().len(), 1);
    }

    #[test]
    fn persistence_failure_keeps_spend() {
        let (ledger, keys) = (UtxoLedger::new(), keys());
        let relay = FixedRelay::new(RelayOutcome::Accepted);
        let s = signed(&ledger, &keys);
        let spent = s.reservation().outpoints().to_vec();

        let err = CommitPipeline::new(&ledger, &BrokenStore, &relay).commit(s).unwrap_err();
        assert!(err.requires_reconciliation());
        assert!(ledger.is_spent(&spent[0]));
        assert!(relay.sent.lock().is_empty());
    }

    #[test]
    fn released_reservation_cannot_commit() {
        let (ledger, store, keys) = (UtxoLedger::new(), MemoryTransactionStore::new(), keys());
        let relay = FixedRelay::new(RelayOutcome::Accepted);
        let s = signed(&ledger, &keys);
        let pipeline = CommitPipeline::new(&ledger, &store, &relay);
        assert_eq!(pipeline.roll_back(s.reservation()), CommitState::RolledBack);

        let spent = s.reservation().outpoints().to_vec();
        let err = pipeline.commit(s).unwrap_err();
        assert!(matches!(err, WalletError::LedgerConflict { .. }));
        assert!(!ledger.is_spent(&spent[0]));
        assert!(store.is_empty());
    }
}
