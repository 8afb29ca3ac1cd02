//! Wallet composition: ledger, keys, relay, history, fee policy.
//!
//! A [`Wallet`] is an explicit instance shared by reference (usually behind
//! an `Arc`) between threads. The ledger is its only mutable shared state.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use cirrus_core::address::Address;
use cirrus_core::error::AddressError;
use cirrus_core::record::{TransactionRecord, TxStatus};
use cirrus_core::traits::{FeePolicy, KeyStore, Relay, TransactionStore};
use cirrus_core::types::{Hash256, OutPoint, TxOutput, UnspentOutput};

use crate::builder::{PaymentRequest, TransactionBuilder};
use crate::commit::{CommitPipeline, CommitReceipt, CommitState};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::ledger::UtxoLedger;
use crate::rebroadcast::{self, RebroadcastReport};
use crate::signer::Signer;

/// Balance summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletBalance {
    /// Value of outputs free for new builds, in units.
    pub available: u64,
    /// Value of outputs held by in-flight builds.
    pub reserved: u64,
    pub reserved_count: usize,
    /// Amount plus fee of committed transactions not yet relayed.
    pub pending_outgoing: u64,
    pub utxo_count: usize,
}

pub struct Wallet {
    ledger: Arc<UtxoLedger>,
    keys: Arc<dyn KeyStore>,
    relay: Arc<dyn Relay>,
    store: Arc<dyn TransactionStore>,
    fee_policy: Arc<dyn FeePolicy>,
    config: WalletConfig,
}

impl Wallet {
    pub fn new(
        ledger: Arc<UtxoLedger>,
        keys: Arc<dyn KeyStore>,
        relay: Arc<dyn Relay>,
        store: Arc<dyn TransactionStore>,
        fee_policy: Arc<dyn FeePolicy>,
        config: WalletConfig,
    ) -> Self {
        Self {
            ledger,
            keys,
            relay,
            store,
            fee_policy,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<UtxoLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Pay `requests` and return the txid.
    ///
    /// A relay failure after commit is not an error: the transaction stays
    /// `PendingRelay` and is retried by [`Wallet::rebroadcast_pending`].
    pub fn build_and_send(&self, requests: &[PaymentRequest]) -> Result<Hash256, WalletError> {
        self.send(requests, None).map(|receipt| receipt.txid)
    }

    pub fn build_and_send_with_memo(
        &self,
        requests: &[PaymentRequest],
        memo: &str,
    ) -> Result<Hash256, WalletError> {
        self.send(requests, Some(memo)).map(|receipt| receipt.txid)
    }

    /// Build, sign, and commit, returning the full receipt.
    #[instrument(skip_all, fields(payments = requests.len()))]
    pub fn send(
        &self,
        requests: &[PaymentRequest],
        memo: Option<&str>,
    ) -> Result<CommitReceipt, WalletError> {
        let mut builder = TransactionBuilder::new(&self.config);
        builder.add_payments(requests);
        if let Some(memo) = memo {
            builder.set_memo(memo);
        }
        // Before a change key is derived.
        builder.validate()?;

        let change = self.keys.change_destination();
        let candidate = builder.build(&self.ledger, change, self.fee_policy.as_ref())?;

        let pipeline = CommitPipeline::new(&self.ledger, self.store.as_ref(), self.relay.as_ref());
        let signed = match Signer::sign(&candidate, self.keys.as_ref()) {
            Ok(signed) => signed,
            Err(e) => {
                let state = pipeline.roll_back(candidate.reservation());
                warn!(error = %e, %state, "signing failed");
                return Err(e);
            }
        };
        info!(txid = %signed.txid(), state = %CommitState::Signed, "ready to commit");

        pipeline.commit(signed)
    }

    /// Sum of outputs free for new builds.
    pub fn available_balance(&self) -> u64 {
        self.ledger.available_balance()
    }

    pub fn balance(&self) -> Result<WalletBalance, WalletError> {
        let pending_outgoing = self
            .store
            .pending()?
            .iter()
            .fold(0u64, |acc, r| {
                acc.saturating_add(r.amount_sent).saturating_add(r.fee)
            });
        Ok(WalletBalance {
            available: self.ledger.available_balance(),
            reserved: self.ledger.reserved_balance(),
            reserved_count: self.ledger.reserved_count(),
            pending_outgoing,
            utxo_count: self.ledger.len(),
        })
    }

    /// Credit an output paying this wallet. Outputs to keys the wallet does
    /// not own are ignored. Returns whether the ledger changed.
    pub fn receive(&self, utxo: UnspentOutput) -> bool {
        if !self.keys.owns(utxo.destination()) {
            return false;
        }
        self.ledger.insert(utxo)
    }

    /// Record that `txid` confirmed at `block_height` and credit its change.
    pub fn mark_confirmed(&self, txid: &Hash256, block_height: u64) -> Result<(), WalletError> {
        let record = self.record(txid)?;
        self.store
            .update_status(txid, TxStatus::Confirmed { block_height })?;

        if let Some(index) = record.change_index {
            if let Some(output) = record.tx.outputs.get(index as usize) {
                self.receive(change_output(txid, index, output, block_height));
            }
        }
        info!(%txid, block_height, "transaction confirmed");
        Ok(())
    }

    pub fn set_tip_height(&self, height: u64) {
        self.ledger.set_tip_height(height);
    }

    pub fn transaction(&self, txid: &Hash256) -> Result<Option<TransactionRecord>, WalletError> {
        Ok(self.store.get(txid)?)
    }

    pub fn transaction_status(&self, txid: &Hash256) -> Result<TxStatus, WalletError> {
        Ok(self.record(txid)?.status)
    }

    /// All wallet transactions, oldest first.
    pub fn history(&self) -> Result<Vec<TransactionRecord>, WalletError> {
        Ok(self.store.all()?)
    }

    pub fn rebroadcast_pending(&self) -> Result<RebroadcastReport, WalletError> {
        rebroadcast::rebroadcast_pending(self.store.as_ref(), self.relay.as_ref())
    }

    /// Re-send one transaction; relay failures are returned as errors.
    pub fn rebroadcast(&self, txid: &Hash256) -> Result<TxStatus, WalletError> {
        rebroadcast::rebroadcast_one(self.store.as_ref(), self.relay.as_ref(), txid)
    }

    /// Parse `address` and check it belongs to this wallet's network.
    pub fn parse_address(&self, address: &str) -> Result<Address, WalletError> {
        let parsed: Address = address.parse()?;
        if parsed.network() != self.config.network {
            return Err(WalletError::InvalidAddress(AddressError::WrongNetwork {
                expected: self.config.network,
                found: parsed.network(),
            }));
        }
        Ok(parsed)
    }

    fn record(&self, txid: &Hash256) -> Result<TransactionRecord, WalletError> {
        self.store
            .get(txid)?
            .ok_or_else(|| WalletError::UnknownTransaction(txid.to_string()))
    }
}

fn change_output(txid: &Hash256, index: u32, output: &TxOutput, block_height: u64) -> UnspentOutput {
    UnspentOutput {
        outpoint: OutPoint::new(*txid, u64::from(index)),
        output: output.clone(),
        block_height,
        is_coinbase: false,
    }
}
