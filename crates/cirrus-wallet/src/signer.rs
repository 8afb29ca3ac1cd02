//! Per-input transaction signing.
//!
//! Each input is signed with the key whose pubkey hash matches the spent
//! output's destination, then verified before the next input is touched.

use tracing::debug;

use cirrus_core::crypto::{sign_transaction_input, verify_transaction_input};
use cirrus_core::traits::KeyStore;
use cirrus_core::types::{Hash256, Transaction, UnspentOutput};

use crate::builder::{CandidateTransaction, TransactionPlan};
use crate::error::WalletError;
use crate::ledger::Reservation;

/// A fully signed transaction with its txid and the reservation covering
/// its inputs.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: Transaction,
    txid: Hash256,
    inputs: Vec<UnspentOutput>,
    fee: u64,
    amount_sent: u64,
    change_index: Option<u32>,
    memo: Option<String>,
    reservation: Reservation,
}

impl SignedTransaction {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    pub fn inputs(&self) -> &[UnspentOutput] {
        &self.inputs
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn amount_sent(&self) -> u64 {
        self.amount_sent
    }

    pub fn change_index(&self) -> Option<u32> {
        self.change_index
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }
}

pub struct Signer;

impl Signer {
    /// Sign every input of `candidate`.
    ///
    /// The candidate is left untouched so the caller can release its
    /// reservation on failure.
    pub fn sign(
        candidate: &CandidateTransaction,
        keys: &dyn KeyStore,
    ) -> Result<SignedTransaction, WalletError> {
        let plan = candidate.plan();
        let tx = sign_plan(plan, keys)?;
        let txid = tx.txid()?;
        debug!(%txid, inputs = tx.inputs.len(), "transaction signed");

        Ok(SignedTransaction {
            tx,
            txid,
            inputs: plan.inputs.clone(),
            fee: plan.fee,
            amount_sent: plan.amount_sent,
            change_index: plan.change_index,
            memo: plan.memo.clone(),
            reservation: candidate.reservation().clone(),
        })
    }
}

/// Sign a plan's transaction without a reservation.
pub fn sign_plan(plan: &TransactionPlan, keys: &dyn KeyStore) -> Result<Transaction, WalletError> {
    let mut tx = plan.tx.clone();
    if tx.inputs.len() != plan.inputs.len() {
        return Err(WalletError::SignatureFailure(format!(
            "{} inputs but {} spent outputs",
            tx.inputs.len(),
            plan.inputs.len()
        )));
    }

    for (i, spent) in plan.inputs.iter().enumerate() {
        let destination = spent.destination();
        let keypair = keys
            .lookup_key(destination)
            .ok_or_else(|| WalletError::MissingKey(destination.to_string()))?;

        sign_transaction_input(&mut tx, i, &keypair)
            .map_err(|e| WalletError::SignatureFailure(format!("input {i}: {e}")))?;
        verify_transaction_input(&tx, i, destination)
            .map_err(|e| WalletError::SignatureFailure(format!("input {i}: {e}")))?;
    }
    Ok(tx)
}
