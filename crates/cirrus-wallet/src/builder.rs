//! Transaction builder with a bounded fee/size fixed point.
//!
//! 1. Add payments (address + amount), optionally a memo and lock time
//! 2. [`TransactionBuilder::plan`] validates the payments and converges on a
//!    fee-correct unsigned transaction over a snapshot of available outputs
//! 3. [`TransactionBuilder::build`] plans against the ledger and reserves the
//!    chosen inputs

use std::collections::HashSet;

use tracing::{debug, info};

use cirrus_core::address::Address;
use cirrus_core::constants::{
    MAX_INPUTS, MAX_MONEY, MAX_OUTPUTS, MAX_TX_SIZE, PUBLIC_KEY_LEN, SIGNATURE_LEN, TX_VERSION,
};
use cirrus_core::error::TransactionError;
use cirrus_core::traits::FeePolicy;
use cirrus_core::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput, UnspentOutput};

use crate::coin_selection::{CoinSelector, SelectionTarget};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::ledger::{Reservation, UtxoLedger};

/// A single payment: destination address and amount in units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub destination: Address,
    pub amount: u64,
}

impl PaymentRequest {
    pub fn new(destination: Address, amount: u64) -> Self {
        Self { destination, amount }
    }
}

/// A converged, unsigned transaction and the inputs it spends.
///
/// Outputs are the payments in request order followed by the change output,
/// if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    pub tx: Transaction,
    /// Spent outputs, aligned with `tx.inputs`.
    pub inputs: Vec<UnspentOutput>,
    pub fee: u64,
    /// Serialized size of the signed transaction.
    pub size: usize,
    /// Fee rounds taken to converge.
    pub rounds: u32,
    /// Sum of payment amounts.
    pub amount_sent: u64,
    pub change_index: Option<u32>,
    pub memo: Option<String>,
}

impl TransactionPlan {
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|u| u.value()).sum()
    }

    pub fn change_value(&self) -> u64 {
        self.change_index
            .and_then(|i| self.tx.outputs.get(i as usize))
            .map(|o| o.value)
            .unwrap_or(0)
    }

    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.inputs.iter().map(|u| u.outpoint.clone()).collect()
    }
}

/// A plan whose inputs are reserved in the ledger.
///
/// The reservation must be committed or released by the holder.
#[derive(Debug)]
pub struct CandidateTransaction {
    plan: TransactionPlan,
    reservation: Reservation,
}

impl CandidateTransaction {
    pub fn plan(&self) -> &TransactionPlan {
        &self.plan
    }

    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }

    pub fn into_parts(self) -> (TransactionPlan, Reservation) {
        (self.plan, self.reservation)
    }
}

/// Builder for fee-correct payment transactions.
///
/// # Example
/// ```ignore
/// let mut builder = TransactionBuilder::new(&config);
/// builder.add_payment(address, 5 * COIN).set_memo("rent");
/// let candidate = builder.build(&ledger, change, &fee_policy)?;
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    payments: Vec<PaymentRequest>,
    memo: Option<String>,
    lock_time: u64,
    dust_threshold: u64,
    max_fee_rounds: u32,
    min_confirmations: u64,
}

impl TransactionBuilder {
    pub fn new(config: &WalletConfig) -> Self {
        Self {
            payments: Vec::new(),
            memo: None,
            lock_time: 0,
            dust_threshold: config.dust_threshold,
            max_fee_rounds: config.max_fee_rounds,
            min_confirmations: config.min_confirmations,
        }
    }

    pub fn add_payment(&mut self, destination: Address, amount: u64) -> &mut Self {
        self.payments.push(PaymentRequest::new(destination, amount));
        self
    }

    pub fn add_payments(&mut self, payments: &[PaymentRequest]) -> &mut Self {
        self.payments.extend_from_slice(payments);
        self
    }

    /// Free-text note stored with the wallet record; not part of the transaction.
    pub fn set_memo(&mut self, memo: impl Into<String>) -> &mut Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn set_lock_time(&mut self, lock_time: u64) -> &mut Self {
        self.lock_time = lock_time;
        self
    }

    pub fn payments(&self) -> &[PaymentRequest] {
        &self.payments
    }

    /// Check the payment list. Returns the total amount.
    pub fn validate(&self) -> Result<u64, WalletError> {
        if self.payments.is_empty() {
            return Err(WalletError::InvalidAmount("no payments".into()));
        }
        if self.payments.len() >= MAX_OUTPUTS {
            return Err(WalletError::TransactionTooLarge(format!(
                "{} payments, at most {} allowed",
                self.payments.len(),
                MAX_OUTPUTS - 1
            )));
        }

        let mut total: u64 = 0;
        let mut destinations = HashSet::with_capacity(self.payments.len());
        for p in &self.payments {
            if p.amount == 0 {
                return Err(WalletError::InvalidAmount(format!(
                    "zero amount to {}",
                    p.destination
                )));
            }
            if p.amount > MAX_MONEY {
                return Err(WalletError::InvalidAmount(format!(
                    "{} exceeds the maximum amount",
                    p.amount
                )));
            }
            if !destinations.insert(p.destination.pubkey_hash()) {
                return Err(WalletError::DuplicateDestination(p.destination.to_string()));
            }
            total = total
                .checked_add(p.amount)
                .filter(|t| *t <= MAX_MONEY)
                .ok_or_else(|| WalletError::InvalidAmount("total exceeds the maximum amount".into()))?;
        }
        Ok(total)
    }

    /// Converge on a fee-correct unsigned transaction.
    ///
    /// `available` is a snapshot of unreserved outputs; outputs that are not
    /// spendable at `tip_height` are skipped. Each round selects inputs for
    /// the payment total with the current fee as floor, adds a change output
    /// when the leftover is above the dust threshold (otherwise the leftover
    /// joins the fee), and prices the serialized size. The round converges
    /// once the paid fee covers the priced fee; otherwise the priced fee
    /// becomes the next floor.
    pub fn plan(
        &self,
        available: &[UnspentOutput],
        tip_height: u64,
        change_destination: Hash256,
        fee_policy: &dyn FeePolicy,
    ) -> Result<TransactionPlan, WalletError> {
        let amount = self.validate()?;

        let spendable: Vec<UnspentOutput> = available
            .iter()
            .filter(|u| u.is_spendable(tip_height, self.min_confirmations))
            .cloned()
            .collect();

        let mut fee: u64 = 0;
        for round in 1..=self.max_fee_rounds {
            let target = SelectionTarget {
                payment: amount,
                fee_floor: fee,
                payment_outputs: self.payments.len(),
                dust_threshold: self.dust_threshold,
                max_inputs: MAX_INPUTS,
            };
            let selection = CoinSelector::select(&spendable, &target, fee_policy)?;

            let leftover = selection
                .total_value
                .checked_sub(amount)
                .and_then(|v| v.checked_sub(fee))
                .ok_or(TransactionError::ValueOverflow)?;
            let (change, paid_fee) = if leftover > self.dust_threshold {
                (Some(leftover), fee)
            } else {
                (None, fee + leftover)
            };

            let tx = self.assemble(&selection.selected, change, change_destination);
            let size = tx.serialized_size()?;
            if size > MAX_TX_SIZE {
                return Err(WalletError::TransactionTooLarge(format!(
                    "{size} bytes, at most {MAX_TX_SIZE} allowed"
                )));
            }

            let required = fee_policy.fee_for(size);
            if required <= paid_fee {
                info!(
                    inputs = selection.selected.len(),
                    outputs = tx.outputs.len(),
                    amount,
                    fee = paid_fee,
                    size,
                    rounds = round,
                    "transaction planned"
                );
                return Ok(TransactionPlan {
                    tx: strip_placeholders(tx),
                    inputs: selection.selected,
                    fee: paid_fee,
                    size,
                    rounds: round,
                    amount_sent: amount,
                    change_index: change.map(|_| self.payments.len() as u32),
                    memo: self.memo.clone(),
                });
            }

            debug!(round, size, paid_fee, required, "fee below requirement, next round");
            fee = required;
        }

        Err(WalletError::FeeConvergenceFailure {
            rounds: self.max_fee_rounds,
        })
    }

    /// Plan against the ledger's available outputs and reserve the inputs.
    /// The payment list is validated by [`plan`](Self::plan) before any
    /// reservation is taken.
    ///
    /// A [`WalletError::LedgerConflict`] means another build reserved one of
    /// the chosen outputs after the snapshot was taken; nothing is reserved.
    pub fn build(
        &self,
        ledger: &UtxoLedger,
        change_destination: Hash256,
        fee_policy: &dyn FeePolicy,
    ) -> Result<CandidateTransaction, WalletError> {
        let plan = self.plan(
            &ledger.list_available(),
            ledger.tip_height(),
            change_destination,
            fee_policy,
        )?;
        let reservation = ledger.reserve(&plan.outpoints())?;
        Ok(CandidateTransaction { plan, reservation })
    }

    /// Inputs carry placeholder signatures and keys of final length so the
    /// priced size equals the signed size.
    fn assemble(
        &self,
        selected: &[UnspentOutput],
        change: Option<u64>,
        change_destination: Hash256,
    ) -> Transaction {
        let inputs = selected
            .iter()
            .map(|u| TxInput {
                previous_output: u.outpoint.clone(),
                signature: vec![0u8; SIGNATURE_LEN],
                public_key: vec![0u8; PUBLIC_KEY_LEN],
            })
            .collect();

        let mut outputs: Vec<TxOutput> = self
            .payments
            .iter()
            .map(|p| TxOutput {
                value: p.amount,
                pubkey_hash: p.destination.pubkey_hash(),
            })
            .collect();
        if let Some(value) = change {
            outputs.push(TxOutput {
                value,
                pubkey_hash: change_destination,
            });
        }

        Transaction {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: self.lock_time,
        }
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new(&WalletConfig::default())
    }
}

fn strip_placeholders(mut tx: Transaction) -> Transaction {
    for input in &mut tx.inputs {
        input.signature.clear();
        input.public_key.clear();
    }
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::address::Network;
    use cirrus_core::constants::{COIN, COINBASE_MATURITY};

    fn config(dust: u64) -> WalletConfig {
        WalletConfig {
            dust_threshold: dust,
            min_confirmations: 1,
            ..WalletConfig::default()
        }
    }

    fn addr(tag: u8) -> Address {
        Address::from_pubkey_hash(Hash256([tag; 32]), Network::Mainnet)
    }

    fn utxo(tag: u8, value: u64, height: u64) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint::new(Hash256([tag; 32]), 0),
            output: TxOutput { value, pubkey_hash: Hash256([0xAA; 32]) },
            block_height: height,
            is_coinbase: false,
        }
    }

    const CHANGE: Hash256 = Hash256([0xCC; 32]);

    fn flat(fee: u64) -> impl Fn(usize) -> u64 + Send + Sync {
        move |_| fee
    }

    fn output_values(plan: &TransactionPlan) -> Vec<u64> {
        plan.tx.outputs.iter().map(|o| o.value).collect()
    }

    fn assert_conserves(plan: &TransactionPlan) {
        let out = plan.tx.total_output_value().unwrap();
        assert_eq!(plan.input_value(), out + plan.fee);
    }

    #[test]
    fn single_input_with_change() {
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 40);
        let plan = b.plan(&[utxo(1, 100, 1)], 10, CHANGE, &flat(1)).unwrap();

        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(output_values(&plan), vec![40, 59]);
        assert_eq!(plan.fee, 1);
        assert_eq!(plan.change_index, Some(1));
        assert_eq!(plan.tx.outputs[1].pubkey_hash, CHANGE);
        assert_conserves(&plan);
    }

    #[test]
    fn insufficient_funds() {
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 40);
        let err = b.plan(&[utxo(1, 30, 1)], 10, CHANGE, &flat(1)).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { have: 30, .. }));
    }

    #[test]
    fn sub_dust_change_folded_into_fee() {
        let mut b = TransactionBuilder::new(&config(100));
        b.add_payment(addr(1), 1000);
        let plan = b.plan(&[utxo(1, 1050, 1)], 10, CHANGE, &flat(10)).unwrap();
        assert_eq!(output_values(&plan), vec![1000]);
        assert_eq!(plan.fee, 50);
        assert_eq!(plan.change_index, None);
        assert_conserves(&plan);
    }

    #[test]
    fn fee_follows_size() {
        let per_byte = |size: usize| size as u64;
        let mut b = TransactionBuilder::new(&config(546));
        b.add_payment(addr(1), COIN).add_payment(addr(2), 2 * COIN);
        let utxos: Vec<_> = (0..6).map(|i| utxo(i, COIN, 1)).collect();
        let plan = b.plan(&utxos, 10, CHANGE, &per_byte).unwrap();

        let signed_size = plan.size;
        assert!(plan.fee >= signed_size as u64);
        assert!(plan.rounds <= 10);
        assert_conserves(&plan);
    }

    #[test]
    fn plan_size_matches_signed_encoding() {
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 40);
        let plan = b.plan(&[utxo(1, 100, 1)], 10, CHANGE, &flat(1)).unwrap();
        let mut tx = plan.tx.clone();
        for input in &mut tx.inputs {
            input.signature = vec![7; SIGNATURE_LEN];
            input.public_key = vec![7; PUBLIC_KEY_LEN];
        }
        assert_eq!(tx.serialized_size().unwrap(), plan.size);
        assert!(plan.tx.inputs.iter().all(|i| !i.is_signed()));
    }

    #[test]
    fn empty_payments_rejected() {
        let b = TransactionBuilder::new(&config(1));
        let err = b.plan(&[utxo(1, 100, 1)], 10, CHANGE, &flat(1)).unwrap_err();
        assert_eq!(err, WalletError::InvalidAmount("no payments".into()));
    }

    #[test]
    fn zero_and_oversized_amounts_rejected() {
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 0);
        assert!(matches!(b.validate(), Err(WalletError::InvalidAmount(_))));

        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), MAX_MONEY + 1);
        assert!(matches!(b.validate(), Err(WalletError::InvalidAmount(_))));

        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), MAX_MONEY).add_payment(addr(2), 1);
        assert!(matches!(b.validate(), Err(WalletError::InvalidAmount(_))));
    }

    #[test]
    fn duplicate_destination_rejected_before_ledger() {
        let ledger = UtxoLedger::new();
        ledger.insert(utxo(1, 100, 1));
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 10).add_payment(addr(1), 20);

        let err = b.build(&ledger, CHANGE, &flat(1)).unwrap_err();
        assert_eq!(err, WalletError::DuplicateDestination(addr(1).to_string()));
        assert_eq!(ledger.reserved_count(), 0);
    }

    #[test]
    fn immature_and_unconfirmed_outputs_skipped() {
        let mut coinbase = utxo(1, 1_000, 5);
        coinbase.is_coinbase = true;
        let unconfirmed = utxo(2, 1_000, 11);
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(9), 40);

        let err = b
            .plan(&[coinbase.clone(), unconfirmed], 10, CHANGE, &flat(1))
            .unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 0, need: 41 });

        let tip = 5 + COINBASE_MATURITY - 1;
        let plan = b.plan(&[coinbase], tip, CHANGE, &flat(1)).unwrap();
        assert_eq!(plan.inputs.len(), 1);
    }

    #[test]
    fn fee_convergence_failure_when_fee_keeps_rising() {
        use std::sync::atomic::{AtomicU64, Ordering};
        let calls = AtomicU64::new(0);
        let rising = move |_size: usize| 1 + calls.fetch_add(1, Ordering::SeqCst);

        let cfg = WalletConfig {
            max_fee_rounds: 3,
            ..config(1)
        };
        let mut b = TransactionBuilder::new(&cfg);
        b.add_payment(addr(1), 40);
        let err = b
            .plan(&[utxo(1, 1_000_000, 1)], 10, CHANGE, &rising)
            .unwrap_err();
        assert_eq!(err, WalletError::FeeConvergenceFailure { rounds: 3 });
    }

    #[test]
    fn memo_and_lock_time_carried() {
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 40).set_memo("invoice 7").set_lock_time(99);
        let plan = b.plan(&[utxo(1, 100, 1)], 10, CHANGE, &flat(1)).unwrap();
        assert_eq!(plan.memo.as_deref(), Some("invoice 7"));
        assert_eq!(plan.tx.lock_time, 99);
    }

    #[test]
    fn build_reserves_inputs() {
        let ledger = UtxoLedger::new();
        ledger.set_tip_height(10);
        let u = utxo(1, 100, 1);
        ledger.insert(u.clone());

        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 40);
        let candidate = b.build(&ledger, CHANGE, &flat(1)).unwrap();
        assert_eq!(candidate.reservation().outpoints(), &[u.outpoint.clone()]);
        assert!(ledger.is_reserved(&u.outpoint));

        let err = b.build(&ledger, CHANGE, &flat(1)).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }

    #[test]
    fn invalid_build_reserves_nothing() {
        let ledger = UtxoLedger::new();
        ledger.set_tip_height(10);
        ledger.insert(utxo(1, 100, 1));

        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(1), 10).add_payment(addr(1), 20);
        assert_eq!(
            b.build(&ledger, CHANGE, &flat(1)).unwrap_err(),
            WalletError::DuplicateDestination(addr(1).to_string())
        );

        let empty = TransactionBuilder::new(&config(1));
        assert_eq!(
            empty.build(&ledger, CHANGE, &flat(1)).unwrap_err(),
            WalletError::InvalidAmount("no payments".into())
        );
        assert_eq!(ledger.reserved_count(), 0);
        assert_eq!(ledger.available_balance(), 100);
    }

    #[test]
    fn payments_keep_request_order() {
        let mut b = TransactionBuilder::new(&config(1));
        b.add_payment(addr(3), 30).add_payment(addr(1), 10).add_payment(addr(2), 20);
        let plan = b.plan(&[utxo(1, 1_000, 1)], 10, CHANGE, &flat(1)).unwrap();
        assert_eq!(output_values(&plan)[..3], [30, 10, 20]);
        assert_eq!(plan.tx.outputs[0].pubkey_hash, addr(3).pubkey_hash());
    }
}
