//! Deterministic coin selection.
//!
//! Candidates are ordered by value descending, oldest first among equal
//! values, then by outpoint. Three strategies are tried in order:
//!
//! 1. a single output that pays the target with a sub-dust leftover, so no
//!    change output is needed;
//! 2. the smallest single output that pays the target plus a change output;
//! 3. largest-first accumulation until the target plus fee is covered.
//!
//! Selection is a pure query over the slice it is given.

use std::collections::HashSet;

use cirrus_core::error::TransactionError;
use cirrus_core::traits::FeePolicy;
use cirrus_core::types::UnspentOutput;

use crate::error::WalletError;
use crate::fee::estimated_size;

/// What a selection must pay for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionTarget {
    /// Sum of payment amounts.
    pub payment: u64,
    /// Minimum fee the selection must also cover.
    pub fee_floor: u64,
    /// Number of payment outputs, change excluded.
    pub payment_outputs: usize,
    /// Leftover at or below this is not worth a change output.
    pub dust_threshold: u64,
    /// Upper bound on selected inputs.
    pub max_inputs: usize,
}

/// Result of coin selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinSelection {
    /// Selected outputs, in selection order.
    pub selected: Vec<UnspentOutput>,
    /// Sum of selected values.
    pub total_value: u64,
    /// Fee this selection was sized for.
    pub fee: u64,
    /// `total_value - payment - fee`.
    pub excess: u64,
    /// Whether `excess` is above the dust threshold.
    pub change_required: bool,
}

/// Coin selector over a snapshot of available outputs.
pub struct CoinSelector;

impl CoinSelector {
    /// Select outputs from `available` covering `target`.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] when all candidates
    /// together fall short, and [`WalletError::TransactionTooLarge`] when
    /// covering the target needs more than `target.max_inputs` inputs.
    pub fn select(
        available: &[UnspentOutput],
        target: &SelectionTarget,
        fee_policy: &dyn FeePolicy,
    ) -> Result<CoinSelection, WalletError> {
        let candidates = ordered_candidates(available);
        let outputs = target.payment_outputs;

        let fee_with = |inputs: usize, outputs: usize| {
            fee_policy
                .fee_for(estimated_size(inputs, outputs))
                .max(target.fee_floor)
        };

        // Single output, no change.
        let need_exact = target.payment.saturating_add(fee_with(1, outputs));
        let exact = candidates
            .iter()
            .filter(|u| u.value() >= need_exact && u.value() - need_exact <= target.dust_threshold)
            .min_by_key(|u| u.value());
        if let Some(utxo) = exact {
            return Ok(single(utxo, target, fee_with(1, outputs)));
        }

        // Smallest single output that also funds a change output.
        let fee_single = fee_with(1, outputs + 1);
        let need_single = target.payment.saturating_add(fee_single);
        let smallest = candidates
            .iter()
            .filter(|u| u.value() >= need_single)
            .min_by_key(|u| u.value());
        if let Some(utxo) = smallest {
            return Ok(single(utxo, target, fee_single));
        }

        // Largest first.
        let mut selected: Vec<UnspentOutput> = Vec::new();
        let mut total: u64 = 0;
        for utxo in &candidates {
            total = total
                .checked_add(utxo.value())
                .ok_or(TransactionError::ValueOverflow)?;
            selected.push((*utxo).clone());

            let fee = fee_with(selected.len(), outputs + 1);
            let need = target.payment.saturating_add(fee);
            if total >= need {
                if selected.len() > target.max_inputs {
                    return Err(WalletError::TransactionTooLarge(format!(
                        "{} inputs needed, at most {} allowed",
                        selected.len(),
                        target.max_inputs
                    )));
                }
                let excess = total - need;
                return Ok(CoinSelection {
                    selected,
                    total_value: total,
                    fee,
                    excess,
                    change_required: excess > target.dust_threshold,
                });
            }
        }

        let fee = fee_with(candidates.len().max(1), outputs + 1);
        Err(WalletError::InsufficientFunds {
            have: total,
            need: target.payment.saturating_add(fee),
        })
    }
}

fn single(utxo: &UnspentOutput, target: &SelectionTarget, fee: u64) -> CoinSelection {
    let excess = utxo.value().saturating_sub(target.payment).saturating_sub(fee);
    CoinSelection {
        selected: vec![utxo.clone()],
        total_value: utxo.value(),
        fee,
        excess,
        change_required: excess > target.dust_threshold,
    }
}

/// Deduplicate by outpoint and order value descending, then height
/// ascending, then outpoint.
fn ordered_candidates(available: &[UnspentOutput]) -> Vec<&UnspentOutput> {
    let mut seen = HashSet::with_capacity(available.len());
    let mut candidates: Vec<&UnspentOutput> = available
        .iter()
        .filter(|u| seen.insert(&u.outpoint))
        .collect();
    candidates.sort_by(|a, b| {
        b.value()
            .cmp(&a.value())
            .then_with(|| a.block_height.cmp(&b.block_height))
            .then_with(|| a.outpoint.cmp(&b.outpoint))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::constants::MAX_INPUTS;
    use cirrus_core::types::{Hash256, OutPoint, TxOutput};

    fn utxo(tag: u8, value: u64, height: u64) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint::new(Hash256([tag; 32]), 0),
            output: TxOutput { value, pubkey_hash: Hash256([0xAA; 32]) },
            block_height: height,
            is_coinbase: false,
        }
    }

    fn target(payment: u64, dust: u64) -> SelectionTarget {
        SelectionTarget {
            payment,
            fee_floor: 0,
            payment_outputs: 1,
            dust_threshold: dust,
            max_inputs: MAX_INPUTS,
        }
    }

    fn flat(fee: u64) -> impl Fn(usize) -> u64 + Send + Sync {
        move |_| fee
    }

    fn values(sel: &CoinSelection) -> Vec<u64> {
        sel.selected.iter().map(|u| u.value()).collect()
    }

    #[test]
    fn exact_match_preferred() {
        let utxos = vec![utxo(1, 500, 1), utxo(2, 41, 1), utxo(3, 60, 1)];
        let sel = CoinSelector::select(&utxos, &target(40, 0), &flat(1)).unwrap();
        assert_eq!(values(&sel), vec![41]);
        assert_eq!(sel.excess, 0);
        assert!(!sel.change_required);
    }

    #[test]
    fn exact_match_within_dust() {
        let utxos = vec![utxo(1, 500, 1), utxo(2, 44, 1)];
        let sel = CoinSelector::select(&utxos, &target(40, 5), &flat(1)).unwrap();
        assert_eq!(values(&sel), vec![44]);
        assert_eq!(sel.excess, 3);
        assert!(!sel.change_required);
    }

    #[test]
    fn smallest_sufficient_single() {
        let utxos = vec![utxo(1, 500, 1), utxo(2, 100, 1), utxo(3, 30, 1)];
        let sel = CoinSelector::select(&utxos, &target(40, 1), &flat(1)).unwrap();
        assert_eq!(values(&sel), vec![100]);
        assert_eq!(sel.total_value, 100);
        assert_eq!(sel.fee, 1);
        assert_eq!(sel.excess, 59);
        assert!(sel.change_required);
    }

    #[test]
    fn greedy_largest_first() {
        let utxos = vec![utxo(1, 10, 1), utxo(2, 30, 1), utxo(3, 20, 1), utxo(4, 5, 1)];
        let sel = CoinSelector::select(&utxos, &target(45, 0), &flat(1)).unwrap();
        assert_eq!(values(&sel), vec![30, 20]);
        assert_eq!(sel.excess, 4);
    }

    #[test]
    fn greedy_respects_fee_floor() {
        let utxos = vec![utxo(1, 30, 1), utxo(2, 20, 1), utxo(3, 10, 1)];
        let mut t = target(45, 0);
        t.fee_floor = 10;
        let sel = CoinSelector::select(&utxos, &t, &flat(1)).unwrap();
        assert_eq!(values(&sel), vec![30, 20, 10]);
        assert_eq!(sel.fee, 10);
        assert_eq!(sel.excess, 5);
    }

    #[test]
    fn insufficient_funds_reports_have_and_need() {
        let utxos = vec![utxo(1, 30, 1)];
        let err = CoinSelector::select(&utxos, &target(40, 0), &flat(1)).unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 30, need: 41 });
    }

    #[test]
    fn empty_candidates_insufficient() {
        let err = CoinSelector::select(&[], &target(40, 0), &flat(1)).unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 0, need: 41 });
    }

    #[test]
    fn duplicates_counted_once() {
        let a = utxo(1, 30, 1);
        let utxos = vec![a.clone(), a.clone(), a];
        let err = CoinSelector::select(&utxos, &target(40, 0), &flat(1)).unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 30, need: 41 });
    }

    #[test]
    fn ties_break_oldest_first() {
        let utxos = vec![utxo(1, 25, 9), utxo(2, 25, 3), utxo(3, 25, 6)];
        let sel = CoinSelector::select(&utxos, &target(45, 0), &flat(1)).unwrap();
        let heights: Vec<u64> = sel.selected.iter().map(|u| u.block_height).collect();
        assert_eq!(heights, vec![3, 6]);
    }

    #[test]
    fn too_many_inputs() {
        let utxos: Vec<_> = (0..5).map(|i| utxo(i, 10, 1)).collect();
        let mut t = target(45, 0);
        t.max_inputs = 3;
        let err = CoinSelector::select(&utxos, &t, &flat(1)).unwrap_err();
        assert!(matches!(err, WalletError::TransactionTooLarge(_)));
    }

    #[test]
    fn deterministic_for_shuffled_input() {
        let mut utxos: Vec<_> = (0..20u8).map(|i| utxo(i, (i as u64 % 7 + 1) * 10, i as u64)).collect();
        let a = CoinSelector::select(&utxos, &target(200, 0), &flat(3)).unwrap();
        utxos.reverse();
        let b = CoinSelector::select(&utxos, &target(200, 0), &flat(3)).unwrap();
        assert_eq!(a, b);
    }
}
