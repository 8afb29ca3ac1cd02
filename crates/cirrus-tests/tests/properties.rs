//! Randomized checks of planning and reservation invariants.

use proptest::prelude::*;

use cirrus_core::traits::FeePolicy;
use cirrus_core::types::UnspentOutput;
use cirrus_wallet::{
    PerKilobyteFee, TransactionBuilder, TransactionPlan, UtxoLedger, WalletConfig, WalletError,
};
use cirrus_tests::helpers::*;

fn outputs(values: &[u64]) -> Vec<UnspentOutput> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| utxo(i as u32, *v, pkh(9)))
        .collect()
}

fn plan(
    values: &[u64],
    payments: &[u64],
    dust: u64,
    fee_policy: &dyn FeePolicy,
) -> Result<TransactionPlan, WalletError> {
    let config = WalletConfig {
        dust_threshold: dust,
        ..test_config()
    };
    let mut builder = TransactionBuilder::new(&config);
    for (i, amount) in payments.iter().enumerate() {
        builder.add_payment(external(i as u8 + 1), *amount);
    }
    builder.plan(&outputs(values), TIP_HEIGHT, pkh(0xCC), fee_policy)
}

/// Invariants every successful plan must satisfy.
fn check_plan(plan: &TransactionPlan, payments: &[u64], dust: u64, fee_policy: &dyn FeePolicy) {
    let outputs = plan.tx.total_output_value().unwrap();
    assert_eq!(plan.input_value(), outputs + plan.fee, "value not conserved");
    assert!(plan.fee >= fee_policy.fee_for(plan.size), "fee below policy");
    assert!(plan.rounds <= WalletConfig::default().max_fee_rounds);
    assert_eq!(plan.amount_sent, payments.iter().sum::<u64>());

    let paid: Vec<u64> = plan.tx.outputs.iter().take(payments.len()).map(|o| o.value).collect();
    assert_eq!(paid, payments);
    match plan.change_index {
        Some(index) => {
            assert_eq!(index as usize, payments.len());
            assert!(plan.change_value() > dust);
        }
        None => assert_eq!(plan.tx.outputs.len(), payments.len()),
    }
    assert!(plan.tx.inputs.iter().all(|i| i.signature.is_empty()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn linear_fee_plans_conserve_value(
        values in prop::collection::vec(1_000u64..1_000_000, 1..40),
        payments in prop::collection::vec(1u64..200_000, 1..4),
        per_byte in 0u64..4,
        base in 0u64..500,
        dust in prop_oneof![Just(1u64), Just(546u64)],
    ) {
        let policy = move |size: usize| per_byte * size as u64 + base;
        match plan(&values, &payments, dust, &policy) {
            Ok(p) => check_plan(&p, &payments, dust, &policy),
            Err(WalletError::InsufficientFunds { have, .. }) => {
                prop_assert_eq!(have, values.iter().sum::<u64>());
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn kilobyte_fee_plans_conserve_value(
        values in prop::collection::vec(1_000u64..5_000_000, 1..40),
        payments in prop::collection::vec(1u64..1_000_000, 1..4),
        fee_per_kb in 0u64..20_000,
        min_fee in 0u64..2_000,
    ) {
        let policy = PerKilobyteFee::new(fee_per_kb, min_fee);
        match plan(&values, &payments, 546, &policy) {
            Ok(p) => check_plan(&p, &payments, 546, &policy),
            Err(WalletError::InsufficientFunds { .. }) => {}
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn ample_funds_always_plan(
        values in prop::collection::vec(10_000u64..100_000, 1..20),
        per_byte in 0u64..3,
    ) {
        let total: u64 = values.iter().sum();
        let amount = total / 4;
        prop_assume!(amount > 0);
        let policy = move |size: usize| per_byte * size as u64;
        let p = plan(&values, &[amount], 1, &policy).unwrap();
        check_plan(&p, &[amount], 1, &policy);
    }

    #[test]
    fn release_then_reserve_succeeds(
        values in prop::collection::vec(1u64..10_000, 1..30),
        mask in prop::collection::vec(any::<bool>(), 30),
    ) {
        let ledger = UtxoLedger::new();
        let all = outputs(&values);
        for u in &all {
            ledger.insert(u.clone());
        }
        let subset: Vec<_> = all
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(u, _)| u.outpoint.clone())
            .collect();
        prop_assume!(!subset.is_empty());

        let before = ledger.available_balance();
        let first = ledger.reserve(&subset).unwrap();
        prop_assert!(ledger.reserve(&subset).is_err());
        prop_assert!(ledger.release(&first));
        prop_assert_eq!(ledger.available_balance(), before);

        let second = ledger.reserve(&subset).unwrap();
        prop_assert_eq!(second.total_value(), first.total_value());
        prop_assert_ne!(second.id(), first.id());
    }
}
