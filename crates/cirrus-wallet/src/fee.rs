//! Fee policies and transaction size estimation.

use cirrus_core::constants::{DEFAULT_FEE_PER_KB, MIN_TX_FEE, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use cirrus_core::traits::FeePolicy;

/// Worst-case varint width of a `u64` under the canonical encoding.
const MAX_VARINT_LEN: usize = 9;

/// Upper bound of one signed input: outpoint txid and index, then the
/// length-prefixed signature and public key.
const MAX_INPUT_SIZE: usize = 32 + MAX_VARINT_LEN + (1 + SIGNATURE_LEN) + (1 + PUBLIC_KEY_LEN);

/// Upper bound of one output: value and pubkey hash.
const MAX_OUTPUT_SIZE: usize = MAX_VARINT_LEN + 32;

/// Version, input count, output count, lock time.
const MAX_OVERHEAD: usize = 4 * MAX_VARINT_LEN;

/// Upper bound on the serialized size of a signed transaction with the given
/// shape. Never smaller than the real encoding.
pub fn estimated_size(inputs: usize, outputs: usize) -> usize {
    MAX_OVERHEAD
        .saturating_add(inputs.saturating_mul(MAX_INPUT_SIZE))
        .saturating_add(outputs.saturating_mul(MAX_OUTPUT_SIZE))
}

/// Fee charged per started kilobyte, with a floor.
///
/// `fee_for(size) = max(min_fee, ceil(size / 1000) * fee_per_kb)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerKilobyteFee {
    pub fee_per_kb: u64,
    pub min_fee: u64,
}

impl PerKilobyteFee {
    pub fn new(fee_per_kb: u64, min_fee: u64) -> Self {
        Self { fee_per_kb, min_fee }
    }
}

impl Default for PerKilobyteFee {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_PER_KB, MIN_TX_FEE)
    }
}

impl FeePolicy for PerKilobyteFee {
    fn fee_for(&self, size: usize) -> u64 {
        let kilobytes = size.div_ceil(1000) as u64;
        kilobytes.saturating_mul(self.fee_per_kb).max(self.min_fee)
    }
}
