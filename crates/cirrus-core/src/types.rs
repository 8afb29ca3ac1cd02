//! Core wallet types: hashes, outpoints, transactions, unspent outputs.
//!
//! All monetary values are integer units (1 CIR = 10^8 units). Transactions
//! serialize canonically with bincode's standard configuration, which
//! varint-encodes integers; serialized size therefore depends on the values
//! carried, not only on the input and output counts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransactionError;

/// A 32-byte hash value. Used for transaction IDs and pubkey hashes (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
///
/// Ordered by `(txid, index)` so ledger iteration and selection tie-breaks
/// are reproducible.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u64,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u64) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    pub previous_output: OutPoint,
    /// Ed25519 signature (64 bytes). Empty until signed.
    pub signature: Vec<u8>,
    /// Ed25519 public key (32 bytes). Empty until signed.
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// An input spending `previous_output` with no authorization attached yet.
    pub fn unsigned(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty() && !self.public_key.is_empty()
    }
}

/// A transaction output: an amount locked to a pubkey hash.
///
/// The pubkey hash is the destination script: only the holder of the
/// Ed25519 key hashing to it can authorize spending the output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in units.
    pub value: u64,
    pub pubkey_hash: Hash256,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub version: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u64,
}

impl Transaction {
    /// Canonical bincode encoding.
    pub fn encode(&self) -> Result<Vec<u8>, TransactionError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))
    }

    /// Decode a transaction from its canonical encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransactionError> {
        let (tx, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(tx)
    }

    /// Transaction ID: BLAKE3 over the canonical encoding.
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        Ok(Hash256(blake3::hash(&self.encode()?).into()))
    }

    /// Serialized size in bytes of the canonical encoding.
    pub fn serialized_size(&self) -> Result<usize, TransactionError> {
        Ok(self.encode()?.len())
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// An output owned by the wallet and not yet spent.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub output: TxOutput,
    /// Height of the block that confirmed the creating transaction.
    pub block_height: u64,
    /// Coinbase and coinstake outputs are subject to maturity.
    pub is_coinbase: bool,
}

impl UnspentOutput {
    pub fn value(&self) -> u64 {
        self.output.value
    }

    /// Destination script (pubkey hash) the output is locked to.
    pub fn destination(&self) -> &Hash256 {
        &self.output.pubkey_hash
    }

    /// Confirmation depth at `tip_height`; an output in the tip block has 1.
    pub fn confirmations(&self, tip_height: u64) -> u64 {
        if tip_height < self.block_height {
            0
        } else {
            tip_height - self.block_height + 1
        }
    }

    /// Whether the output may be spent at `tip_height` given a minimum depth.
    pub fn is_spendable(&self, tip_height: u64, min_confirmations: u64) -> bool {
        let depth = self.confirmations(tip_height);
        if self.is_coinbase && depth < crate::constants::COINBASE_MATURITY {
            return false;
        }
        depth >= min_confirmations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COIN, COINBASE_MATURITY};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::new(Hash256([0x11; 32]), 0),
                signature: vec![0u8; 64],
                public_key: vec![0u8; 32],
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                pubkey_hash: Hash256([0xAA; 32]),
            }],
            lock_time: 0,
        }
    }

    fn utxo(height: u64, is_coinbase: bool) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint::new(Hash256([1; 32]), 0),
            output: TxOutput { value: COIN, pubkey_hash: Hash256::ZERO },
            block_height: height,
            is_coinbase,
        }
    }

    #[test]
    fn hash256_display_hex() {
        let s = Hash256([0xAB; 32]).to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(&s[0..2], "ab");
    }

    #[test]
    fn outpoint_ordering_by_txid_then_index() {
        let a = OutPoint::new(Hash256([1; 32]), 5);
        let b = OutPoint::new(Hash256([1; 32]), 6);
        let c = OutPoint::new(Hash256([2; 32]), 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn outpoint_display() {
        let s = OutPoint::new(Hash256([0xFF; 32]), 3).to_string();
        assert!(s.ends_with(":3"));
    }

    #[test]
    fn txid_deterministic_and_sensitive() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        assert_eq!(tx1.txid().unwrap(), tx1.txid().unwrap());
        tx2.lock_time = 1;
        assert_ne!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn encode_decode_preserves_transaction() {
        let tx = sample_tx();
        let bytes = tx.encode().unwrap();
        assert_eq!(Transaction::decode(&bytes).unwrap(), tx);
        assert_eq!(tx.serialized_size().unwrap(), bytes.len());
    }

    #[test]
    fn serialized_size_grows_with_value_width() {
        let mut small = sample_tx();
        small.outputs[0].value = 1;
        let mut large = sample_tx();
        large.outputs[0].value = u64::MAX;
        assert!(large.serialized_size().unwrap() > small.serialized_size().unwrap());
    }

    #[test]
    fn total_output_value_overflow_returns_none() {
        let mut tx = sample_tx();
        tx.outputs.push(TxOutput { value: u64::MAX, pubkey_hash: Hash256::ZERO });
        assert_eq!(tx.total_output_value(), None);
    }

    #[test]
    fn unsigned_input_has_no_authorization() {
        let input = TxInput::unsigned(OutPoint::new(Hash256([3; 32]), 1));
        assert!(!input.is_signed());
        assert!(sample_tx().inputs[0].is_signed());
    }

    #[test]
    fn confirmations_counts_tip_block() {
        let u = utxo(10, false);
        assert_eq!(u.confirmations(10), 1);
        assert_eq!(u.confirmations(19), 10);
        assert_eq!(u.confirmations(5), 0);
    }

    #[test]
    fn coinbase_needs_maturity() {
        let u = utxo(100, true);
        assert!(!u.is_spendable(100 + COINBASE_MATURITY - 2, 1));
        assert!(u.is_spendable(100 + COINBASE_MATURITY - 1, 1));
    }

    #[test]
    fn regular_output_respects_min_confirmations() {
        let u = utxo(100, false);
        assert!(u.is_spendable(100, 1));
        assert!(!u.is_spendable(100, 2));
        assert!(u.is_spendable(100, 0));
    }
}
