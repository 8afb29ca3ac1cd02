//! Persisted wallet history entries.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Hash256, OutPoint, Transaction};

/// Lifecycle of a committed wallet transaction.
///
/// A record is written as [`TxStatus::PendingRelay`] before the first
/// broadcast attempt, so a relay failure never loses the spend.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub enum TxStatus {
    PendingRelay,
    Relayed,
    Confirmed { block_height: u64 },
}

impl TxStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TxStatus::PendingRelay)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::PendingRelay => f.write_str("pending"),
            TxStatus::Relayed => f.write_str("relayed"),
            TxStatus::Confirmed { block_height } => write!(f, "confirmed@{block_height}"),
        }
    }
}

/// A committed transaction as recorded in the wallet's persistence store.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TransactionRecord {
    pub txid: Hash256,
    pub tx: Transaction,
    /// Wallet outputs consumed by this transaction.
    pub spent: Vec<OutPoint>,
    pub fee: u64,
    /// Total paid to external destinations (change excluded).
    pub amount_sent: u64,
    /// Index of the change output in `tx.outputs`, if one was created.
    pub change_index: Option<u32>,
    pub memo: Option<String>,
    pub status: TxStatus,
    pub relay_attempts: u32,
    pub last_relay_error: Option<String>,
    /// Unix timestamp (seconds) at which the record was written.
    pub created_at: i64,
}

impl TransactionRecord {
    pub fn change_value(&self) -> u64 {
        self.change_index
            .and_then(|i| self.tx.outputs.get(i as usize))
            .map(|o| o.value)
            .unwrap_or(0)
    }
}
