//! Collaborator interfaces consumed by the wallet engine.
//!
//! - [`KeyStore`]: key lookup by destination script, change destinations
//! - [`Relay`]: hands signed transactions to the network
//! - [`TransactionStore`]: durable wallet history
//! - [`FeePolicy`]: fee required for a given serialized size
//!
//! All are synchronous and `Send + Sync`: the engine calls them from
//! whichever thread runs the build, never while holding the ledger lock.

use crate::crypto::KeyPair;
use crate::error::StoreError;
use crate::record::{TransactionRecord, TxStatus};
use crate::types::{Hash256, Transaction};

/// Private key material owned by the wallet.
pub trait KeyStore: Send + Sync {
    /// Key able to spend outputs locked to `pubkey_hash`, if owned.
    fn lookup_key(&self, pubkey_hash: &Hash256) -> Option<KeyPair>;

    /// Whether the wallet owns the key behind `pubkey_hash`.
    ///
    /// Default implementation delegates to [`lookup_key`](Self::lookup_key).
    fn owns(&self, pubkey_hash: &Hash256) -> bool {
        self.lookup_key(pubkey_hash).is_some()
    }

    /// Destination script for a new change output.
    fn change_destination(&self) -> Hash256;
}

/// Result of handing a transaction to the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Accepted,
    /// The network refused the transaction (policy, conflict, malformed).
    Rejected(String),
    /// The network could not be reached; the transaction may be retried.
    Unreachable(String),
}

impl RelayOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RelayOutcome::Accepted)
    }
}

/// Boundary to transaction propagation. Timeouts are the implementor's concern.
pub trait Relay: Send + Sync {
    fn broadcast(&self, tx: &Transaction) -> RelayOutcome;
}

/// Durable wallet transaction history.
pub trait TransactionStore: Send + Sync {
    /// Persist a new record. Fails with [`StoreError::Duplicate`] if the txid exists.
    fn record_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    fn update_status(&self, txid: &Hash256, status: TxStatus) -> Result<(), StoreError>;

    /// Count one failed relay attempt and remember its reason.
    fn record_relay_attempt(&self, txid: &Hash256, error: &str) -> Result<(), StoreError>;

    fn get(&self, txid: &Hash256) -> Result<Option<TransactionRecord>, StoreError>;

    /// Records still awaiting a successful broadcast.
    fn pending(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.status.is_pending())
            .collect())
    }

    /// Every record, oldest first.
    fn all(&self) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Network fee policy: the minimum fee for a transaction of `size` bytes.
///
/// Implementations should be monotonically non-decreasing in `size`; the
/// builder's fee fixed point is only guaranteed to converge for those.
pub trait FeePolicy: Send + Sync {
    fn fee_for(&self, size: usize) -> u64;
}

impl<F> FeePolicy for F
where
    F: Fn(usize) -> u64 + Send + Sync,
{
    fn fee_for(&self, size: usize) -> u64 {
        self(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_fee_policies() {
        let flat = |_size: usize| 1u64;
        let per_byte = |size: usize| size as u64 * 2;
        assert_eq!(flat.fee_for(500), 1);
        assert_eq!(per_byte.fee_for(10), 20);
    }

    #[test]
    fn relay_outcome_accepted() {
        assert!(RelayOutcome::Accepted.is_accepted());
        assert!(!RelayOutcome::Rejected("dust".into()).is_accepted());
        assert!(!RelayOutcome::Unreachable("offline".into()).is_accepted());
    }
}
