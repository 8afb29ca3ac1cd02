//! Wallet error types.
//!
//! Validation failures (`InvalidAmount`, `DuplicateDestination`) and
//! `InsufficientFunds` are raised before the ledger is touched.
//! `LedgerConflict` leaves no partial reservation behind. Everything raised
//! after a reservation exists is paired with a release by the caller, except
//! `PersistenceFailure`, which happens after the spend is final.

use cirrus_core::error::{AddressError, AmountError, CryptoError, StoreError, TransactionError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The same destination appears twice in one payment list.
    #[error("duplicate destination: {0}")]
    DuplicateDestination(String),

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Spendable value considered, in units.
        have: u64,
        /// Value required including fee, in units.
        need: u64,
    },

    /// The fee/size fixed point did not settle within the round bound.
    #[error("fee did not converge after {rounds} rounds")]
    FeeConvergenceFailure { rounds: u32 },

    #[error("transaction too large: {0}")]
    TransactionTooLarge(String),

    /// No private key for an input's destination script.
    #[error("missing key for {0}")]
    MissingKey(String),

    #[error("signature failure: {0}")]
    SignatureFailure(String),

    /// An output is already reserved or spent by another build.
    #[error("ledger conflict on {outpoint}")]
    LedgerConflict { outpoint: String },

    #[error("relay rejected transaction: {0}")]
    RelayRejected(String),

    #[error("relay unreachable: {0}")]
    RelayUnreachable(String),

    /// The spend is final in the ledger but no durable record exists.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl WalletError {
    /// True for the one failure that needs an operator to reconcile the
    /// ledger against wallet history by hand.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(self, WalletError::PersistenceFailure(_))
    }

    /// True for failures detected before any ledger mutation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WalletError::InvalidAmount(_)
                | WalletError::DuplicateDestination(_)
                | WalletError::InsufficientFunds { .. }
        )
    }
}

impl From<AmountError> for WalletError {
    fn from(e: AmountError) -> Self {
        WalletError::InvalidAmount(e.to_string())
    }
}

impl From<StoreError> for WalletError {
    fn from(e: StoreError) -> Self {
        WalletError::PersistenceFailure(e.to_string())
    }
}
