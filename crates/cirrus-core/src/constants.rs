//! Protocol and wallet constants. All monetary values in units (1 CIR = 10^8 units).

pub const COIN: u64 = 100_000_000;

/// Largest amount any single value, payment, or payment total may carry.
///
/// # Examples
///
/// ```
/// use cirrus_core::constants::{COIN, MAX_MONEY};
/// assert_eq!(MAX_MONEY, 2_000_000_000 * COIN);
/// ```
pub const MAX_MONEY: u64 = 2_000_000_000 * COIN;

/// Number of decimal places in the human-readable amount form.
pub const AMOUNT_DECIMALS: u32 = 8;

/// Current transaction version written by the builder.
pub const TX_VERSION: u64 = 1;

/// Confirmations a coinbase or coinstake output needs before it can be spent.
pub const COINBASE_MATURITY: u64 = 100;

pub const MAX_TX_SIZE: usize = 100_000;
pub const MAX_INPUTS: usize = 1000;
pub const MAX_OUTPUTS: usize = 1000;

/// Floor applied by the default fee policy, in units.
pub const MIN_TX_FEE: u64 = 1000;

/// Default fee charged per started kilobyte of serialized transaction.
pub const DEFAULT_FEE_PER_KB: u64 = 10_000;

/// Change at or below this value is folded into the fee instead of
/// producing an output.
pub const DEFAULT_DUST_THRESHOLD: u64 = 546;

/// Upper bound on fee/size fixed-point rounds before the builder gives up.
pub const DEFAULT_MAX_FEE_ROUNDS: u32 = 10;

/// Version byte prefixed to mainnet base58check addresses.
pub const MAINNET_ADDRESS_VERSION: u8 = 0x3e;

/// Version byte prefixed to testnet base58check addresses.
pub const TESTNET_ADDRESS_VERSION: u8 = 0x6f;

/// Length in bytes of an Ed25519 signature stored in a [`TxInput`](crate::types::TxInput).
pub const SIGNATURE_LEN: usize = 64;

/// Length in bytes of an Ed25519 public key stored in a [`TxInput`](crate::types::TxInput).
pub const PUBLIC_KEY_LEN: usize = 32;
