//! Wallet-owned unspent output ledger with exclusive reservations.
//!
//! Every output is in exactly one of three states: available, reserved by one
//! in-flight build, or spent. All state lives behind a single mutex so that
//! `reserve` is atomic across its whole outpoint set. The lock is never held
//! across signing, persistence, or relay calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, warn};

use cirrus_core::types::{OutPoint, UnspentOutput};

use crate::error::WalletError;

/// Identifier of an open reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationId(u64);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Exclusive claim on a set of outputs, held by one build until it is
/// committed or released.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    id: ReservationId,
    outpoints: Vec<OutPoint>,
    total_value: u64,
}

impl Reservation {
    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn outpoints(&self) -> &[OutPoint] {
        &self.outpoints
    }

    /// Sum of the reserved output values.
    pub fn total_value(&self) -> u64 {
        self.total_value
    }
}

#[derive(Default)]
struct LedgerState {
    utxos: BTreeMap<OutPoint, UnspentOutput>,
    reserved: HashMap<OutPoint, ReservationId>,
    reservations: HashMap<ReservationId, Vec<OutPoint>>,
    spent: HashSet<OutPoint>,
    next_id: u64,
    tip_height: u64,
}

impl LedgerState {
    fn is_available(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint) && !self.reserved.contains_key(outpoint)
    }
}

/// The wallet's set of owned unspent outputs.
pub struct UtxoLedger {
    state: Mutex<LedgerState>,
}

impl UtxoLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Credit an owned output. Returns `false` if the outpoint is already
    /// known or was spent by this wallet.
    pub fn insert(&self, utxo: UnspentOutput) -> bool {
        let mut state = self.state.lock();
        if state.spent.contains(&utxo.outpoint) || state.utxos.contains_key(&utxo.outpoint) {
            return false;
        }
        debug!(outpoint = %utxo.outpoint, value = utxo.value(), "ledger credit");
        state.utxos.insert(utxo.outpoint.clone(), utxo);
        true
    }

    /// Outputs neither reserved nor spent, oldest first.
    pub fn list_available(&self) -> Vec<UnspentOutput> {
        let state = self.state.lock();
        let mut available: Vec<UnspentOutput> = state
            .utxos
            .values()
            .filter(|u| !state.reserved.contains_key(&u.outpoint))
            .cloned()
            .collect();
        available.sort_by(|a, b| {
            a.block_height
                .cmp(&b.block_height)
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        });
        available
    }

    /// Claim `outpoints` exclusively.
    ///
    /// Fails with [`WalletError::LedgerConflict`] naming the first outpoint
    /// that is unknown, spent, already reserved, or listed twice. Nothing is
    /// reserved on failure.
    pub fn reserve(&self, outpoints: &[OutPoint]) -> Result<Reservation, WalletError> {
        let mut state = self.state.lock();

        let mut seen = HashSet::with_capacity(outpoints.len());
        let mut total_value: u64 = 0;
        for op in outpoints {
            if !seen.insert(op) || !state.is_available(op) {
                return Err(WalletError::LedgerConflict {
                    outpoint: op.to_string(),
                });
            }
            let value = state.utxos.get(op).map(|u| u.value()).unwrap_or(0);
            total_value = total_value.saturating_add(value);
        }

        let id = ReservationId(state.next_id);
        state.next_id += 1;
        for op in outpoints {
            state.reserved.insert(op.clone(), id);
        }
        state.reservations.insert(id, outpoints.to_vec());

        debug!(reservation = %id, inputs = outpoints.len(), total_value, "ledger reserve");
        Ok(Reservation {
            id,
            outpoints: outpoints.to_vec(),
            total_value,
        })
    }

    /// Mark the reserved outputs permanently spent and close the reservation.
    pub fn commit_spend(&self, reservation: &Reservation) -> Result<(), WalletError> {
        let mut state = self.state.lock();
        let outpoints = state.reservations.remove(&reservation.id).ok_or_else(|| {
            WalletError::LedgerConflict {
                outpoint: reservation
                    .outpoints
                    .first()
                    .map(|op| op.to_string())
                    .unwrap_or_else(|| reservation.id.to_string()),
            }
        })?;

        for op in &outpoints {
            state.reserved.remove(op);
            state.utxos.remove(op);
            state.spent.insert(op.clone());
        }
        debug!(reservation = %reservation.id, inputs = outpoints.len(), "ledger spend");
        Ok(())
    }

    /// Return the reserved outputs to the available pool.
    ///
    /// Returns `false` if the reservation was already committed or released.
    pub fn release(&self, reservation: &Reservation) -> bool {
        let mut state = self.state.lock();
        let Some(outpoints) = state.reservations.remove(&reservation.id) else {
            return false;
        };
        for op in &outpoints {
            state.reserved.remove(op);
        }
        debug!(reservation = %reservation.id, inputs = outpoints.len(), "ledger release");
        true
    }

    /// Sum of available output values.
    pub fn available_balance(&self) -> u64 {
        let state = self.state.lock();
        state
            .utxos
            .values()
            .filter(|u| !state.reserved.contains_key(&u.outpoint))
            .fold(0u64, |acc, u| acc.saturating_add(u.value()))
    }

    /// Sum of output values currently held by open reservations.
    pub fn reserved_balance(&self) -> u64 {
        let state = self.state.lock();
        state
            .reserved
            .keys()
            .filter_map(|op| state.utxos.get(op))
            .fold(0u64, |acc, u| acc.saturating_add(u.value()))
    }

    pub fn reserved_count(&self) -> usize {
        self.state.lock().reserved.len()
    }

    pub fn is_reserved(&self, outpoint: &OutPoint) -> bool {
        self.state.lock().reserved.contains_key(outpoint)
    }

    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.state.lock().spent.contains(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<UnspentOutput> {
        self.state.lock().utxos.get(outpoint).cloned()
    }

    /// Number of unspent outputs, reserved ones included.
    pub fn len(&self) -> usize {
        self.state.lock().utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update the chain tip used to derive confirmation depth.
    pub fn set_tip_height(&self, height: u64) {
        let mut state = self.state.lock();
        if height < state.tip_height {
            warn!(old = state.tip_height, new = height, "ledger tip moved backwards");
        }
        state.tip_height = height;
    }

    pub fn tip_height(&self) -> u64 {
        self.state.lock().tip_height
    }
}

impl Default for UtxoLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UtxoLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UtxoLedger")
            .field("utxos", &state.utxos.len())
            .field("reserved", &state.reserved.len())
            .field("spent", &state.spent.len())
            .field("tip_height", &state.tip_height)
            .finish()
    }
}
