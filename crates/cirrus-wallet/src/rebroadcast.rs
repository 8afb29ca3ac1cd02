//! Re-sending transactions whose relay has not yet succeeded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use cirrus_core::record::{TransactionRecord, TxStatus};
use cirrus_core::traits::{Relay, RelayOutcome, TransactionStore};
use cirrus_core::types::Hash256;

use crate::error::WalletError;
use crate::wallet::Wallet;

/// Summary of one pass over pending records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebroadcastReport {
    pub attempted: usize,
    pub relayed: Vec<Hash256>,
    pub rejected: Vec<(Hash256, String)>,
    pub unreachable: Vec<(Hash256, String)>,
    /// Records whose store update failed; left for the next pass.
    pub failed: Vec<(Hash256, String)>,
}

impl RebroadcastReport {
    /// Records still pending after the pass.
    pub fn still_pending(&self) -> usize {
        self.rejected.len() + self.unreachable.len() + self.failed.len()
    }
}

/// Broadcast one record and update the store with the outcome.
///
/// Only a `PendingRelay` record moves to `Relayed`; a confirmed record keeps
/// its status.
fn resend(
    record: &TransactionRecord,
    store: &dyn TransactionStore,
    relay: &dyn Relay,
) -> Result<RelayOutcome, WalletError> {
    let outcome = relay.broadcast(&record.tx);
    match &outcome {
        RelayOutcome::Accepted if record.status.is_pending() => {
            store.update_status(&record.txid, TxStatus::Relayed)?
        }
        RelayOutcome::Accepted => {}
        RelayOutcome::Rejected(reason) | RelayOutcome::Unreachable(reason) => {
            store.record_relay_attempt(&record.txid, reason)?
        }
    }
    Ok(outcome)
}

/// Re-send every `PendingRelay` record.
///
/// A store failure on one record is logged and reported in
/// [`RebroadcastReport::failed`]; the pass continues with the next record.
pub fn rebroadcast_pending(
    store: &dyn TransactionStore,
    relay: &dyn Relay,
) -> Result<RebroadcastReport, WalletError> {
    let pending = store.pending()?;
    let mut report = RebroadcastReport {
        attempted: pending.len(),
        ..RebroadcastReport::default()
    };

    for record in &pending {
        match resend(record, store, relay) {
            Err(e) => {
                warn!(txid = %record.txid, error = %e, "rebroadcast store update failed");
                report.failed.push((record.txid, e.to_string()));
            }
            Ok(RelayOutcome::Accepted) => {
                info!(txid = %record.txid, attempts = record.relay_attempts + 1, "pending transaction relayed");
                report.relayed.push(record.txid);
            }
            Ok(RelayOutcome::Rejected(reason)) => {
                warn!(txid = %record.txid, %reason, "rebroadcast rejected");
                report.rejected.push((record.txid, reason));
            }
            Ok(RelayOutcome::Unreachable(reason)) => {
                debug!(txid = %record.txid, %reason, "rebroadcast unreachable");
                report.unreachable.push((record.txid, reason));
            }
        }
    }
    Ok(report)
}

/// Re-send a single record, surfacing relay failure as an error.
///
/// A record that is already relayed or confirmed is sent again; the relay
/// is expected to treat a known transaction as accepted.
pub fn rebroadcast_one(
    store: &dyn TransactionStore,
    relay: &dyn Relay,
    txid: &Hash256,
) -> Result<TxStatus, WalletError> {
    let record = store
        .get(txid)?
        .ok_or_else(|| WalletError::UnknownTransaction(txid.to_string()))?;

    match resend(&record, store, relay)? {
        RelayOutcome::Accepted => match record.status {
            TxStatus::Confirmed { .. } => Ok(record.status),
            _ => Ok(TxStatus::Relayed),
        },
        RelayOutcome::Rejected(reason) => Err(WalletError::RelayRejected(reason)),
        RelayOutcome::Unreachable(reason) => Err(WalletError::RelayUnreachable(reason)),
    }
}

/// Run [`Wallet::rebroadcast_pending`] every `interval` until `shutdown`
/// becomes `true` or its sender is dropped.
///
/// Each pass runs on the blocking pool, since relay and store calls are
/// synchronous.
pub fn spawn_rebroadcaster(
    wallet: Arc<Wallet>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "rebroadcaster started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let w = Arc::clone(&wallet);
                    match tokio::task::spawn_blocking(move || w.rebroadcast_pending()).await {
                        Ok(Ok(report)) if report.attempted > 0 => {
                            info!(
                                attempted = report.attempted,
                                relayed = report.relayed.len(),
                                pending = report.still_pending(),
                                "rebroadcast pass"
                            );
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "rebroadcast pass failed"),
                        Err(e) => error!(error = %e, "rebroadcast task panicked"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("rebroadcaster stopped");
    })
}
