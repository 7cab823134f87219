//! Read-side views: balance and per-transaction confirmation status.
use std::collections::HashSet;

use crate::types::{Balance, Stxo, TxnRecord, TxnStatus, Utxo, WalletTxn};

/// Confirmations needed before a transaction is reported `Confirmed`.
pub const CONFIRMED_DEPTH: i64 = 6;

/// Spendable balance from the current coin sets. Watch-only coins are ignored.
pub fn balance(utxos: &[Utxo], stxos: &[Stxo]) -> Balance {
    let mut out = Balance::default();
    for utxo in utxos.iter().filter(|u| !u.watch_only) {
        if utxo.at_height > 0 || derives_from_confirmed(utxo, stxos) {
            out.confirmed += utxo.value;
        } else {
            out.unconfirmed += utxo.value;
        }
    }
    out
}

/// Whether an unconfirmed coin was built only from confirmed wallet coins.
///
/// Walks backwards from the creating transaction through the spent coins it
/// consumed. A transaction with no wallet inputs ends the walk as unconfirmed.
/// Each transaction is expanded once, so cyclic input terminates.
pub fn derives_from_confirmed(utxo: &Utxo, stxos: &[Stxo]) -> bool {
    let mut visited = HashSet::new();
    let mut pending = vec![utxo.outpoint.txid];
    let mut reached_confirmed = false;

    while let Some(txid) = pending.pop() {
        if !visited.insert(txid) {
            continue;
        }
        let mut inputs = stxos
            .iter()
            .filter(|s| !s.utxo.watch_only && s.spend_txid == txid)
            .peekable();
        if inputs.peek().is_none() {
            return false;
        }
        for stxo in inputs {
            if stxo.spend_height > 0 || stxo.utxo.at_height > 0 {
                reached_confirmed = true;
            } else {
                pending.push(stxo.utxo.outpoint.txid);
            }
        }
    }

    reached_confirmed
}

/// Status and confirmation count of a transaction at `height`.
///
/// `timestamp` and `now` are unix seconds; `expiry_secs` is how long an
/// unconfirmed transaction is assumed to stay in the server's mempool.
pub fn classify(
    height: i64,
    timestamp: u64,
    tip: i64,
    now: u64,
    expiry_secs: u64,
) -> (TxnStatus, i64) {
    let confs = if height > 0 { tip - height + 1 } else { height };
    match confs {
        c if c < 0 => (TxnStatus::Dead, 0),
        0 if now.saturating_sub(timestamp) <= expiry_secs => (TxnStatus::Unconfirmed, 0),
        0 => (TxnStatus::Dead, 0),
        c if c < CONFIRMED_DEPTH => (TxnStatus::Pending, c),
        c => (TxnStatus::Confirmed, c),
    }
}

/// Attach the derived status to a stored record.
pub fn describe(record: TxnRecord, tip: i64, now: u64, expiry_secs: u64) -> WalletTxn {
    let (status, confirmations) = classify(record.height, record.timestamp, tip, now, expiry_secs);
    WalletTxn {
        record,
        status,
        confirmations,
    }
}
