//! Dead-marking cascade for transactions invalidated by a conflict or reorg.
use std::collections::HashSet;

use bitcoin::Txid;
use tracing::debug;

use crate::types::{Stxo, DEAD_HEIGHT};
use crate::view::LedgerView;

/// Invalidate `root` and every wallet transaction that depends on it.
///
/// For each transaction visited:
/// - coins it spent go back to the unspent set,
/// - spends of its own outputs are dropped and their spenders are visited next,
/// - its unspent outputs are deleted,
/// - its record is set to [`DEAD_HEIGHT`].
///
/// Each txid is processed at most once, so malformed cyclic input terminates.
/// Returns the txids that were processed, in order.
pub(crate) fn mark_dead(view: &mut LedgerView, root: Txid, timestamp: u64) -> Vec<Txid> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut pending = vec![root];

    while let Some(txid) = pending.pop() {
        if !visited.insert(txid) {
            continue;
        }
        order.push(txid);

        let touched: Vec<Stxo> = view
            .stxos()
            .filter(|s| s.spend_txid == txid || s.utxo.outpoint.txid == txid)
            .cloned()
            .collect();

        for stxo in touched {
            let outpoint = stxo.utxo.outpoint;
            if stxo.spend_txid == txid {
                // the spend never happened
                view.delete_stxo(outpoint);
                view.put_utxo(stxo.utxo);
                view.update_height(txid, DEAD_HEIGHT, timestamp);
            } else {
                // spent an output that no longer exists
                view.delete_stxo(outpoint);
                view.update_height(stxo.spend_txid, DEAD_HEIGHT, timestamp);
                pending.push(stxo.spend_txid);
            }
        }

        let produced: Vec<_> = view
            .utxos()
            .filter(|u| u.outpoint.txid == txid)
            .map(|u| u.outpoint)
            .collect();
        for outpoint in produced {
            view.delete_utxo(outpoint);
        }

        view.update_height(txid, DEAD_HEIGHT, timestamp);
        debug!(%txid, "marked dead");
    }

    order
}
