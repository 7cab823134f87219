//! Ingestion engine: turns reported transactions into ledger updates.
//!
//! 1) sanity-check the transaction,
//! 2) skip it if already known at an equal or better height,
//! 3) resolve double spends (first seen wins while unconfirmed, a confirmed
//!    report wins over everything it conflicts with),
//! 4) match outputs and inputs against owned and watched scripts,
//! 5) persist the whole change as one batch and notify listeners.
use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{consensus, OutPoint, Transaction, Txid};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    config::LedgerConfig,
    error::{LedgerError, Result},
    hooks::{Listeners, TransactionListener},
    keys::KeySource,
    matcher::{script_address, script_to_address, ScriptMatcher, ScriptSet},
    resolver::mark_dead,
    sanity::check_transaction_sanity,
    store::Store,
    types::{
        Stxo, TransactionCallback, TransactionInput, TransactionOutput, TxnRecord, Utxo,
        DEAD_HEIGHT,
    },
    view::LedgerView,
};

/// Stored coins and records read under one lock, consistent with the last ingestion.
#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    /// Unspent outputs.
    pub utxos: Vec<Utxo>,
    /// Spent outputs.
    pub stxos: Vec<Stxo>,
}

/// Core ledger. `S` = ledger store, `K` = key derivation source.
pub struct TxStore<S, K> {
    store: S,
    keys: K,
    config: LedgerConfig,
    matcher: ScriptMatcher,
    /// txid -> stored height. Its write guard is the per-ledger write lock.
    txids: RwLock<HashMap<Txid, i64>>,
    /// Serializes ingestions, including their notifications. Always taken
    /// before `txids`.
    notify: Mutex<()>,
    listeners: Listeners,
}

/// What ingestion decided to do with a transaction that touched the wallet.
struct Matched {
    hits: u32,
    watch_only: bool,
    value: i64,
    used: Vec<Vec<u8>>,
    event: TransactionCallback,
}

impl<S, K> TxStore<S, K>
where
    S: Store,
    K: KeySource,
{
    /// Load the txid index and derive the initial match set.
    pub async fn new(store: S, keys: K, config: LedgerConfig) -> Result<Self> {
        let ts = Self {
            matcher: ScriptMatcher::new(config.address_kind),
            store,
            keys,
            config,
            txids: RwLock::new(HashMap::new()),
            notify: Mutex::new(()),
            listeners: Listeners::default(),
        };
        ts.populate().await?;
        Ok(ts)
    }

    /// Re-derive the match set and reload the txid index from the store.
    pub async fn populate(&self) -> Result<()> {
        let mut txids = self.txids.write().await;
        self.matcher.refresh(&self.keys, &self.store).await?;
        let records = self
            .store
            .txns(true)
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        txids.clear();
        txids.extend(records.into_iter().map(|r| (r.txid, r.height)));
        debug!(known = txids.len(), "txid index loaded");
        Ok(())
    }

    /// Re-derive only the match set, e.g. after new keys or watched scripts.
    pub async fn refresh_scripts(&self) -> Result<Arc<ScriptSet>> {
        self.matcher.refresh(&self.keys, &self.store).await
    }

    /// Scripts currently matched against.
    pub fn scripts(&self) -> Arc<ScriptSet> {
        self.matcher.snapshot()
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Underlying key source.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Settings in effect.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Register a listener; listeners are called in registration order.
    pub async fn add_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.listeners.register(listener).await;
    }

    /// Number of registered listeners.
    pub async fn listener_count(&self) -> usize {
        self.listeners.len().await
    }

    /// Height recorded for `txid` in the index.
    pub async fn known_height(&self, txid: &Txid) -> Option<i64> {
        self.txids.read().await.get(txid).copied()
    }

    /// Read unspent and spent outputs without interleaving with an ingestion.
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let _guard = self.txids.read().await;
        let utxos = self
            .store
            .utxos()
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        let stxos = self
            .store
            .stxos()
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        Ok(LedgerSnapshot { utxos, stxos })
    }

    /// Stored records, read under the same lock as [`TxStore::snapshot`].
    pub async fn records(&self, include_watch_only: bool) -> Result<Vec<TxnRecord>> {
        let _guard = self.txids.read().await;
        self.store
            .txns(include_watch_only)
            .await
            .map_err(LedgerError::StoreUnavailable)
    }

    /// One stored record.
    pub async fn record(&self, txid: Txid) -> Result<Option<TxnRecord>> {
        let _guard = self.txids.read().await;
        self.store
            .txn(txid)
            .await
            .map_err(LedgerError::StoreUnavailable)
    }

    /// Apply a transaction reported at `height` (`0` = mempool) and `timestamp`
    /// (unix seconds). Returns the number of wallet hits; `1` for an already
    /// known transaction and `0` when it is irrelevant or discarded as a
    /// later-seen double spend.
    ///
    /// # Errors
    /// `MalformedTransaction` if the sanity check fails, `StoreUnavailable` or
    /// `KeyDerivationFailure` if a collaborator fails. In every error case
    /// the ledger is left untouched.
    pub async fn ingest(&self, tx: &Transaction, height: i64, timestamp: u64) -> Result<u32> {
        check_transaction_sanity(tx, self.config.max_tx_size)?;
        let txid = tx.compute_txid();

        // lock order: `notify`, then `txids`
        let notify = self.notify.lock().await;
        let mut txids = self.txids.write().await;
        match txids.get(&txid) {
            Some(&seen) if seen > 0 || (seen == 0 && height <= 0) => {
                debug!(%txid, seen, height, "already processed");
                return Ok(1);
            }
            Some(&seen) if seen < 0 && height <= 0 => {
                debug!(%txid, "ignoring unconfirmed report of dead transaction");
                return Ok(0);
            }
            _ => {}
        }

        let mut view = LedgerView::load(&self.store)
            .await
            .map_err(LedgerError::StoreUnavailable)?;

        let conflicts = double_spends(&view, tx, txid);
        let mut killed = Vec::new();
        if !conflicts.is_empty() {
            if height <= 0 {
                debug!(
                    %txid,
                    conflicts = conflicts.len(),
                    "double spend of unconfirmed tx, first seen wins"
                );
                return Ok(0);
            }
            for loser in conflicts {
                let dead = mark_dead(&mut view, loser, timestamp);
                info!(%txid, %loser, cascaded = dead.len(), "confirmed double spend invalidated");
                killed.extend(dead);
            }
        }

        let scripts = self.matcher.snapshot();
        let mut m = self.match_transaction(&mut view, &scripts, tx, txid, height);

        if height > 0 {
            let unconfirmed_spends: Vec<Stxo> = view
                .stxos()
                .filter(|s| s.spend_txid == txid && s.spend_height <= 0)
                .cloned()
                .collect();
            for mut stxo in unconfirmed_spends {
                stxo.spend_height = height;
                if stxo.utxo.watch_only {
                    m.watch_only = true;
                } else {
                    m.hits += 1;
                }
                view.put_stxo(stxo);
            }
        }

        // an irrelevant confirmed conflict still has to invalidate the loser
        let relevant = m.hits > 0 || m.watch_only;
        if !relevant && killed.is_empty() {
            return Ok(0);
        }

        let mut should_notify = false;
        let mut new_height = None;
        let existing = view.txn(&txid).cloned();
        match existing {
            None if relevant => {
                view.put_txn(TxnRecord {
                    txid,
                    raw: consensus::encode::serialize(tx),
                    value: m.value,
                    height,
                    timestamp,
                    watch_only: m.hits == 0,
                });
                new_height = Some(height);
                should_notify = true;
            }
            // never let a later report pull a confirmed height back down
            Some(existing) if existing.height <= 0 && height > 0 => {
                view.update_height(txid, height, existing.timestamp);
                new_height = Some(height);
                m.event.value = existing.value;
                should_notify = true;
            }
            _ => {}
        }

        for script_address in &m.used {
            self.keys
                .mark_key_used(script_address)
                .await
                .map_err(LedgerError::KeyDerivationFailure)?;
        }

        let batch = view.into_batch();
        let ops = batch.len();
        self.store
            .apply(batch)
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        for dead in killed {
            if txids.contains_key(&dead) {
                txids.insert(dead, DEAD_HEIGHT);
            }
        }
        if let Some(h) = new_height {
            txids.insert(txid, h);
        }
        info!(%txid, height, hits = m.hits, watch_only = m.watch_only, ops, "ingested");

        if let Err(e) = self.matcher.refresh(&self.keys, &self.store).await {
            warn!(%txid, error = %e, "match set refresh failed");
        }

        // readers may proceed while listeners run; ingestions still wait on `notify`
        drop(txids);
        if should_notify {
            m.event.block_time = timestamp;
            self.listeners.notify(&m.event).await;
        }
        drop(notify);

        Ok(if relevant { m.hits + 1 } else { 0 })
    }

    /// Decode consensus bytes and ingest.
    pub async fn ingest_raw(&self, raw: &[u8], height: i64, timestamp: u64) -> Result<u32> {
        let tx: Transaction = consensus::encode::deserialize(raw)
            .map_err(|e| LedgerError::MalformedTransaction(format!("decode: {e}")))?;
        self.ingest(&tx, height, timestamp).await
    }

    fn match_transaction(
        &self,
        view: &mut LedgerView,
        scripts: &ScriptSet,
        tx: &Transaction,
        txid: Txid,
        height: i64,
    ) -> Matched {
        let network = self.config.network;
        let mut m = Matched {
            hits: 0,
            watch_only: false,
            value: 0,
            used: Vec::new(),
            event: TransactionCallback {
                txid,
                height,
                value: 0,
                block_time: 0,
                watch_only: false,
                inputs: Vec::new(),
                outputs: Vec::with_capacity(tx.output.len()),
            },
        };

        for (vout, txout) in tx.output.iter().enumerate() {
            let index = vout as u32;
            let owned = scripts.is_owned(&txout.script_pubkey);
            let watched = !owned && scripts.is_watched(&txout.script_pubkey);

            if owned || watched {
                let utxo = Utxo {
                    outpoint: OutPoint::new(txid, index),
                    script_pubkey: txout.script_pubkey.clone(),
                    value: txout.value,
                    at_height: height,
                    watch_only: watched,
                };
                record_output(view, utxo);
            }
            if owned {
                match script_address(&txout.script_pubkey) {
                    Ok(addr) => m.used.push(addr),
                    Err(e) => debug!(%txid, vout, error = %e, "owned output without key hash"),
                }
                m.value += txout.value.to_sat() as i64;
                m.hits += 1;
            }
            if watched {
                m.watch_only = true;
            }

            m.event.outputs.push(TransactionOutput {
                address: script_to_address(&txout.script_pubkey, network),
                value: txout.value,
                index,
            });
        }

        for txin in &tx.input {
            let Some(utxo) = view.utxo(&txin.previous_output).cloned() else {
                continue;
            };
            view.delete_utxo(utxo.outpoint);
            if utxo.watch_only {
                m.watch_only = true;
            } else {
                m.value -= utxo.value.to_sat() as i64;
                m.hits += 1;
            }
            m.event.inputs.push(TransactionInput {
                outpoint: utxo.outpoint,
                linked_address: script_to_address(&utxo.script_pubkey, network),
                value: utxo.value,
            });
            view.put_stxo(Stxo {
                utxo,
                spend_height: height,
                spend_txid: txid,
            });
        }

        m.event.watch_only = m.watch_only;
        m.event.value = m.value;
        m
    }
}

/// Add or refresh a matched output without resurrecting a spent one.
fn record_output(view: &mut LedgerView, utxo: Utxo) {
    let spent = view.stxo(&utxo.outpoint).cloned();
    if let Some(stxo) = spent {
        if stxo.utxo.at_height != utxo.at_height && utxo.at_height > 0 {
            view.put_stxo(Stxo { utxo, ..stxo });
        }
        return;
    }
    view.put_utxo(utxo);
}

/// Live stored transactions that spend any outpoint `tx` also spends.
fn double_spends(view: &LedgerView, tx: &Transaction, txid: Txid) -> Vec<Txid> {
    let mut dubs = Vec::new();
    for record in view.txns() {
        if record.is_dead() || record.txid == txid {
            continue;
        }
        let stored = match record.transaction() {
            Ok(t) => t,
            Err(e) => {
                warn!(txid = %record.txid, error = %e, "skipping undecodable stored transaction");
                continue;
            }
        };
        let conflicts = tx.input.iter().any(|ours| {
            stored
                .input
                .iter()
                .any(|theirs| theirs.previous_output == ours.previous_output)
        });
        if conflicts {
            dubs.push(record.txid);
        }
    }
    dubs.sort();
    dubs
}
