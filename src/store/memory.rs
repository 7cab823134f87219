//! In-process store. Useful for tests and for hosts that persist elsewhere.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use bitcoin::{OutPoint, ScriptBuf, Txid};

use crate::store::{LedgerBatch, LedgerOp, Store};
use crate::types::{Stxo, TxnRecord, Utxo};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Tables {
    utxos: BTreeMap<OutPoint, Utxo>,
    stxos: BTreeMap<OutPoint, Stxo>,
    txns: HashMap<Txid, TxnRecord>,
    watched: BTreeSet<ScriptBuf>,
}

/// Everything in a [`MemoryStore`], for comparing states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemorySnapshot {
    /// Unspent outputs in outpoint order.
    pub utxos: Vec<Utxo>,
    /// Spent outputs in outpoint order.
    pub stxos: Vec<Stxo>,
    /// Records in txid order.
    pub txns: Vec<TxnRecord>,
    /// Watched scripts in byte order.
    pub watched: Vec<ScriptBuf>,
}

/// All collections under one lock; a batch is applied while holding it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Copy of the full contents.
    pub fn snapshot(&self) -> anyhow::Result<MemorySnapshot> {
        let t = self.lock()?;
        let mut txns: Vec<TxnRecord> = t.txns.values().cloned().collect();
        txns.sort_by_key(|r| r.txid);
        Ok(MemorySnapshot {
            utxos: t.utxos.values().cloned().collect(),
            stxos: t.stxos.values().cloned().collect(),
            txns,
            watched: t.watched.iter().cloned().collect(),
        })
    }
}

fn apply_op(t: &mut Tables, op: LedgerOp) {
    match op {
        LedgerOp::PutUtxo(u) => {
            t.utxos.insert(u.outpoint, u);
        }
        LedgerOp::DeleteUtxo(op) => {
            t.utxos.remove(&op);
        }
        LedgerOp::PutStxo(s) => {
            t.stxos.insert(s.utxo.outpoint, s);
        }
        LedgerOp::DeleteStxo(op) => {
            t.stxos.remove(&op);
        }
        LedgerOp::PutTxn(r) => {
            t.txns.insert(r.txid, r);
        }
        LedgerOp::UpdateHeight {
            txid,
            height,
            timestamp,
        } => {
            if let Some(r) = t.txns.get_mut(&txid) {
                r.height = height;
                r.timestamp = timestamp;
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn utxos(&self) -> anyhow::Result<Vec<Utxo>> {
        Ok(self.lock()?.utxos.values().cloned().collect())
    }

    async fn stxos(&self) -> anyhow::Result<Vec<Stxo>> {
        Ok(self.lock()?.stxos.values().cloned().collect())
    }

    async fn txn(&self, txid: Txid) -> anyhow::Result<Option<TxnRecord>> {
        Ok(self.lock()?.txns.get(&txid).cloned())
    }

    async fn txns(&self, include_watch_only: bool) -> anyhow::Result<Vec<TxnRecord>> {
        Ok(self
            .lock()?
            .txns
            .values()
            .filter(|r| include_watch_only || !r.watch_only)
            .cloned()
            .collect())
    }

    async fn watched_scripts(&self) -> anyhow::Result<Vec<ScriptBuf>> {
        Ok(self.lock()?.watched.iter().cloned().collect())
    }

    async fn put_watched_scripts(&self, scripts: &[ScriptBuf]) -> anyhow::Result<()> {
        self.lock()?.watched.extend(scripts.iter().cloned());
        Ok(())
    }

    async fn apply(&self, batch: LedgerBatch) -> anyhow::Result<()> {
        let mut t = self.lock()?;
        for op in batch {
            apply_op(&mut t, op);
        }
        Ok(())
    }
}
