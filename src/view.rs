//! Working copy of the ledger used for one write transaction.
//!
//! Every mutation updates the in-memory tables and is recorded in a
//! [`LedgerBatch`]; nothing reaches the store until the batch is applied.
use std::collections::{BTreeMap, HashMap};

use bitcoin::{OutPoint, Txid};

use crate::store::{LedgerBatch, LedgerOp, Store};
use crate::types::{Stxo, TxnRecord, Utxo};

#[derive(Debug, Default)]
pub(crate) struct LedgerView {
    utxos: BTreeMap<OutPoint, Utxo>,
    stxos: BTreeMap<OutPoint, Stxo>,
    txns: HashMap<Txid, TxnRecord>,
    batch: LedgerBatch,
}

impl LedgerView {
    pub(crate) fn from_parts(utxos: Vec<Utxo>, stxos: Vec<Stxo>, txns: Vec<TxnRecord>) -> Self {
        Self {
            utxos: utxos.into_iter().map(|u| (u.outpoint, u)).collect(),
            stxos: stxos.into_iter().map(|s| (s.utxo.outpoint, s)).collect(),
            txns: txns.into_iter().map(|r| (r.txid, r)).collect(),
            batch: LedgerBatch::new(),
        }
    }

    pub(crate) async fn load<S: Store + ?Sized>(store: &S) -> anyhow::Result<Self> {
        let utxos = store.utxos().await?;
        let stxos = store.stxos().await?;
        let txns = store.txns(true).await?;
        Ok(Self::from_parts(utxos, stxos, txns))
    }

    pub(crate) fn utxo(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.get(outpoint)
    }

    pub(crate) fn utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    pub(crate) fn stxo(&self, outpoint: &OutPoint) -> Option<&Stxo> {
        self.stxos.get(outpoint)
    }

    pub(crate) fn stxos(&self) -> impl Iterator<Item = &Stxo> {
        self.stxos.values()
    }

    pub(crate) fn txn(&self, txid: &Txid) -> Option<&TxnRecord> {
        self.txns.get(txid)
    }

    pub(crate) fn txns(&self) -> impl Iterator<Item = &TxnRecord> {
        self.txns.values()
    }

    pub(crate) fn put_utxo(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.outpoint, utxo.clone());
        self.batch.push(LedgerOp::PutUtxo(utxo));
    }

    pub(crate) fn delete_utxo(&mut self, outpoint: OutPoint) {
        if self.utxos.remove(&outpoint).is_some() {
            self.batch.push(LedgerOp::DeleteUtxo(outpoint));
        }
    }

    pub(crate) fn put_stxo(&mut self, stxo: Stxo) {
        self.stxos.insert(stxo.utxo.outpoint, stxo.clone());
        self.batch.push(LedgerOp::PutStxo(stxo));
    }

    pub(crate) fn delete_stxo(&mut self, outpoint: OutPoint) {
        if self.stxos.remove(&outpoint).is_some() {
            self.batch.push(LedgerOp::DeleteStxo(outpoint));
        }
    }

    pub(crate) fn put_txn(&mut self, record: TxnRecord) {
        self.txns.insert(record.txid, record.clone());
        self.batch.push(LedgerOp::PutTxn(record));
    }

    /// No-op for transactions without a record.
    pub(crate) fn update_height(&mut self, txid: Txid, height: i64, timestamp: u64) {
        if let Some(r) = self.txns.get_mut(&txid) {
            r.height = height;
            r.timestamp = timestamp;
            self.batch.push(LedgerOp::UpdateHeight {
                txid,
                height,
                timestamp,
            });
        }
    }

    pub(crate) fn into_batch(self) -> LedgerBatch {
        self.batch
    }
}
