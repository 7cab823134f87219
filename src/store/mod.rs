//! Persistence interfaces and implementations for the ledger collections:
//! unspent outputs, spent outputs, transaction records and watched scripts.
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::{OutPoint, ScriptBuf, Txid};

use crate::types::{Stxo, TxnRecord, Utxo};

/// One mutation of a ledger collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerOp {
    /// Insert or replace an unspent output.
    PutUtxo(Utxo),
    /// Remove an unspent output.
    DeleteUtxo(OutPoint),
    /// Insert or replace a spent output, keyed by the outpoint it spent.
    PutStxo(Stxo),
    /// Remove a spent output.
    DeleteStxo(OutPoint),
    /// Insert or replace a transaction record.
    PutTxn(TxnRecord),
    /// Change the height and timestamp of an existing record.
    UpdateHeight {
        /// Record to change.
        txid: Txid,
        /// New height.
        height: i64,
        /// New timestamp.
        timestamp: u64,
    },
}

/// An ordered group of mutations that must be applied all together or not at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    ops: Vec<LedgerOp>,
}

impl LedgerBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation.
    pub fn push(&mut self, op: LedgerOp) {
        self.ops.push(op);
    }

    /// Mutations in application order.
    pub fn ops(&self) -> &[LedgerOp] {
        &self.ops
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if nothing would change.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for LedgerBatch {
    type Item = LedgerOp;
    type IntoIter = std::vec::IntoIter<LedgerOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Keyed store behind the ledger.
///
/// Reads may be served from any committed state. [`Store::apply`] must be
/// atomic: after a failure none of the batch is visible.
#[async_trait]
pub trait Store: Send + Sync {
    /// Every unspent output, watch-only included.
    async fn utxos(&self) -> anyhow::Result<Vec<Utxo>>;

    /// Every spent output.
    async fn stxos(&self) -> anyhow::Result<Vec<Stxo>>;

    /// One transaction record.
    async fn txn(&self, txid: Txid) -> anyhow::Result<Option<TxnRecord>>;

    /// All transaction records, optionally skipping watch-only ones.
    async fn txns(&self, include_watch_only: bool) -> anyhow::Result<Vec<TxnRecord>>;

    /// Scripts monitored without a key.
    async fn watched_scripts(&self) -> anyhow::Result<Vec<ScriptBuf>>;

    /// Add several watched scripts. Already-present scripts are ignored.
    async fn put_watched_scripts(&self, scripts: &[ScriptBuf]) -> anyhow::Result<()>;

    /// Add one watched script.
    async fn put_watched_script(&self, script: ScriptBuf) -> anyhow::Result<()> {
        self.put_watched_scripts(&[script]).await
    }

    /// Apply `batch` atomically.
    async fn apply(&self, batch: LedgerBatch) -> anyhow::Result<()>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn utxos(&self) -> anyhow::Result<Vec<Utxo>> {
        (**self).utxos().await
    }

    async fn stxos(&self) -> anyhow::Result<Vec<Stxo>> {
        (**self).stxos().await
    }

    async fn txn(&self, txid: Txid) -> anyhow::Result<Option<TxnRecord>> {
        (**self).txn(txid).await
    }

    async fn txns(&self, include_watch_only: bool) -> anyhow::Result<Vec<TxnRecord>> {
        (**self).txns(include_watch_only).await
    }

    async fn watched_scripts(&self) -> anyhow::Result<Vec<ScriptBuf>> {
        (**self).watched_scripts().await
    }

    async fn put_watched_scripts(&self, scripts: &[ScriptBuf]) -> anyhow::Result<()> {
        (**self).put_watched_scripts(scripts).await
    }

    async fn apply(&self, batch: LedgerBatch) -> anyhow::Result<()> {
        (**self).apply(batch).await
    }
}

/// In-process store.
pub mod memory;
pub use memory::MemoryStore;

// submodules / concrete stores live here
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
