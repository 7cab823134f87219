//! Embedded SQLite store implementation for the ledger collections.
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
use rusqlite::{params, Connection, Row, Transaction};
use tokio::task;

use crate::store::{LedgerBatch, LedgerOp, Store};
use crate::types::{Stxo, TxnRecord, Utxo};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS utxos (
        txid       TEXT    NOT NULL,
        vout       INTEGER NOT NULL,
        value      INTEGER NOT NULL,
        height     INTEGER NOT NULL,
        script     BLOB    NOT NULL,
        watch_only INTEGER NOT NULL,
        PRIMARY KEY (txid, vout)
    );
    CREATE TABLE IF NOT EXISTS stxos (
        txid         TEXT    NOT NULL,
        vout         INTEGER NOT NULL,
        value        INTEGER NOT NULL,
        height       INTEGER NOT NULL,
        script       BLOB    NOT NULL,
        watch_only   INTEGER NOT NULL,
        spend_height INTEGER NOT NULL,
        spend_txid   TEXT    NOT NULL,
        PRIMARY KEY (txid, vout)
    );
    CREATE TABLE IF NOT EXISTS txns (
        txid       TEXT PRIMARY KEY,
        tx         BLOB    NOT NULL,
        value      INTEGER NOT NULL,
        height     INTEGER NOT NULL,
        timestamp  INTEGER NOT NULL,
        watch_only INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS watched_scripts (
        script BLOB PRIMARY KEY
    );
"#;

/// Tables:
///   utxos(txid, vout, value, height, script, watch_only)
///   stxos(utxo columns..., spend_height, spend_txid)
///   txns(txid, tx, value, height, timestamp, watch_only)
///   watched_scripts(script)
///
/// Txids are stored as their display hex; `tx` holds the consensus bytes.
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Convenient in-memory store (useful for tests)
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("sqlite connection lock poisoned"))?;
            f(&mut guard)
        })
        .await?
    }

    fn parse_txid(s: &str) -> anyhow::Result<Txid> {
        Txid::from_str(s).with_context(|| format!("parse txid {s}"))
    }

    fn utxo_from_row(row: &Row<'_>) -> anyhow::Result<Utxo> {
        let txid: String = row.get(0)?;
        let vout: u32 = row.get(1)?;
        let value: i64 = row.get(2)?;
        let height: i64 = row.get(3)?;
        let script: Vec<u8> = row.get(4)?;
        let watch_only: bool = row.get(5)?;
        Ok(Utxo {
            outpoint: OutPoint::new(Self::parse_txid(&txid)?, vout),
            script_pubkey: ScriptBuf::from_bytes(script),
            value: Amount::from_sat(u64::try_from(value).context("negative utxo value")?),
            at_height: height,
            watch_only,
        })
    }

    fn txn_from_row(row: &Row<'_>) -> anyhow::Result<TxnRecord> {
        let txid: String = row.get(0)?;
        let timestamp: i64 = row.get(4)?;
        Ok(TxnRecord {
            txid: Self::parse_txid(&txid)?,
            raw: row.get(1)?,
            value: row.get(2)?,
            height: row.get(3)?,
            timestamp: u64::try_from(timestamp).context("negative timestamp")?,
            watch_only: row.get(5)?,
        })
    }

    fn put_utxo(tx: &Transaction<'_>, u: &Utxo) -> anyhow::Result<()> {
        tx.execute(
            "INSERT INTO utxos(txid, vout, value, height, script, watch_only)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(txid, vout) DO UPDATE SET
                value=excluded.value, height=excluded.height,
                script=excluded.script, watch_only=excluded.watch_only",
            params![
                u.outpoint.txid.to_string(),
                u.outpoint.vout,
                u.value.to_sat() as i64,
                u.at_height,
                u.script_pubkey.as_bytes(),
                u.watch_only
            ],
        )?;
        Ok(())
    }

    fn put_stxo(tx: &Transaction<'_>, s: &Stxo) -> anyhow::Result<()> {
        let u = &s.utxo;
        tx.execute(
            "INSERT INTO stxos(txid, vout, value, height, script, watch_only,
                               spend_height, spend_txid)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(txid, vout) DO UPDATE SET
                value=excluded.value, height=excluded.height, script=excluded.script,
                watch_only=excluded.watch_only, spend_height=excluded.spend_height,
                spend_txid=excluded.spend_txid",
            params![
                u.outpoint.txid.to_string(),
                u.outpoint.vout,
                u.value.to_sat() as i64,
                u.at_height,
                u.script_pubkey.as_bytes(),
                u.watch_only,
                s.spend_height,
                s.spend_txid.to_string()
            ],
        )?;
        Ok(())
    }

    fn put_txn(tx: &Transaction<'_>, r: &TxnRecord) -> anyhow::Result<()> {
        tx.execute(
            "INSERT INTO txns(txid, tx, value, height, timestamp, watch_only)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(txid) DO UPDATE SET
                tx=excluded.tx, value=excluded.value, height=excluded.height,
                timestamp=excluded.timestamp, watch_only=excluded.watch_only",
            params![
                r.txid.to_string(),
                r.raw,
                r.value,
                r.height,
                r.timestamp as i64,
                r.watch_only
            ],
        )?;
        Ok(())
    }

    fn apply_op(tx: &Transaction<'_>, op: &LedgerOp) -> anyhow::Result<()> {
        match op {
            LedgerOp::PutUtxo(u) => Self::put_utxo(tx, u)?,
            LedgerOp::DeleteUtxo(op) => {
                tx.execute(
                    "DELETE FROM utxos WHERE txid = ?1 AND vout = ?2",
                    params![op.txid.to_string(), op.vout],
                )?;
            }
            LedgerOp::PutStxo(s) => Self::put_stxo(tx, s)?,
            LedgerOp::DeleteStxo(op) => {
                tx.execute(
                    "DELETE FROM stxos WHERE txid = ?1 AND vout = ?2",
                    params![op.txid.to_string(), op.vout],
                )?;
            }
            LedgerOp::PutTxn(r) => Self::put_txn(tx, r)?,
            LedgerOp::UpdateHeight {
                txid,
                height,
                timestamp,
            } => {
                tx.execute(
                    "UPDATE txns SET height = ?2, timestamp = ?3 WHERE txid = ?1",
                    params![txid.to_string(), height, *timestamp as i64],
                )?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn utxos(&self) -> anyhow::Result<Vec<Utxo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT txid, vout, value, height, script, watch_only FROM utxos
                 ORDER BY txid, vout",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(Self::utxo_from_row(row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn stxos(&self) -> anyhow::Result<Vec<Stxo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT txid, vout, value, height, script, watch_only, spend_height, spend_txid
                 FROM stxos ORDER BY txid, vout",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let spend_txid: String = row.get(7)?;
                out.push(Stxo {
                    utxo: Self::utxo_from_row(row)?,
                    spend_height: row.get(6)?,
                    spend_txid: Self::parse_txid(&spend_txid)?,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn txn(&self, txid: Txid) -> anyhow::Result<Option<TxnRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT txid, tx, value, height, timestamp, watch_only FROM txns WHERE txid = ?1",
            )?;
            let mut rows = stmt.query(params![txid.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(Some(Self::txn_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn txns(&self, include_watch_only: bool) -> anyhow::Result<Vec<TxnRecord>> {
        self.with_conn(move |conn| {
            let sql = if include_watch_only {
                "SELECT txid, tx, value, height, timestamp, watch_only FROM txns
                 ORDER BY timestamp, txid"
            } else {
                "SELECT txid, tx, value, height, timestamp, watch_only FROM txns
                 WHERE watch_only = 0 ORDER BY timestamp, txid"
            };
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(Self::txn_from_row(row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn watched_scripts(&self) -> anyhow::Result<Vec<ScriptBuf>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT script FROM watched_scripts ORDER BY script")?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let bytes: Vec<u8> = row.get(0)?;
                out.push(ScriptBuf::from_bytes(bytes));
            }
            Ok(out)
        })
        .await
    }

    async fn put_watched_scripts(&self, scripts: &[ScriptBuf]) -> anyhow::Result<()> {
        let scripts: Vec<Vec<u8>> = scripts.iter().map(|s| s.to_bytes()).collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for script in &scripts {
                tx.execute(
                    "INSERT OR IGNORE INTO watched_scripts(script) VALUES(?1)",
                    params![script],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn apply(&self, batch: LedgerBatch) -> anyhow::Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for op in batch.ops() {
                Self::apply_op(&tx, op).with_context(|| format!("apply {op:?}"))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
