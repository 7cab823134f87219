#![allow(dead_code)]
//! Shared collaborators and transaction builders for the integration tests.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{
    absolute, transaction, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, WPubkeyHash, Witness,
};
use electrum_ledger::matcher::derive_script;
use electrum_ledger::store::memory::MemorySnapshot;
use electrum_ledger::prelude::*;
use electrum_ledger::{AddressKind, FixedClock, LedgerBatch, Stxo, TxnRecord, Utxo};

pub const LOOKAHEAD: u32 = 3;
pub const NOW: u64 = 1_700_000_000;

/// ------- Key source with a lookahead window -------
pub struct TestKeys {
    used: Mutex<HashMap<KeyPurpose, HashSet<u32>>>,
    pub fail_mark: AtomicBool,
}

impl TestKeys {
    pub fn new() -> Self {
        Self {
            used: Mutex::new(HashMap::new()),
            fail_mark: AtomicBool::new(false),
        }
    }

    pub fn key(purpose: KeyPurpose, index: u32) -> WalletKey {
        let mut secret = [0u8; 32];
        secret[0] = match purpose {
            KeyPurpose::External => 1,
            KeyPurpose::Internal => 2,
        };
        secret[28..].copy_from_slice(&(index + 1).to_be_bytes());
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&secret).expect("valid secret");
        WalletKey {
            purpose,
            index,
            public_key: PublicKey::new(sk.public_key(&secp)),
        }
    }

    /// Legacy script for the key at `index` on the receive branch.
    pub fn script(index: u32) -> ScriptBuf {
        derive_script(&Self::key(KeyPurpose::External, index).public_key, AddressKind::Legacy)
            .expect("legacy script")
    }

    fn window(&self, purpose: KeyPurpose) -> u32 {
        let used = self.used.lock().unwrap();
        let next = used
            .get(&purpose)
            .and_then(|s| s.iter().max().copied())
            .map(|m| m + 1)
            .unwrap_or(0);
        next + LOOKAHEAD
    }

    fn all(&self) -> Vec<WalletKey> {
        let mut out = Vec::new();
        for purpose in [KeyPurpose::External, KeyPurpose::Internal] {
            for i in 0..self.window(purpose) {
                out.push(Self::key(purpose, i));
            }
        }
        out
    }

    pub fn is_used(&self, purpose: KeyPurpose, index: u32) -> bool {
        self.used
            .lock()
            .unwrap()
            .get(&purpose)
            .map(|s| s.contains(&index))
            .unwrap_or(false)
    }
}

#[async_trait]
impl KeySource for TestKeys {
    async fn owned_keys(&self) -> anyhow::Result<Vec<WalletKey>> {
        Ok(self.all())
    }

    async fn derive_next_unused(&self, purpose: KeyPurpose) -> anyhow::Result<WalletKey> {
        let mut i = 0;
        while self.is_used(purpose, i) {
            i += 1;
        }
        Ok(Self::key(purpose, i))
    }

    async fn mark_key_used(&self, script_address: &[u8]) -> anyhow::Result<()> {
        if self.fail_mark.load(Ordering::SeqCst) {
            anyhow::bail!("key database offline");
        }
        if let Some(k) = self.key_for_script(script_address).await? {
            self.used
                .lock()
                .unwrap()
                .entry(k.purpose)
                .or_default()
                .insert(k.index);
        }
        Ok(())
    }

    async fn key_for_script(&self, script_address: &[u8]) -> anyhow::Result<Option<WalletKey>> {
        Ok(self
            .all()
            .into_iter()
            .find(|k| k.public_key.pubkey_hash().as_byte_array().as_slice() == script_address))
    }
}

/// ------- Store wrapper that can be told to fail -------
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_apply: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads: AtomicBool::new(false),
            fail_apply: AtomicBool::new(false),
        }
    }

    fn check_reads(&self) -> anyhow::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("disk unplugged");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn utxos(&self) -> anyhow::Result<Vec<Utxo>> {
        self.check_reads()?;
        self.inner.utxos().await
    }
    async fn stxos(&self) -> anyhow::Result<Vec<Stxo>> {
        self.check_reads()?;
        self.inner.stxos().await
    }
    async fn txn(&self, txid: Txid) -> anyhow::Result<Option<TxnRecord>> {
        self.check_reads()?;
        self.inner.txn(txid).await
    }
    async fn txns(&self, include_watch_only: bool) -> anyhow::Result<Vec<TxnRecord>> {
        self.check_reads()?;
        self.inner.txns(include_watch_only).await
    }
    async fn watched_scripts(&self) -> anyhow::Result<Vec<ScriptBuf>> {
        self.check_reads()?;
        self.inner.watched_scripts().await
    }
    async fn put_watched_scripts(&self, scripts: &[ScriptBuf]) -> anyhow::Result<()> {
        self.inner.put_watched_scripts(scripts).await
    }
    async fn apply(&self, batch: LedgerBatch) -> anyhow::Result<()> {
        if self.fail_apply.load(Ordering::SeqCst) {
            anyhow::bail!("write failed");
        }
        self.inner.apply(batch).await
    }
}

pub type TestWallet<S = Arc<MemoryStore>> = ElectrumWallet<S, Arc<TestKeys>, Arc<FixedClock>>;

pub struct Harness<S = Arc<MemoryStore>> {
    pub wallet: TestWallet<S>,
    pub store: S,
    pub keys: Arc<TestKeys>,
    pub clock: Arc<FixedClock>,
}

pub async fn harness() -> Harness {
    harness_with(Arc::new(MemoryStore::new())).await
}

pub async fn harness_with<S>(store: S) -> Harness<S>
where
    S: Store + Clone + 'static,
{
    harness_with_config(store, LedgerConfig::new(Network::Regtest)).await
}

pub async fn harness_with_config<S>(store: S, config: LedgerConfig) -> Harness<S>
where
    S: Store + Clone + 'static,
{
    let keys = Arc::new(TestKeys::new());
    let clock = Arc::new(FixedClock::new(NOW));
    let wallet = ElectrumWallet::new(store.clone(), keys.clone(), config)
        .await
        .expect("open wallet")
        .with_clock(clock.clone());
    Harness {
        wallet,
        store,
        keys,
        clock,
    }
}

/// ------- Transaction builders -------
pub fn external_script(n: u8) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([n; 20]))
}

/// An outpoint owned by someone else.
pub fn foreign_outpoint(n: u8) -> OutPoint {
    OutPoint::new(Txid::from_byte_array([n; 32]), 0)
}

pub fn build_tx(inputs: &[OutPoint], outputs: &[(ScriptBuf, u64)]) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: inputs
            .iter()
            .map(|op| TxIn {
                previous_output: *op,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|(script, sat)| TxOut {
                value: Amount::from_sat(*sat),
                script_pubkey: script.clone(),
            })
            .collect(),
    }
}

pub fn out(tx: &Transaction, vout: u32) -> OutPoint {
    OutPoint::new(tx.compute_txid(), vout)
}

/// ------- Ledger assertions -------
pub fn assert_conserved(snap: &MemorySnapshot) {
    let unspent: HashSet<OutPoint> = snap.utxos.iter().map(|u| u.outpoint).collect();
    for s in &snap.stxos {
        assert!(
            !unspent.contains(&s.utxo.outpoint),
            "{} is both spent and unspent",
            s.utxo.outpoint
        );
    }
}

pub fn height_of(snap: &MemorySnapshot, txid: Txid) -> Option<i64> {
    snap.txns.iter().find(|r| r.txid == txid).map(|r| r.height)
}

/// ------- Listener that records events -------
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<TransactionCallback>>,
}

#[async_trait]
impl TransactionListener for Recorder {
    async fn on_transaction(&self, event: &TransactionCallback) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl Recorder {
    pub fn taken(&self) -> Vec<TransactionCallback> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}
