//! Wallet facade: the entry points a coin client uses to drive and read the ledger.
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bitcoin::{Address, Amount, Network, Script, ScriptBuf, Transaction, Txid};
use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    config::LedgerConfig,
    engine::TxStore,
    error::{LedgerError, Result},
    hooks::TransactionListener,
    keys::{KeyPurpose, KeySource},
    matcher::{derive_script, script_address, script_to_address},
    projector,
    store::Store,
    types::{Balance, Stxo, TransactionDetail, TransactionOutput, Utxo, WalletTxn},
};

/// A non-SPV wallet over an untrusted indexing server.
///
/// `S` = ledger store, `K` = key derivation source, `C` = wall clock.
pub struct ElectrumWallet<S, K, C = SystemClock> {
    txstore: TxStore<S, K>,
    clock: C,
    tip: AtomicI64,
}

impl<S, K> ElectrumWallet<S, K, SystemClock>
where
    S: Store,
    K: KeySource,
{
    /// Open the wallet over `store` and `keys`.
    pub async fn new(store: S, keys: K, config: LedgerConfig) -> Result<Self> {
        Ok(Self {
            txstore: TxStore::new(store, keys, config).await?,
            clock: SystemClock,
            tip: AtomicI64::new(0),
        })
    }
}

impl<S, K, C> ElectrumWallet<S, K, C>
where
    S: Store,
    K: KeySource,
    C: Clock,
{
    /// Use `clock` for expiry of unconfirmed transactions.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ElectrumWallet<S, K, C2> {
        ElectrumWallet {
            txstore: self.txstore,
            clock,
            tip: self.tip,
        }
    }

    /// The ledger engine behind the facade.
    pub fn txstore(&self) -> &TxStore<S, K> {
        &self.txstore
    }

    /// Settings in effect.
    pub fn config(&self) -> &LedgerConfig {
        self.txstore.config()
    }

    /// Chain the wallet is configured for.
    pub fn network(&self) -> Network {
        self.config().network
    }

    /// `"btc"` on mainnet, `"tbtc"` on every test network.
    pub fn currency_code(&self) -> &'static str {
        match self.network() {
            Network::Bitcoin => "btc",
            _ => "tbtc",
        }
    }

    /// Record the best height announced by the server.
    pub fn set_chain_tip(&self, height: i64) {
        self.tip.store(height, Ordering::SeqCst);
    }

    /// Best height last announced by the server.
    pub fn chain_tip(&self) -> i64 {
        self.tip.load(Ordering::SeqCst)
    }

    // --- ingestion ---

    /// See [`TxStore::ingest`].
    pub async fn ingest(&self, tx: &Transaction, height: i64, timestamp: u64) -> Result<u32> {
        self.txstore.ingest(tx, height, timestamp).await
    }

    /// Ingest consensus-encoded transaction bytes.
    pub async fn ingest_raw(&self, raw: &[u8], height: i64, timestamp: u64) -> Result<u32> {
        self.txstore.ingest_raw(raw, height, timestamp).await
    }

    /// Ingest a hex-encoded transaction, as returned by `blockchain.transaction.get`.
    pub async fn ingest_hex(&self, raw_hex: &str, height: i64, timestamp: u64) -> Result<u32> {
        let raw = hex::decode(raw_hex.trim())
            .map_err(|e| LedgerError::MalformedTransaction(format!("hex: {e}")))?;
        self.ingest_raw(&raw, height, timestamp).await
    }

    /// Register a listener for wallet-relevant transactions.
    pub async fn add_transaction_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.txstore.add_listener(listener).await;
    }

    // --- balance and history ---

    /// Spendable balance split into confirmed and unconfirmed.
    pub async fn balance(&self) -> Result<Balance> {
        let snap = self.txstore.snapshot().await?;
        Ok(projector::balance(&snap.utxos, &snap.stxos))
    }

    /// Unspent outputs, watch-only included.
    pub async fn list_unspent(&self) -> Result<Vec<Utxo>> {
        Ok(self.txstore.snapshot().await?.utxos)
    }

    /// Spent outputs.
    pub async fn list_spent(&self) -> Result<Vec<Stxo>> {
        Ok(self.txstore.snapshot().await?.stxos)
    }

    /// Spendable-wallet transactions with derived status. Watch-only records are omitted.
    pub async fn transactions(&self) -> Result<Vec<WalletTxn>> {
        let tip = self.chain_tip();
        let now = self.clock.now();
        let expiry = self.config().unconfirmed_expiry_secs;
        let records = self.txstore.records(false).await?;
        Ok(records
            .into_iter()
            .map(|r| projector::describe(r, tip, now, expiry))
            .collect())
    }

    /// True if a record exists for `txid`.
    pub async fn has_transaction(&self, txid: Txid) -> Result<bool> {
        Ok(self.txstore.record(txid).await?.is_some())
    }

    /// Stored transaction with status and decoded outputs.
    pub async fn get_transaction(&self, txid: Txid) -> Result<TransactionDetail> {
        let record = self
            .txstore
            .record(txid)
            .await?
            .ok_or(LedgerError::TransactionNotFound(txid))?;
        let tx = record.transaction()?;
        let network = self.network();
        let outputs = tx
            .output
            .iter()
            .enumerate()
            .map(|(i, out)| TransactionOutput {
                address: script_to_address(&out.script_pubkey, network),
                value: out.value,
                index: i as u32,
            })
            .collect();
        let txn = projector::describe(
            record,
            self.chain_tip(),
            self.clock.now(),
            self.config().unconfirmed_expiry_secs,
        );
        Ok(TransactionDetail { txn, outputs })
    }

    /// `(confirmations, height)` of a stored transaction; `(0, 0)` while unconfirmed.
    pub async fn get_confirmations(&self, txid: Txid) -> Result<(i64, i64)> {
        let record = self
            .txstore
            .record(txid)
            .await?
            .ok_or(LedgerError::TransactionNotFound(txid))?;
        if record.height == 0 {
            return Ok((0, 0));
        }
        Ok((self.chain_tip() - record.height + 1, record.height))
    }

    // --- watched scripts ---

    /// Monitor `script` without owning its key.
    pub async fn add_watched_script(&self, script: ScriptBuf) -> Result<()> {
        self.txstore
            .store()
            .put_watched_script(script)
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        self.txstore.refresh_scripts().await?;
        Ok(())
    }

    /// Monitor the scripts of several addresses.
    pub async fn add_watched_addresses(&self, addrs: &[Address]) -> Result<()> {
        let scripts: Vec<ScriptBuf> = addrs.iter().map(|a| a.script_pubkey()).collect();
        self.txstore
            .store()
            .put_watched_scripts(&scripts)
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        self.txstore.refresh_scripts().await?;
        Ok(())
    }

    // --- addresses ---

    fn key_address(&self, key: &bitcoin::PublicKey) -> Result<Address> {
        let script = derive_script(key, self.config().address_kind)?;
        script_to_address(&script, self.network())
            .ok_or_else(|| LedgerError::UnknownScript(hex::encode(script.as_bytes())))
    }

    /// First unused address on `purpose`.
    pub async fn current_address(&self, purpose: KeyPurpose) -> Result<Address> {
        let key = self
            .txstore
            .keys()
            .derive_next_unused(purpose)
            .await
            .map_err(LedgerError::KeyDerivationFailure)?;
        self.key_address(&key.public_key)
    }

    /// Hand out a fresh address: it is marked used so the next call moves on,
    /// and the match set is re-derived to cover the extended lookahead.
    pub async fn new_address(&self, purpose: KeyPurpose) -> Result<Address> {
        let keys = self.txstore.keys();
        let key = keys
            .derive_next_unused(purpose)
            .await
            .map_err(LedgerError::KeyDerivationFailure)?;
        let addr = self.key_address(&key.public_key)?;
        let hash = script_address(&addr.script_pubkey())?;
        keys.mark_key_used(&hash)
            .await
            .map_err(LedgerError::KeyDerivationFailure)?;
        self.txstore.refresh_scripts().await?;
        debug!(%addr, ?purpose, index = key.index, "new address");
        Ok(addr)
    }

    /// Addresses of every derived key. Keys without an address form are skipped.
    pub async fn list_addresses(&self) -> Result<Vec<Address>> {
        let keys = self
            .txstore
            .keys()
            .owned_keys()
            .await
            .map_err(LedgerError::KeyDerivationFailure)?;
        Ok(keys
            .iter()
            .filter_map(|k| self.key_address(&k.public_key).ok())
            .collect())
    }

    /// True if the wallet holds the key behind `addr`.
    pub async fn has_key(&self, addr: &Address) -> Result<bool> {
        let hash = match script_address(&addr.script_pubkey()) {
            Ok(hash) => hash,
            Err(_) => return Ok(false),
        };
        let key = self
            .txstore
            .keys()
            .key_for_script(&hash)
            .await
            .map_err(LedgerError::KeyDerivationFailure)?;
        Ok(key.is_some())
    }

    /// Address form of `script` on this wallet's network.
    pub fn script_to_address(&self, script: &Script) -> Result<Address> {
        script_to_address(script, self.network())
            .ok_or_else(|| LedgerError::UnknownScript(hex::encode(script.as_bytes())))
    }

    /// Output script paying `addr`.
    pub fn address_to_script(&self, addr: &Address) -> ScriptBuf {
        addr.script_pubkey()
    }

    /// True for amounts below the configured dust limit.
    pub fn is_dust(&self, amount: Amount) -> bool {
        amount.to_sat() < self.config().dust_limit_sat
    }
}
