//! Key derivation collaborator: the wallet's HD key tree seen from the ledger.
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::PublicKey;

/// Branch of the key tree a key belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    /// Receive addresses handed out to payers.
    External,
    /// Change addresses.
    Internal,
}

/// A key the wallet can spend with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletKey {
    /// Branch of the key tree.
    pub purpose: KeyPurpose,
    /// Child index on that branch.
    pub index: u32,
    /// Public half, used to derive output scripts.
    pub public_key: PublicKey,
}

/// Source of owned keys. Implementations keep their own lookahead window;
/// the ledger only lists keys and reports which ones received funds.
///
/// `script_address` is the hash committed to by an output script
/// (pubkey hash, script hash or witness program).
#[async_trait]
pub trait KeySource: Send + Sync {
    /// All keys currently derived, used or not.
    async fn owned_keys(&self) -> anyhow::Result<Vec<WalletKey>>;

    /// The first key on `purpose` that has not received funds yet.
    async fn derive_next_unused(&self, purpose: KeyPurpose) -> anyhow::Result<WalletKey>;

    /// Record that the key behind `script_address` received funds.
    async fn mark_key_used(&self, script_address: &[u8]) -> anyhow::Result<()>;

    /// Look up the key behind `script_address`.
    async fn key_for_script(&self, script_address: &[u8]) -> anyhow::Result<Option<WalletKey>>;
}

#[async_trait]
impl<K: KeySource + ?Sized> KeySource for Arc<K> {
    async fn owned_keys(&self) -> anyhow::Result<Vec<WalletKey>> {
        (**self).owned_keys().await
    }

    async fn derive_next_unused(&self, purpose: KeyPurpose) -> anyhow::Result<WalletKey> {
        (**self).derive_next_unused(purpose).await
    }

    async fn mark_key_used(&self, script_address: &[u8]) -> anyhow::Result<()> {
        (**self).mark_key_used(script_address).await
    }

    async fn key_for_script(&self, script_address: &[u8]) -> anyhow::Result<Option<WalletKey>> {
        (**self).key_for_script(script_address).await
    }
}
