//! Output-script matching against owned keys and watched scripts.
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use bitcoin::{Address, Network, PublicKey, Script, ScriptBuf};
use tracing::{debug, warn};

use crate::{
    config::AddressKind,
    error::{LedgerError, Result},
    keys::{KeySource, WalletKey},
    store::Store,
};

/// Scripts an incoming output is tested against.
#[derive(Clone, Debug, Default)]
pub struct ScriptSet {
    owned: HashSet<ScriptBuf>,
    watched: HashSet<ScriptBuf>,
}

impl ScriptSet {
    /// Build from owned and watched scripts.
    pub fn new<O, W>(owned: O, watched: W) -> Self
    where
        O: IntoIterator<Item = ScriptBuf>,
        W: IntoIterator<Item = ScriptBuf>,
    {
        Self {
            owned: owned.into_iter().collect(),
            watched: watched.into_iter().collect(),
        }
    }

    /// Script pays one of our keys.
    pub fn is_owned(&self, script: &ScriptBuf) -> bool {
        self.owned.contains(script)
    }

    /// Script is observed without a key.
    pub fn is_watched(&self, script: &ScriptBuf) -> bool {
        self.watched.contains(script)
    }

    /// Number of owned scripts.
    pub fn owned_len(&self) -> usize {
        self.owned.len()
    }

    /// Number of watched scripts.
    pub fn watched_len(&self) -> usize {
        self.watched.len()
    }
}

/// Output script paying `key` under `kind`.
pub fn derive_script(key: &PublicKey, kind: AddressKind) -> Result<ScriptBuf> {
    match kind {
        AddressKind::Legacy => Ok(ScriptBuf::new_p2pkh(&key.pubkey_hash())),
        AddressKind::SegwitV0 => key
            .wpubkey_hash()
            .map(|wpkh| ScriptBuf::new_p2wpkh(&wpkh))
            .map_err(|e| LedgerError::UnknownScript(format!("p2wpkh for {key}: {e}"))),
    }
}

/// The hash an output script commits to, used to find the key behind it.
pub fn script_address(script: &Script) -> Result<Vec<u8>> {
    let bytes = script.as_bytes();
    let hash = if script.is_p2pkh() {
        &bytes[3..23]
    } else if script.is_p2wpkh() || script.is_p2sh() {
        &bytes[2..22]
    } else if script.is_p2wsh() || script.is_p2tr() {
        &bytes[2..34]
    } else {
        return Err(LedgerError::UnknownScript(hex::encode(bytes)));
    };
    Ok(hash.to_vec())
}

/// Address form of `script`, or `None` for exotic scripts.
pub fn script_to_address(script: &Script, network: Network) -> Option<Address> {
    Address::from_script(script, network).ok()
}

/// Owned scripts for `keys`; keys that cannot be expressed under `kind` are skipped.
pub fn owned_scripts(keys: &[WalletKey], kind: AddressKind) -> Vec<ScriptBuf> {
    keys.iter()
        .filter_map(|k| match derive_script(&k.public_key, kind) {
            Ok(script) => Some(script),
            Err(e) => {
                warn!(purpose = ?k.purpose, index = k.index, error = %e, "skipping key");
                None
            }
        })
        .collect()
}

/// Holds the current [`ScriptSet`] behind a short-lived lock.
pub(crate) struct ScriptMatcher {
    kind: AddressKind,
    current: RwLock<Arc<ScriptSet>>,
}

impl ScriptMatcher {
    pub(crate) fn new(kind: AddressKind) -> Self {
        Self {
            kind,
            current: RwLock::new(Arc::new(ScriptSet::default())),
        }
    }

    /// The set in effect right now.
    pub(crate) fn snapshot(&self) -> Arc<ScriptSet> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-derive from the key source and the stored watched scripts.
    pub(crate) async fn refresh<S, K>(&self, keys: &K, store: &S) -> Result<Arc<ScriptSet>>
    where
        S: Store + ?Sized,
        K: KeySource + ?Sized,
    {
        let owned = keys
            .owned_keys()
            .await
            .map_err(LedgerError::KeyDerivationFailure)?;
        let watched = store
            .watched_scripts()
            .await
            .map_err(LedgerError::StoreUnavailable)?;

        let set = Arc::new(ScriptSet::new(owned_scripts(&owned, self.kind), watched));
        debug!(
            owned = set.owned_len(),
            watched = set.watched_len(),
            "match set refreshed"
        );
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = set.clone();
        Ok(set)
    }
}
