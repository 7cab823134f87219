//! Construction-time configuration for the ledger and wallet facade.
use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// Largest serialized (non-witness) transaction accepted by the sanity check.
pub const DEFAULT_MAX_TX_SIZE: usize = 1_000_000;

/// Unconfirmed transactions older than this are treated as dropped by the server.
pub const DEFAULT_UNCONFIRMED_EXPIRY_SECS: u64 = 6 * 60 * 60;

/// Outputs below this many satoshis are considered dust.
pub const DEFAULT_DUST_LIMIT_SAT: u64 = 1_000;

/// Output script template used for the wallet's own keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    /// Pay-to-pubkey-hash.
    #[default]
    Legacy,
    /// Pay-to-witness-pubkey-hash. Uncompressed keys cannot be expressed and are skipped.
    SegwitV0,
}

/// Ledger settings. Every field has a default, so a partial config file works.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Chain the wallet lives on; selects address encoding and currency code.
    pub network: Network,
    /// Script template for owned keys.
    pub address_kind: AddressKind,
    /// Maximum base size, in bytes, of an ingested transaction.
    pub max_tx_size: usize,
    /// Age after which an unconfirmed transaction is reported dead.
    pub unconfirmed_expiry_secs: u64,
    /// Dust threshold in satoshis.
    pub dust_limit_sat: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            address_kind: AddressKind::Legacy,
            max_tx_size: DEFAULT_MAX_TX_SIZE,
            unconfirmed_expiry_secs: DEFAULT_UNCONFIRMED_EXPIRY_SECS,
            dust_limit_sat: DEFAULT_DUST_LIMIT_SAT,
        }
    }
}

impl LedgerConfig {
    /// Default settings for `network`.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Use `kind` when deriving scripts for owned keys.
    pub fn with_address_kind(mut self, kind: AddressKind) -> Self {
        self.address_kind = kind;
        self
    }

    /// Override the sanity-check size limit.
    pub fn with_max_tx_size(mut self, bytes: usize) -> Self {
        self.max_tx_size = bytes;
        self
    }

    /// Override how long an unconfirmed transaction stays alive.
    pub fn with_unconfirmed_expiry(mut self, secs: u64) -> Self {
        self.unconfirmed_expiry_secs = secs;
        self
    }

    /// Override the dust threshold.
    pub fn with_dust_limit(mut self, sat: u64) -> Self {
        self.dust_limit_sat = sat;
        self
    }
}
