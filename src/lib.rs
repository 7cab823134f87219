#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! electrum-ledger: the transaction ledger of a non-SPV Bitcoin wallet.
//!
//! The wallet learns about its funds from an untrusted ElectrumX-style server.
//! The server may report transactions out of order, report double spends, or
//! retract confirmed spends in a reorg. This crate keeps the wallet's coin
//! sets consistent anyway.
//!
//! ## What you implement
//! - [`KeySource`]: list owned keys, hand out unused ones, record usage.
//! - [`Store`]: or use [`MemoryStore`] / [`SqliteStore`].
//! - [`TransactionListener`]: optional, receive wallet-relevant events.
//!
//! ## What the ledger does
//! - Sanity-checks and de-duplicates reported transactions.
//! - Keeps the first-seen unconfirmed spend of an outpoint; a confirmed
//!   conflicting spend wins and everything built on the loser is marked dead.
//! - Moves coins between the unspent and spent sets in one atomic batch.
//! - Derives balances and per-transaction status on demand.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use electrum_ledger::prelude::*;
//!
//! async fn run(keys: impl KeySource, raw_hex: &str) -> anyhow::Result<()> {
//!     let wallet = ElectrumWallet::new(MemoryStore::new(), keys, LedgerConfig::default()).await?;
//!     wallet.set_chain_tip(800_000);
//!     wallet.ingest_hex(raw_hex, 799_990, 1_700_000_000).await?;
//!     let balance = wallet.balance().await?;
//!     println!("confirmed {} unconfirmed {}", balance.confirmed, balance.unconfirmed);
//!     Ok(())
//! }
//! ```
/// Ingestion engine: dedup, double-spend policy, coin matching, commit, notify.
pub mod engine;

/// Error kinds reported by the ledger.
pub mod error;

/// Listener traits for wallet-relevant transaction events.
pub mod hooks;

/// Key derivation collaborator interface.
pub mod keys;

/// Output-script derivation and matching.
pub mod matcher;

/// Balance and confirmation status.
pub mod projector;

/// Structural transaction checks.
pub mod sanity;

/// Ledger settings.
pub mod config;

/// Time source.
pub mod clock;

/// Ledger records and events.
pub mod types;

/// Wallet facade.
pub mod wallet;

// Internal helpers:
mod resolver;
mod view;

/// Persistence layer (traits and in-memory / SQLite implementations).
pub mod store;

// Public re-exports
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AddressKind, LedgerConfig};
pub use engine::{LedgerSnapshot, TxStore};
pub use error::LedgerError;
pub use hooks::TransactionListener;
pub use keys::{KeyPurpose, KeySource, WalletKey};
pub use store::{LedgerBatch, LedgerOp, MemoryStore, Store};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
pub use types::{
    Balance, Stxo, TransactionCallback, TransactionDetail, TransactionInput, TransactionOutput,
    TxnRecord, TxnStatus, Utxo, WalletTxn, DEAD_HEIGHT,
};
pub use wallet::ElectrumWallet;

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::{
        Balance, ElectrumWallet, KeyPurpose, KeySource, LedgerConfig, LedgerError, MemoryStore,
        Store, TransactionCallback, TransactionListener, TxnStatus, WalletKey,
    };
    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
}
