//! Error kinds surfaced by the ledger.
use bitcoin::Txid;
use thiserror::Error;

/// Failures the ledger reports to its caller.
///
/// Double spends and chain reorganizations are not errors; they are resolved
/// inside ingestion by the first-seen and height-wins policies.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The transaction failed the structural sanity check or could not be decoded.
    /// Nothing was persisted.
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    /// A read or write against the ledger store failed. Ingestion aborts before
    /// any mutation is applied, so the call is safe to retry.
    #[error("ledger store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),

    /// An output script could not be mapped to an address or key hash.
    #[error("unknown script: {0}")]
    UnknownScript(String),

    /// The key derivation collaborator failed.
    #[error("key derivation failed")]
    KeyDerivationFailure(#[source] anyhow::Error),

    /// No stored record for the requested transaction.
    #[error("transaction {0} not found")]
    TransactionNotFound(Txid),
}

/// Convenience alias used throughout the ledger.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
