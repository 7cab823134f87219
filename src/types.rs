//! Ledger records and the events derived from them.
use bitcoin::{consensus, Address, Amount, OutPoint, ScriptBuf, Transaction, Txid};

use crate::error::{LedgerError, Result};

/// Height stored for transactions whose effects were invalidated.
pub const DEAD_HEIGHT: i64 = -1;

/// An output owned or watched by the wallet that has not been spent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// Where the output lives.
    pub outpoint: OutPoint,
    /// Locking script of the output.
    pub script_pubkey: ScriptBuf,
    /// Output value.
    pub value: Amount,
    /// Height of the creating transaction, `0` while unconfirmed.
    pub at_height: i64,
    /// Tracked through a watched script rather than an owned key.
    pub watch_only: bool,
}

/// A wallet output consumed by a later transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stxo {
    /// The coin as it was before being spent.
    pub utxo: Utxo,
    /// Height of the spending transaction, `0` while unconfirmed.
    pub spend_height: i64,
    /// The spending transaction.
    pub spend_txid: Txid,
}

/// A stored wallet-relevant transaction.
///
/// `height > 0` is confirmed at that block, `0` is unconfirmed and
/// [`DEAD_HEIGHT`] marks an invalidated transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxnRecord {
    /// Transaction id.
    pub txid: Txid,
    /// Consensus serialization of the full transaction, witness included.
    pub raw: Vec<u8>,
    /// Net effect on the spendable balance in satoshis, fixed at first sighting.
    pub value: i64,
    /// See the type docs.
    pub height: i64,
    /// Unix seconds the transaction was first seen or last re-dated.
    pub timestamp: u64,
    /// Relevant only through watched scripts.
    pub watch_only: bool,
}

impl TxnRecord {
    /// Decode the stored bytes back into a transaction.
    pub fn transaction(&self) -> Result<Transaction> {
        consensus::encode::deserialize(&self.raw)
            .map_err(|e| LedgerError::MalformedTransaction(format!("stored {}: {e}", self.txid)))
    }

    /// True once the record has been invalidated.
    pub fn is_dead(&self) -> bool {
        self.height < 0
    }
}

/// Derived state of a transaction for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxnStatus {
    /// Seen in the mempool recently.
    Unconfirmed,
    /// Between one and five confirmations.
    Pending,
    /// Six or more confirmations.
    Confirmed,
    /// Invalidated by a conflict, a reorg, or mempool expiry.
    Dead,
}

/// A stored transaction together with its derived status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletTxn {
    /// The stored record.
    pub record: TxnRecord,
    /// Derived from height, tip and age.
    pub status: TxnStatus,
    /// Zero unless `Pending` or `Confirmed`.
    pub confirmations: i64,
}

/// A wallet transaction with its outputs decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionDetail {
    /// Record and status.
    pub txn: WalletTxn,
    /// Every output of the transaction.
    pub outputs: Vec<TransactionOutput>,
}

/// One output described in a [`TransactionCallback`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionOutput {
    /// `None` when the script has no address form.
    pub address: Option<Address>,
    /// Output value.
    pub value: Amount,
    /// Output index.
    pub index: u32,
}

/// One wallet coin consumed by the transaction in a [`TransactionCallback`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionInput {
    /// The coin that was spent.
    pub outpoint: OutPoint,
    /// Address of the spent coin's script, if it has one.
    pub linked_address: Option<Address>,
    /// Value of the spent coin.
    pub value: Amount,
}

/// Event emitted to listeners when a transaction becomes relevant or confirms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionCallback {
    /// Transaction id.
    pub txid: Txid,
    /// Height reported with the transaction.
    pub height: i64,
    /// Net spendable value, as stored at first sighting.
    pub value: i64,
    /// Timestamp reported with the transaction.
    pub block_time: u64,
    /// A watched script was involved.
    pub watch_only: bool,
    /// Wallet coins consumed.
    pub inputs: Vec<TransactionInput>,
    /// All outputs of the transaction.
    pub outputs: Vec<TransactionOutput>,
}

/// Spendable balance split by confirmation state. Watch-only coins are excluded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balance {
    /// Confirmed, or built only on confirmed wallet coins.
    pub confirmed: Amount,
    /// Everything else.
    pub unconfirmed: Amount,
}
