//! Structural checks applied before a transaction touches the ledger.
use std::collections::HashSet;

use bitcoin::{Amount, Transaction};

use crate::error::{LedgerError, Result};

fn malformed(reason: impl Into<String>) -> LedgerError {
    LedgerError::MalformedTransaction(reason.into())
}

/// Reject transactions no node would relay. Context-free: no UTXO lookups.
pub fn check_transaction_sanity(tx: &Transaction, max_size: usize) -> Result<()> {
    if tx.input.is_empty() {
        return Err(malformed("transaction has no inputs"));
    }
    if tx.output.is_empty() {
        return Err(malformed("transaction has no outputs"));
    }

    let size = tx.base_size();
    if size > max_size {
        return Err(malformed(format!(
            "serialized transaction is too big: {size} bytes, max {max_size}"
        )));
    }

    let mut total = Amount::ZERO;
    for (vout, out) in tx.output.iter().enumerate() {
        if out.value > Amount::MAX_MONEY {
            return Err(malformed(format!("output {vout} value {} exceeds max money", out.value)));
        }
        total = total
            .checked_add(out.value)
            .filter(|t| *t <= Amount::MAX_MONEY)
            .ok_or_else(|| malformed("total output value exceeds max money"))?;
    }

    let mut seen = HashSet::with_capacity(tx.input.len());
    for input in &tx.input {
        if !seen.insert(input.previous_output) {
            return Err(malformed(format!(
                "transaction contains duplicate input {}",
                input.previous_output
            )));
        }
    }

    if tx.is_coinbase() {
        let len = tx.input[0].script_sig.len();
        if !(2..=100).contains(&len) {
            return Err(malformed(format!("coinbase script length {len} out of range")));
        }
    } else if tx.input.iter().any(|i| i.previous_output.is_null()) {
        return Err(malformed("transaction input refers to previous output that is null"));
    }

    Ok(())
}
