mod common;

use common::*;
use electrum_ledger::config::DEFAULT_UNCONFIRMED_EXPIRY_SECS;
use electrum_ledger::prelude::*;
use electrum_ledger::projector::classify;

const EXPIRY: u64 = DEFAULT_UNCONFIRMED_EXPIRY_SECS;

#[test]
fn confirmation_depth_boundaries() {
    assert_eq!(classify(100, NOW, 105, NOW, EXPIRY), (TxnStatus::Confirmed, 6));
    assert_eq!(classify(101, NOW, 105, NOW, EXPIRY), (TxnStatus::Pending, 5));
    assert_eq!(classify(105, NOW, 105, NOW, EXPIRY), (TxnStatus::Pending, 1));
}

#[test]
fn unconfirmed_expiry_boundaries() {
    assert_eq!(classify(0, NOW, 105, NOW + EXPIRY, EXPIRY), (TxnStatus::Unconfirmed, 0));
    assert_eq!(classify(0, NOW, 105, NOW + EXPIRY + 1, EXPIRY), (TxnStatus::Dead, 0));
    // a timestamp ahead of the local clock is not an expiry
    assert_eq!(classify(0, NOW + 60, 105, NOW, EXPIRY), (TxnStatus::Unconfirmed, 0));
}

#[test]
fn dead_and_future_heights() {
    assert_eq!(classify(-1, NOW, 105, NOW, EXPIRY), (TxnStatus::Dead, 0));
    assert_eq!(classify(108, NOW, 105, NOW, EXPIRY), (TxnStatus::Dead, 0));
    // one block above the tip counts as not yet confirmed
    assert_eq!(classify(106, NOW, 105, NOW, EXPIRY), (TxnStatus::Unconfirmed, 0));
}

#[tokio::test]
async fn wallet_reports_status_against_the_chain_tip() -> anyhow::Result<()> {
    let h = harness().await;
    let fund = build_tx(&[foreign_outpoint(1)], &[(TestKeys::script(0), 5_000)]);
    h.wallet.ingest(&fund, 100, NOW).await?;

    h.wallet.set_chain_tip(104);
    let txs = h.wallet.transactions().await?;
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TxnStatus::Pending);
    assert_eq!(txs[0].confirmations, 5);

    h.wallet.set_chain_tip(105);
    let txs = h.wallet.transactions().await?;
    assert_eq!(txs[0].status, TxnStatus::Confirmed);
    assert_eq!(h.wallet.get_confirmations(fund.compute_txid()).await?, (6, 100));
    Ok(())
}

#[tokio::test]
async fn stale_mempool_transaction_is_reported_dead() -> anyhow::Result<()> {
    let h = harness().await;
    h.wallet.set_chain_tip(200);
    let fund = build_tx(&[foreign_outpoint(2)], &[(TestKeys::script(0), 5_000)]);
    h.wallet.ingest(&fund, 0, NOW).await?;

    let detail = h.wallet.get_transaction(fund.compute_txid()).await?;
    assert_eq!(detail.txn.status, TxnStatus::Unconfirmed);
    assert_eq!(h.wallet.get_confirmations(fund.compute_txid()).await?, (0, 0));

    h.clock.advance(EXPIRY + 1);
    let detail = h.wallet.get_transaction(fund.compute_txid()).await?;
    assert_eq!(detail.txn.status, TxnStatus::Dead);
    // status is derived on read; the stored height is untouched
    assert_eq!(detail.txn.record.height, 0);
    Ok(())
}

#[tokio::test]
async fn missing_transactions_are_reported() -> anyhow::Result<()> {
    let h = harness().await;
    let unknown = build_tx(&[foreign_outpoint(3)], &[(external_script(1), 1)]).compute_txid();
    assert!(matches!(
        h.wallet.get_transaction(unknown).await,
        Err(LedgerError::TransactionNotFound(t)) if t == unknown
    ));
    assert!(matches!(
        h.wallet.get_confirmations(unknown).await,
        Err(LedgerError::TransactionNotFound(_))
    ));
    Ok(())
}
