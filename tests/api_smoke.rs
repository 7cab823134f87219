mod common;

use std::sync::Arc;

use bitcoin::{Address, Amount, Network};
use common::*;
use electrum_ledger::prelude::*;
use electrum_ledger::AddressKind;

#[test]
fn partial_config_fills_in_defaults() -> anyhow::Result<()> {
    let config: LedgerConfig =
        serde_json::from_str(r#"{ "network": "testnet", "address_kind": "segwit_v0" }"#)?;
    assert_eq!(config.network, Network::Testnet);
    assert_eq!(config.address_kind, AddressKind::SegwitV0);
    assert_eq!(config.max_tx_size, LedgerConfig::default().max_tx_size);
    assert_eq!(config.unconfirmed_expiry_secs, 6 * 60 * 60);
    assert_eq!(config.dust_limit_sat, 1_000);
    Ok(())
}

#[tokio::test]
async fn address_book() -> anyhow::Result<()> {
    let h = harness().await;
    assert_eq!(h.wallet.currency_code(), "tbtc");
    assert_eq!(h.wallet.list_addresses().await?.len(), 2 * LOOKAHEAD as usize);

    let current = h.wallet.current_address(KeyPurpose::External).await?;
    assert_eq!(current, h.wallet.current_address(KeyPurpose::External).await?);
    assert!(h.wallet.has_key(&current).await?);

    let first = h.wallet.new_address(KeyPurpose::External).await?;
    assert_eq!(first, current);
    let second = h.wallet.new_address(KeyPurpose::External).await?;
    assert_ne!(first, second);
    assert!(h.keys.is_used(KeyPurpose::External, 0));
    assert!(h.keys.is_used(KeyPurpose::External, 1));

    let script = h.wallet.address_to_script(&second);
    assert_eq!(script, TestKeys::script(1));
    assert_eq!(h.wallet.script_to_address(&script)?, second);
    Ok(())
}

#[tokio::test]
async fn foreign_and_scriptless_addresses() -> anyhow::Result<()> {
    let h = harness().await;
    let foreign = h.wallet.script_to_address(&external_script(3))?;
    assert!(!h.wallet.has_key(&foreign).await?);

    let op_return = bitcoin::ScriptBuf::from_bytes(vec![0x6a, 0x01, 0xab]);
    assert!(matches!(
        h.wallet.script_to_address(&op_return),
        Err(LedgerError::UnknownScript(_))
    ));
    Ok(())
}

#[tokio::test]
async fn dust_threshold() {
    let h = harness().await;
    assert!(h.wallet.is_dust(Amount::from_sat(999)));
    assert!(!h.wallet.is_dust(Amount::from_sat(1_000)));
}

#[tokio::test]
async fn watched_addresses_are_matched() -> anyhow::Result<()> {
    let h = harness().await;
    let addr = Address::from_script(&external_script(9), Network::Regtest)?;
    h.wallet.add_watched_addresses(&[addr.clone()]).await?;
    assert!(h.wallet.txstore().scripts().is_watched(&addr.script_pubkey()));

    let pay = build_tx(&[foreign_outpoint(1)], &[(addr.script_pubkey(), 5_000)]);
    assert_eq!(h.wallet.ingest(&pay, 3, NOW).await?, 1);
    assert!(h.wallet.list_unspent().await?[0].watch_only);
    Ok(())
}

#[tokio::test]
async fn segwit_wallet_matches_its_own_outputs() -> anyhow::Result<()> {
    let config = LedgerConfig::new(Network::Regtest).with_address_kind(AddressKind::SegwitV0);
    let h = harness_with_config(Arc::new(MemoryStore::new()), config).await;

    let addr = h.wallet.current_address(KeyPurpose::External).await?;
    assert!(addr.script_pubkey().is_p2wpkh());

    let fund = build_tx(&[foreign_outpoint(2)], &[(addr.script_pubkey(), 8_000)]);
    assert_eq!(h.wallet.ingest(&fund, 4, NOW).await?, 2);
    h.wallet.set_chain_tip(4);
    assert_eq!(h.wallet.balance().await?.confirmed, Amount::from_sat(8_000));

    // legacy form of the same key is not ours under a segwit wallet
    let legacy = build_tx(&[foreign_outpoint(3)], &[(TestKeys::script(0), 8_000)]);
    assert_eq!(h.wallet.ingest(&legacy, 4, NOW).await?, 0);
    Ok(())
}
