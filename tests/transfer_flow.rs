//! 转账编排集成测试
//!
//! 会话 setter、重复提交保护、错误改写、nSequence 推进，
//! 以及 BTC / USDT / ETH 处理器走完整的 派生 → 选币 → 签名 → 广播 流程

mod common;

use std::sync::{atomic::Ordering, Arc};

use blocksoft_core::{
    config::SequenceAdvancePolicy,
    domain::transfer_request::{WalletIdentity, SEQUENCE_FINAL},
    error::BlocksoftError,
    repository::{AddressKind, HdXpubs},
    service::{transfer::TxOutput, BlocksoftTransfer},
};
use common::*;
use serde_json::json;

const ETH_RECIPIENT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const ETH_RPC: &str = "http://eth-rpc.test";

fn session(h: &Harness) -> BlocksoftTransfer {
    BlocksoftTransfer::new(h.env.clone())
}

/// 用假处理器顶替 ETH，私钥直接注入
fn fake_eth_session(h: &Harness) -> (BlocksoftTransfer, Arc<FakeProcessor>) {
    let fake = FakeProcessor::new("ETH");
    h.env.dispatcher.register("ETH", fake.clone());
    let mut transfer = session(h);
    transfer
        .set_currency_code("ETH")
        .set_private_key("0x4c0883a69102937d6231471b5dbb6204fe512961708279f3e1a8e3f2c1a5f6a1")
        .set_address_from(ETH_ADDRESS)
        .set_address_to(ETH_RECIPIENT)
        .set_amount("1000");
    (transfer, fake)
}

fn script_btc_backend(h: &Harness) {
    h.transport.on_get(
        &format!("/address/{}/utxo", BTC_SEGWIT),
        json!([{
            "txid": "aa".repeat(32),
            "vout": 0,
            "value": 100_000,
            "status": {"confirmed": true}
        }]),
    );
    h.transport
        .on_get(&format!("/address/{}/utxo", BTC_LEGACY), json!([]));
    h.transport.on_get(
        "/fee-estimates",
        json!({"2": 20.5, "6": 10.0, "12": 5.0, "144": 1.0}),
    );
    h.transport.on_post_text("http://esplora.test/tx", "f0f0txid");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// setters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_setters_normalize_and_reset() {
    let h = harness().await;
    let mut transfer = session(&h);

    transfer
        .set_currency_code("BTC")
        .set_derive_path("m/84quote/0quote/0quote/0/0")
        .set_address_to("  bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq \n")
        .set_amount("5000");
    assert_eq!(transfer.derive_path(), Some("m/84'/0'/0'/0/0"));
    assert_eq!(transfer.request().address_to.as_deref(), Some(BTC_RECIPIENT));

    transfer.set_transfer_all(true);
    assert!(transfer.request().transfer_all);
    assert_eq!(transfer.request().amount, None);

    transfer.set_amount("700");
    assert!(!transfer.request().transfer_all);

    // 同币种不清空
    transfer.set_currency_code("BTC");
    assert_eq!(transfer.request().amount.as_deref(), Some("700"));

    transfer.set_currency_code("ETH");
    assert_eq!(transfer.request().currency_code, "ETH");
    assert_eq!(transfer.request().amount, None);
    assert_eq!(transfer.request().address_to, None);
    assert_eq!(transfer.derive_path(), Some("m/84'/0'/0'/0/0"));
}

#[tokio::test]
async fn test_wallet_hash_and_private_key_are_exclusive() {
    let h = harness().await;
    let mut transfer = session(&h);

    transfer.set_wallet_hash(WALLET);
    assert_eq!(transfer.wallet_hash(), Some(WALLET));

    transfer.set_private_key("L1aW4aubDFB7yfras2S1mN3bqg9nwySY8nkoLmJebSLD5BWv3ENZ");
    assert_eq!(transfer.wallet_hash(), None);
    assert!(transfer.request().private_key.is_some());

    transfer.set_wallet_hash(WALLET);
    assert!(transfer.request().private_key.is_none());
}

#[tokio::test]
async fn test_transfer_all_probe_address_only_on_testnet() {
    let h = harness().await;
    let mut transfer = session(&h);

    transfer.set_currency_code("BTC_TEST");
    assert_eq!(
        transfer.address_to_for_transfer_all("tb1qsomething"),
        "mjojEgUSi68PqNHoAyjhVkwdqQyLv9dTfV"
    );
    transfer.set_currency_code("BTC");
    assert_eq!(transfer.address_to_for_transfer_all(BTC_RECIPIENT), BTC_RECIPIENT);
}

#[tokio::test]
async fn test_operations_require_currency_code() {
    let h = harness().await;
    let mut transfer = session(&h);

    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert!(matches!(err, BlocksoftError::Configuration(_)));

    transfer.set_currency_code("DOGE");
    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert_eq!(err, BlocksoftError::UnsupportedCurrency("DOGE".into()));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 重复提交保护
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_double_send_blocked_until_confirmed_or_window_passes() {
    let h = harness().await;
    let (mut transfer, fake) = fake_eth_session(&h);
    fake.push_send(sent("0x01"));
    fake.push_send(sent("0x02"));
    fake.push_send(sent("0x03"));

    assert_eq!(transfer.send_tx(false).await.unwrap().hash, "0x01");

    let err = transfer.send_tx(false).await.unwrap_err();
    assert_eq!(
        err,
        BlocksoftError::DuplicateSubmission {
            currency_code: "ETH".into(),
            address_to: ETH_RECIPIENT.into(),
        }
    );
    // 被拦截的请求没有到达处理器
    assert_eq!(fake.seen.lock().unwrap().len(), 1);

    // 用户确认后放行
    assert_eq!(transfer.send_tx(true).await.unwrap().hash, "0x02");

    h.clock.advance_ms(20_001);
    assert_eq!(transfer.send_tx(false).await.unwrap().hash, "0x03");

    let last = h.env.guard.last_sent("ETH").unwrap();
    assert_eq!(last.address_to, ETH_RECIPIENT);
    assert_eq!(last.amount, "1000");
}

#[tokio::test]
async fn test_guard_is_shared_between_sessions() {
    let h = harness().await;
    let (mut first, fake) = fake_eth_session(&h);
    fake.push_send(sent("0x01"));
    first.send_tx(false).await.unwrap();

    let mut second = session(&h);
    second
        .set_currency_code("ETH")
        .set_private_key("0x01")
        .set_address_from(ETH_ADDRESS)
        .set_address_to(ETH_RECIPIENT)
        .set_amount("5");
    let err = second.send_tx(false).await.unwrap_err();
    assert!(matches!(err, BlocksoftError::DuplicateSubmission { .. }));
}

#[tokio::test]
async fn test_failed_send_releases_reservation() {
    let h = harness().await;
    let (mut transfer, fake) = fake_eth_session(&h);
    fake.push_send(Err(BlocksoftError::upstream("connection reset")));
    fake.push_send(sent("0x02"));

    let err = transfer.send_tx(false).await.unwrap_err();
    assert_eq!(err, BlocksoftError::server_not_responding("ETH", "send_tx"));
    assert!(h.env.guard.last_sent("ETH").is_none());

    assert_eq!(transfer.send_tx(false).await.unwrap().hash, "0x02");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 错误改写
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_server_errors_become_server_not_responding() {
    let h = harness().await;
    let (mut transfer, fake) = fake_eth_session(&h);

    fake.fail_fee_rate(BlocksoftError::upstream("503 from node"));
    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert_eq!(err, BlocksoftError::server_not_responding("ETH", "get_fee_rate"));
    assert_eq!(err.code(), "server.not.responding");

    // 业务错误原样返回
    fake.fail_fee_rate(BlocksoftError::InsufficientFunds {
        have: "1".into(),
        need: "2".into(),
    });
    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert!(matches!(err, BlocksoftError::InsufficientFunds { .. }));
}

#[tokio::test]
async fn test_infura_rpc_error_is_server_origin() {
    let h = harness().await;
    h.transport.on_rpc_error(
        ETH_RPC,
        "eth_gasPrice",
        "daily request count exceeded, request rate limited by Infura",
    );
    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_private_key("0x01")
        .set_address_from(ETH_ADDRESS);

    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert_eq!(err, BlocksoftError::server_not_responding("ETH", "get_fee_rate"));
}

#[tokio::test]
async fn test_node_rejection_propagates_unchanged() {
    let h = harness().await;
    h.transport.on_rpc(ETH_RPC, "eth_gasPrice", json!("0x3b9aca00"));
    h.transport
        .on_rpc(ETH_RPC, "eth_getTransactionCount", json!("0x5"));
    h.transport
        .on_rpc_error(ETH_RPC, "eth_sendRawTransaction", "nonce too low");
    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_private_key("0x01")
        .set_address_from(ETH_ADDRESS)
        .set_address_to(ETH_RECIPIENT)
        .set_amount("1000");

    let err = transfer.send_tx(false).await.unwrap_err();
    assert_eq!(err, BlocksoftError::Rejected("nonce too low".into()));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// nSequence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_sequence_advances_only_after_success_by_default() {
    let h = harness().await;
    let (mut transfer, fake) = fake_eth_session(&h);

    fake.push_send(sent("0x01"));
    transfer.send_tx(true).await.unwrap();
    assert_eq!(transfer.request().sequence_number, Some(SEQUENCE_FINAL));

    transfer.set_sequence(Some(5));
    assert_eq!(transfer.request().sequence_number, Some(6));

    fake.push_send(Err(BlocksoftError::Rejected("bad-txns".into())));
    transfer.send_tx(true).await.unwrap_err();
    assert_eq!(transfer.request().sequence_number, Some(6));

    fake.push_send(sent("0x02"));
    transfer.send_tx(true).await.unwrap();
    assert_eq!(transfer.request().sequence_number, Some(7));
}

#[tokio::test]
async fn test_always_policy_advances_on_rejection_but_not_on_outage() {
    let mut config = test_config();
    config.transfer.sequence_policy = SequenceAdvancePolicy::Always;
    let h = harness_with(config).await;
    let (mut transfer, fake) = fake_eth_session(&h);
    transfer.set_sequence(Some(9));
    assert_eq!(transfer.request().sequence_number, Some(10));

    fake.push_send(Err(BlocksoftError::upstream("timeout")));
    transfer.send_tx(true).await.unwrap_err();
    assert_eq!(transfer.request().sequence_number, Some(10));

    fake.push_send(Err(BlocksoftError::Rejected("mempool conflict".into())));
    transfer.send_tx(true).await.unwrap_err();
    assert_eq!(transfer.request().sequence_number, Some(11));
}

#[tokio::test]
async fn test_terminal_sequence_is_not_advanced() {
    let h = harness().await;
    let (mut transfer, fake) = fake_eth_session(&h);
    transfer.set_sequence(Some(0xffff_fffd));
    let before = transfer.request().sequence_number;

    fake.push_send(Ok(blocksoft_core::domain::SendTxResult {
        hash: "0x01".into(),
        corrected_amount_from: None,
        terminal_sequence: true,
    }));
    transfer.send_tx(true).await.unwrap();
    assert_eq!(transfer.request().sequence_number, before);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 预热
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_precache_runs_once_per_currency_and_address() {
    let h = harness().await;
    let (mut transfer, fake) = fake_eth_session(&h);

    assert!(transfer.get_transfer_precache().await.unwrap().is_some());
    assert!(transfer.get_transfer_precache().await.unwrap().is_none());
    assert_eq!(fake.precache_calls.load(Ordering::SeqCst), 1);

    transfer.set_address_from("0x742d35cc6634c0532925a3b844bc9e7595f0beb6");
    assert!(transfer.get_transfer_precache().await.unwrap().is_some());
    assert_eq!(fake.precache_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_precache_can_be_retried() {
    let h = harness().await;
    h.transport.on_offline(ETH_RPC);
    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_private_key("0x01")
        .set_address_from(ETH_ADDRESS);

    let err = transfer.get_transfer_precache().await.unwrap_err();
    assert_eq!(err, BlocksoftError::server_not_responding("ETH", "get_transfer_precache"));
    let err = transfer.get_transfer_precache().await.unwrap_err();
    assert!(err.is_server_origin());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 私钥解析
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_mnemonic_is_read_once_per_wallet() {
    let h = harness().await;
    let fake = FakeProcessor::new("ETH");
    h.env.dispatcher.register("ETH", fake.clone());
    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_wallet_hash(WALLET)
        .set_address_from(ETH_ADDRESS);

    transfer.get_fee_rate(true).await.unwrap();
    transfer.get_fee_rate(true).await.unwrap();
    assert_eq!(h.secrets.reads(), 1);
    assert!(fake.last_seen().private_key.is_some());

    // 切换钱包时丢弃缓存
    transfer.set_wallet_hash("W2");
    let err = transfer.get_fee_rate(true).await.unwrap_err();
    assert_eq!(
        err,
        BlocksoftError::SecretUnavailable {
            wallet_hash: "W2".into()
        }
    );
}

#[tokio::test]
async fn test_check_transfer_has_error_skips_key_resolution() {
    let h = harness().await;
    let fake = FakeProcessor::new("ETH");
    h.env.dispatcher.register("ETH", fake.clone());
    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_wallet_hash(WALLET)
        .set_address_from(ETH_ADDRESS);

    assert_eq!(transfer.check_transfer_has_error().await.unwrap(), None);
    assert_eq!(h.secrets.reads(), 0);
    assert!(fake.last_seen().private_key.is_none());
}

#[tokio::test]
async fn test_wrong_path_for_account_currency() {
    let h = harness().await;
    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_wallet_hash(WALLET)
        .set_derive_path("m/44'/60'/0'/0/1")
        .set_address_from(ETH_ADDRESS);

    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert!(matches!(err, BlocksoftError::PathMismatch { .. }));
}

#[tokio::test]
async fn test_foreign_btc_address_is_address_mismatch() {
    let h = harness().await;
    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_RECIPIENT);

    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert_eq!(
        err,
        BlocksoftError::AddressMismatch {
            legacy: BTC_LEGACY.into(),
            segwit: BTC_SEGWIT.into(),
            expected: BTC_RECIPIENT.into(),
        }
    );
}

#[tokio::test]
async fn test_unregistered_wallet_is_configuration_error() {
    let h = harness().await;
    h.secrets.put_mnemonic("W-orphan", MNEMONIC).await;
    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash("W-orphan")
        .set_address_from(BTC_SEGWIT);

    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert!(matches!(err, BlocksoftError::Configuration(_)));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BTC 完整流程
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_btc_fee_rates_and_send_with_dual_keys() {
    let h = harness().await;
    script_btc_backend(&h);
    let mut transfer = session(&h);
    // 用户选中的是 legacy 地址，会话以 segwit 为主
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_LEGACY)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");

    let rates = transfer.get_fee_rate(false).await.unwrap();
    assert_eq!(rates.len(), 3);
    assert_eq!(rates[0].lang_msg, "btc_speed_fast");
    assert_eq!(rates[0].fee_for_byte.as_deref(), Some("21"));
    // 1 个 segwit 输入 + 收款 + 找零 = 146 字节
    assert_eq!(rates[1].lang_msg, "btc_speed_normal");
    assert_eq!(rates[1].tx_size, Some(146));
    assert_eq!(rates[1].fee_for_tx, "1460");
    assert_eq!(rates[2].fee_for_byte.as_deref(), Some("5"));

    assert_eq!(transfer.request().address_from.as_deref(), Some(BTC_SEGWIT));
    assert_eq!(transfer.request().address_from_legacy.as_deref(), Some(BTC_LEGACY));
    let accounts = h.wallets.accounts(WALLET, "BTC").await;
    assert!(accounts.iter().any(|a| a.address == BTC_SEGWIT));

    let result = transfer.send_tx(false).await.unwrap();
    assert_eq!(result.hash, "f0f0txid");
    assert!(result.terminal_sequence);

    let plans = h.signer.utxo_plans();
    assert_eq!(plans.len(), 1);
    let (plan, signing_addresses) = &plans[0];
    assert_eq!(plan.currency_code, "BTC");
    assert_eq!(plan.sequence, SEQUENCE_FINAL);
    assert_eq!(plan.fee, 1460);
    assert_eq!(
        plan.outputs,
        vec![
            TxOutput::Pay {
                address: BTC_RECIPIENT.into(),
                value: 50_000,
            },
            TxOutput::Pay {
                address: BTC_SEGWIT.into(),
                value: 48_540,
            },
        ]
    );
    assert_eq!(signing_addresses, &vec![BTC_SEGWIT.to_string(), BTC_LEGACY.to_string()]);

    let broadcast = h
        .transport
        .requests()
        .into_iter()
        .find(|r| r.url == "http://esplora.test/tx")
        .unwrap();
    assert_eq!(broadcast.body.as_deref(), Some("0200000001deadbeef"));
}

#[tokio::test]
async fn test_btc_unconfirmed_outputs_are_ignored_unless_wallet_allows() {
    let h = harness().await;
    h.transport.on_get(
        &format!("/address/{}/utxo", BTC_SEGWIT),
        json!([{"txid": "bb".repeat(32), "vout": 1, "value": 80_000, "status": {"confirmed": false}}]),
    );
    h.transport
        .on_get(&format!("/address/{}/utxo", BTC_LEGACY), json!([]));
    h.transport
        .on_get("/fee-estimates", json!({"2": 3.0, "6": 2.0, "12": 1.0}));

    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("10000");

    // precount 时没有可用输出返回空列表
    assert!(transfer.get_fee_rate(true).await.unwrap().is_empty());
    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert!(matches!(err, BlocksoftError::InsufficientFunds { .. }));

    h.wallets
        .put_wallet(WalletIdentity {
            wallet_hash: "W3".into(),
            is_hd_wallet: false,
            uses_unconfirmed_inputs: true,
            uses_legacy_addresses: false,
        })
        .await;
    h.secrets.put_mnemonic("W3", MNEMONIC).await;
    let mut relaxed = session(&h);
    relaxed
        .set_currency_code("BTC")
        .set_wallet_hash("W3")
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("10000");
    assert_eq!(relaxed.get_fee_rate(false).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_hd_wallet_sends_change_to_discovered_address() {
    let h = harness().await;
    script_btc_backend(&h);
    h.wallets
        .put_wallet(WalletIdentity {
            wallet_hash: "HD1".into(),
            is_hd_wallet: true,
            uses_unconfirmed_inputs: false,
            uses_legacy_addresses: false,
        })
        .await;
    h.secrets.put_mnemonic("HD1", MNEMONIC).await;
    h.wallets
        .put_xpubs(
            "HD1",
            "BTC",
            HdXpubs {
                legacy: "xpub-legacy".into(),
                segwit: "zpub-segwit".into(),
            },
        )
        .await;
    h.wallets
        .put_undiscovered("HD1", "BTC", BTC_CHANGE, AddressKind::Segwit)
        .await;

    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash("HD1")
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");

    transfer.get_fee_rate(false).await.unwrap();
    assert_eq!(h.wallets.discover_calls().await, 1);
    assert_eq!(transfer.request().change_address_hd.as_deref(), Some(BTC_CHANGE));
    assert_eq!(transfer.request().address_from_xpub.as_deref(), Some("zpub-segwit"));
    assert_eq!(
        transfer.request().address_from_legacy_xpub.as_deref(),
        Some("xpub-legacy")
    );

    transfer.send_tx(false).await.unwrap();
    let (plan, _) = &h.signer.utxo_plans()[0];
    assert!(matches!(
        plan.outputs.last(),
        Some(TxOutput::Pay { address, .. }) if address == BTC_CHANGE
    ));

    // 找零地址已使用，不再作为下一次的候选
    let change = h
        .wallets
        .accounts("HD1", "BTC")
        .await
        .into_iter()
        .find(|a| a.address == BTC_CHANGE)
        .unwrap();
    assert!(change.already_shown);
}

const BTC_LEGACY_CHANGE: &str = "1LegacyChangeAddress0";

async fn register_hd_wallet(h: &Harness, wallet_hash: &str, uses_legacy_addresses: bool) {
    h.wallets
        .put_wallet(WalletIdentity {
            wallet_hash: wallet_hash.into(),
            is_hd_wallet: true,
            uses_unconfirmed_inputs: false,
            uses_legacy_addresses,
        })
        .await;
    h.secrets.put_mnemonic(wallet_hash, MNEMONIC).await;
    h.wallets
        .put_xpubs(
            wallet_hash,
            "BTC",
            HdXpubs {
                legacy: "xpub-legacy".into(),
                segwit: "zpub-segwit".into(),
            },
        )
        .await;
    h.wallets
        .put_undiscovered(wallet_hash, "BTC", BTC_CHANGE, AddressKind::Segwit)
        .await;
    h.wallets
        .put_undiscovered(wallet_hash, "BTC", BTC_LEGACY_CHANGE, AddressKind::Legacy)
        .await;
}

fn broadcasts(h: &Harness) -> usize {
    h.transport
        .requests()
        .iter()
        .filter(|r| r.url == "http://esplora.test/tx")
        .count()
}

#[tokio::test]
async fn test_legacy_hd_wallet_takes_change_from_legacy_path() {
    let h = harness().await;
    script_btc_backend(&h);
    register_hd_wallet(&h, "HD2", true).await;

    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash("HD2")
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");

    transfer.get_fee_rate(false).await.unwrap();
    assert_eq!(
        transfer.request().change_address_hd.as_deref(),
        Some(BTC_LEGACY_CHANGE)
    );
    // segwit 路径上的地址没有被发现
    let accounts = h.wallets.accounts("HD2", "BTC").await;
    assert!(accounts.iter().all(|a| a.address != BTC_CHANGE));

    transfer.send_tx(false).await.unwrap();
    let (plan, _) = &h.signer.utxo_plans()[0];
    assert!(matches!(
        plan.outputs.last(),
        Some(TxOutput::Pay { address, .. }) if address == BTC_LEGACY_CHANGE
    ));
}

#[tokio::test]
async fn test_btc_double_send_blocked_after_real_broadcast() {
    let h = harness().await;
    script_btc_backend(&h);
    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");

    assert_eq!(transfer.send_tx(false).await.unwrap().hash, "f0f0txid");
    let err = transfer.send_tx(false).await.unwrap_err();
    assert!(matches!(
        &err,
        BlocksoftError::DuplicateSubmission { currency_code, address_to }
            if currency_code == "BTC" && address_to == BTC_RECIPIENT
    ));
    assert_eq!(err.code(), "ui.confirm.double.send");
    assert_eq!(broadcasts(&h), 1);
    assert_eq!(h.signer.utxo_plans().len(), 1);

    // 用户确认后放行
    transfer.send_tx(true).await.unwrap();
    assert_eq!(broadcasts(&h), 2);
}

#[tokio::test]
async fn test_hd_double_send_marks_change_before_blocking() {
    let h = harness().await;
    script_btc_backend(&h);
    register_hd_wallet(&h, "HD3", false).await;

    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash("HD3")
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");
    transfer.send_tx(false).await.unwrap();

    let change = h
        .wallets
        .accounts("HD3", "BTC")
        .await
        .into_iter()
        .find(|a| a.address == BTC_CHANGE)
        .unwrap();
    assert!(change.already_shown);

    let mut again = session(&h);
    again
        .set_currency_code("BTC")
        .set_wallet_hash("HD3")
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");
    assert!(matches!(
        again.send_tx(false).await.unwrap_err(),
        BlocksoftError::DuplicateSubmission { .. }
    ));
    assert_eq!(broadcasts(&h), 1);
}

#[tokio::test]
async fn test_btc_amount_beyond_any_balance_is_insufficient() {
    let h = harness().await;
    script_btc_backend(&h);
    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount(u64::MAX.to_string());

    assert!(matches!(
        transfer.get_fee_rate(false).await.unwrap_err(),
        BlocksoftError::InsufficientFunds { .. }
    ));
    assert!(matches!(
        transfer.send_tx(false).await.unwrap_err(),
        BlocksoftError::InsufficientFunds { .. }
    ));
    assert_eq!(broadcasts(&h), 0);
}

#[tokio::test]
async fn test_btc_outage_is_reported_with_currency() {
    let h = harness().await;
    h.transport.on_offline("http://esplora.test");
    let mut transfer = session(&h);
    transfer
        .set_currency_code("BTC")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_RECIPIENT)
        .set_amount("50000");

    let err = transfer.get_fee_rate(false).await.unwrap_err();
    assert_eq!(err, BlocksoftError::server_not_responding("BTC", "get_fee_rate"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// USDT / ETH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_usdt_send_carries_omni_payload() {
    let h = harness().await;
    script_btc_backend(&h);
    let mut transfer = session(&h);
    transfer
        .set_currency_code("USDT")
        .set_wallet_hash(WALLET)
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_LEGACY)
        .set_amount("250000000");

    assert_eq!(transfer.check_transfer_has_error().await.unwrap(), None);
    transfer.send_tx(false).await.unwrap();

    let (plan, _) = &h.signer.utxo_plans()[0];
    assert_eq!(plan.currency_code, "USDT");
    assert_eq!(
        plan.outputs[0],
        TxOutput::Pay {
            address: BTC_LEGACY.into(),
            value: 546,
        }
    );
    assert_eq!(
        plan.outputs[1],
        TxOutput::OpReturn {
            data_hex: "6f6d6e69000000000000001f000000000ee6b280".into(),
        }
    );
    // 账户登记在手续费币种下
    assert!(!h.wallets.accounts(WALLET, "BTC").await.is_empty());
}

#[tokio::test]
async fn test_usdt_warns_when_btc_cannot_cover_fee() {
    let h = harness().await;
    h.transport
        .on_get(&format!("/address/{}/utxo", BTC_SEGWIT), json!([]));
    h.transport
        .on_get(&format!("/address/{}/utxo", BTC_LEGACY), json!([]));
    let mut transfer = session(&h);
    transfer
        .set_currency_code("USDT")
        .set_address_from(BTC_SEGWIT)
        .set_address_to(BTC_LEGACY)
        .set_amount("100");

    let warning = transfer.check_transfer_has_error().await.unwrap().unwrap();
    assert_eq!(warning.code, "not.enough.btc.for.fee");
}

#[tokio::test]
async fn test_eth_send_builds_account_plan() {
    let h = harness().await;
    h.transport.on_rpc(ETH_RPC, "eth_gasPrice", json!("0x3b9aca00"));
    h.transport
        .on_rpc(ETH_RPC, "eth_getTransactionCount", json!("0x5"));
    h.transport
        .on_rpc(ETH_RPC, "eth_sendRawTransaction", json!("0xabc"));

    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_wallet_hash(WALLET)
        .set_address_from(ETH_ADDRESS)
        .set_address_to(ETH_RECIPIENT)
        .set_amount("1000");

    let rates = transfer.get_fee_rate(false).await.unwrap();
    let medium = rates.iter().find(|r| r.lang_msg == "eth_speed_medium").unwrap();
    assert_eq!(medium.gas_price.as_deref(), Some("1000000000"));
    assert_eq!(medium.fee_for_tx, "21000000000000");

    let result = transfer.send_tx(false).await.unwrap();
    assert_eq!(result.hash, "0xabc");

    let plan = &h.signer.account_plans()[0];
    assert_eq!(plan.chain_id, 1);
    assert_eq!(plan.nonce, 5);
    assert_eq!(plan.value, 1000);
    assert_eq!(plan.gas_limit, 21_000);
    assert_eq!(plan.to, ETH_RECIPIENT);
    assert!(plan.data.is_none());
}

#[tokio::test]
async fn test_eth_transfer_all_reports_corrected_amount() {
    let h = harness().await;
    h.transport.on_rpc(ETH_RPC, "eth_gasPrice", json!("0x3b9aca00"));
    h.transport
        .on_rpc(ETH_RPC, "eth_getBalance", json!("0x2386f26fc10000"));
    h.transport
        .on_rpc(ETH_RPC, "eth_getTransactionCount", json!("0x0"));
    h.transport
        .on_rpc(ETH_RPC, "eth_sendRawTransaction", json!("0xdef"));

    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH")
        .set_private_key("0x01")
        .set_address_from(ETH_ADDRESS)
        .set_address_to(ETH_RECIPIENT)
        .set_transfer_all(true);

    let result = transfer.send_tx(false).await.unwrap();
    assert_eq!(
        result.corrected_amount_from.as_deref(),
        Some("9979000000000000")
    );
}

#[tokio::test]
async fn test_erc20_send_targets_contract() {
    let h = harness().await;
    h.transport.on_rpc(ETH_RPC, "eth_gasPrice", json!("0x1"));
    h.transport
        .on_rpc(ETH_RPC, "eth_getTransactionCount", json!("0x2"));
    h.transport
        .on_rpc(ETH_RPC, "eth_sendRawTransaction", json!("0x123"));

    let mut transfer = session(&h);
    transfer
        .set_currency_code("ETH_USDT")
        .set_private_key("0x01")
        .set_address_from(ETH_ADDRESS)
        .set_address_to(ETH_RECIPIENT)
        .set_amount("1000000");

    transfer.send_tx(false).await.unwrap();
    let plan = &h.signer.account_plans()[0];
    assert_eq!(plan.to, "0xdac17f958d2ee523a2206206994597c13d831ec7");
    assert_eq!(plan.value, 0);
    assert_eq!(plan.gas_limit, 100_000);
    assert!(plan.data.as_deref().unwrap().starts_with("0xa9059cbb"));
}
