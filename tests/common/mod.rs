//! 测试辅助模块
//! 提供脚本化 HTTP 传输、记录型签名器与编排器环境构造

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use blocksoft_core::{
    config::Config,
    domain::transfer_request::{
        FeeRate, PrecacheOutcome, SendTxResult, TransferRequest, TransferWarning, WalletIdentity,
    },
    error::{BlocksoftError, Result},
    infrastructure::{
        HttpMethod, HttpRequest, HttpResponse, HttpTransport, ManualClock, SharedClock, TransportError,
    },
    repository::{MemoryEnrichmentStore, MemorySecretStore, MemoryWalletStore},
    service::{
        transfer::{
            signer::{AccountTxPlan, SignedTransaction, SpendKey, TransactionSigner, UtxoSpendPlan},
            ProcessorContext, TransferDispatcher, TransferProcessor,
        },
        ScannerContext, ScannerDispatcher, TransferEnvironment,
    },
};

pub const MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// m/84'/0'/0'/0/0
pub const BTC_SEGWIT: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
/// m/44'/0'/0'/0/0
pub const BTC_LEGACY: &str = "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA";
/// m/44'/60'/0'/0/0
pub const ETH_ADDRESS: &str = "0x9858EfFD232B4033E47d90003D23EC58E053e11f";

pub const BTC_RECIPIENT: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
pub const BTC_CHANGE: &str = "bc1qchangeaddress0";

pub const WALLET: &str = "W1";

pub const START_MS: i64 = 1_700_000_000_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 脚本化传输
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Reply = std::result::Result<HttpResponse, TransportError>;

struct Route {
    method: Option<HttpMethod>,
    pattern: String,
    /// JSON-RPC 请求按请求体区分
    body_pattern: Option<String>,
    /// 最后一个回复会被重复使用
    replies: VecDeque<Reply>,
}

/// 按 URL 子串匹配，先注册的路由优先
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push_route(&self, method: Option<HttpMethod>, pattern: &str, body_pattern: Option<String>, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.pattern == pattern && r.method == method && r.body_pattern == body_pattern)
        {
            route.replies.push_back(reply);
            return;
        }
        routes.push(Route {
            method,
            pattern: pattern.to_string(),
            body_pattern,
            replies: VecDeque::from([reply]),
        });
    }

    fn push(&self, method: Option<HttpMethod>, pattern: &str, reply: Reply) {
        self.push_route(method, pattern, None, reply);
    }

    /// JSON-RPC：按 `"method":"..."` 匹配，回复 `{result}` 信封
    pub fn on_rpc(&self, url: &str, method: &str, result: serde_json::Value) {
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result});
        self.push_route(
            Some(HttpMethod::Post),
            url,
            Some(format!("\"method\":\"{}\"", method)),
            Ok(HttpResponse::ok(body.to_string())),
        );
    }

    pub fn on_rpc_error(&self, url: &str, method: &str, message: &str) {
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": message}});
        self.push_route(
            Some(HttpMethod::Post),
            url,
            Some(format!("\"method\":\"{}\"", method)),
            Ok(HttpResponse::ok(body.to_string())),
        );
    }

    pub fn on_get(&self, pattern: &str, body: serde_json::Value) {
        self.push(Some(HttpMethod::Get), pattern, Ok(HttpResponse::ok(body.to_string())));
    }

    pub fn on_post_text(&self, pattern: &str, body: &str) {
        self.push(Some(HttpMethod::Post), pattern, Ok(HttpResponse::ok(body)));
    }

    pub fn on_post(&self, pattern: &str, body: serde_json::Value) {
        self.push(Some(HttpMethod::Post), pattern, Ok(HttpResponse::ok(body.to_string())));
    }

    pub fn on_status(&self, pattern: &str, status: u16, body: &str) {
        self.push(
            None,
            pattern,
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub fn on_offline(&self, pattern: &str) {
        self.push(None, pattern, Err(TransportError("connection refused".into())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Reply {
        self.log.lock().unwrap().push(request.clone());
        let mut routes = self.routes.lock().unwrap();
        let body = request.body.clone().unwrap_or_default();
        let route = routes.iter_mut().find(|r| {
            request.url.contains(&r.pattern)
                && r.method.map_or(true, |m| m == request.method)
                && r.body_pattern.as_ref().map_or(true, |p| body.contains(p.as_str()))
        });
        match route {
            Some(route) if route.replies.len() > 1 => route.replies.pop_front().unwrap(),
            Some(route) => route.replies.front().cloned().unwrap(),
            None => Ok(HttpResponse {
                status: 404,
                body: format!("no route for {}", request.url),
            }),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 签名器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct RecordingSigner {
    utxo_plans: Mutex<Vec<(UtxoSpendPlan, Vec<String>)>>,
    account_plans: Mutex<Vec<AccountTxPlan>>,
}

impl RecordingSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (计划, 参与签名的地址)
    pub fn utxo_plans(&self) -> Vec<(UtxoSpendPlan, Vec<String>)> {
        self.utxo_plans.lock().unwrap().clone()
    }

    pub fn account_plans(&self) -> Vec<AccountTxPlan> {
        self.account_plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    async fn sign_utxo(&self, plan: &UtxoSpendPlan, keys: &[SpendKey]) -> Result<SignedTransaction> {
        let addresses = keys.iter().map(|k| k.address.clone()).collect();
        self.utxo_plans.lock().unwrap().push((plan.clone(), addresses));
        Ok(SignedTransaction {
            raw_hex: "0200000001deadbeef".into(),
        })
    }

    async fn sign_account(&self, plan: &AccountTxPlan, _key: &SpendKey) -> Result<SignedTransaction> {
        self.account_plans.lock().unwrap().push(plan.clone());
        Ok(SignedTransaction {
            raw_hex: "0xf86c".into(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 可编程处理器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 按顺序返回预置的 send_tx 结果，记录每次收到的请求
pub struct FakeProcessor {
    code: &'static str,
    send_results: Mutex<VecDeque<Result<SendTxResult>>>,
    fee_result: Mutex<Option<BlocksoftError>>,
    pub seen: Mutex<Vec<TransferRequest>>,
    pub precache_calls: AtomicUsize,
}

impl FakeProcessor {
    pub fn new(code: &'static str) -> Arc<Self> {
        Arc::new(Self {
            code,
            send_results: Mutex::new(VecDeque::new()),
            fee_result: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
            precache_calls: AtomicUsize::new(0),
        })
    }

    pub fn push_send(&self, result: Result<SendTxResult>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn fail_fee_rate(&self, err: BlocksoftError) {
        *self.fee_result.lock().unwrap() = Some(err);
    }

    pub fn last_seen(&self) -> TransferRequest {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

pub fn sent(hash: &str) -> Result<SendTxResult> {
    Ok(SendTxResult {
        hash: hash.to_string(),
        corrected_amount_from: None,
        terminal_sequence: false,
    })
}

#[async_trait]
impl TransferProcessor for FakeProcessor {
    fn currency_code(&self) -> &str {
        self.code
    }

    async fn check_transfer_has_error(&self, req: &TransferRequest) -> Result<Option<TransferWarning>> {
        self.seen.lock().unwrap().push(req.clone());
        Ok(None)
    }

    async fn get_fee_rate(&self, req: &TransferRequest, _is_precount: bool) -> Result<Vec<FeeRate>> {
        self.seen.lock().unwrap().push(req.clone());
        if let Some(err) = self.fee_result.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(vec![FeeRate {
            lang_msg: "btc_speed_normal".into(),
            fee_for_tx: "1000".into(),
            tx_size: Some(140),
            fee_for_byte: Some("7".into()),
            gas_price: None,
            gas_limit: None,
        }])
    }

    async fn get_transfer_all_balance(&self, req: &TransferRequest, balance_raw: &str) -> Result<String> {
        self.seen.lock().unwrap().push(req.clone());
        Ok(balance_raw.to_string())
    }

    async fn get_transfer_precache(&self, req: &TransferRequest) -> Result<PrecacheOutcome> {
        self.seen.lock().unwrap().push(req.clone());
        self.precache_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PrecacheOutcome {
            warmed: vec!["fake".into()],
        })
    }

    async fn send_tx(&self, req: &TransferRequest) -> Result<SendTxResult> {
        self.seen.lock().unwrap().push(req.clone());
        self.send_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| sent("fallback"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 环境
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 无重试、无回退、固定的提供方地址
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.retries = 0;
    config.provider.backoff_base_ms = 0;
    config.transfer.double_send_window_ms = 20_000;
    config.scanner.cache_ttl_ms = 30_000;
    config.scanner.usdt_api_url = "http://usdt.test".into();
    config.scanner.xvg_api_url = "http://xvg.test".into();
    config.scanner.etherscan_mainnet_url = "http://etherscan.test/api".into();
    config.scanner.etherscan_ropsten_url = "http://ropsten.etherscan.test/api".into();
    config.scanner.etherscan_api_key = None;
    config.networks.btc_api_url = "http://esplora.test".into();
    config.networks.btc_test_api_url = "http://esplora-testnet.test".into();
    config.networks.eth_rpc_url = "http://eth-rpc.test".into();
    config.networks.eth_ropsten_rpc_url = "http://ropsten-rpc.test".into();
    config
}

pub struct Harness {
    pub env: Arc<TransferEnvironment>,
    pub transport: Arc<ScriptedTransport>,
    pub signer: Arc<RecordingSigner>,
    pub clock: Arc<ManualClock>,
    pub wallets: Arc<MemoryWalletStore>,
    pub secrets: Arc<MemorySecretStore>,
}

pub async fn harness_with(config: Config) -> Harness {
    let transport = ScriptedTransport::new();
    let signer = RecordingSigner::new();
    let clock = Arc::new(ManualClock::new(START_MS));
    let shared: SharedClock = clock.clone();
    let config = Arc::new(config);

    let dispatcher = Arc::new(TransferDispatcher::new(ProcessorContext {
        config: config.clone(),
        transport: transport.clone(),
        signer: signer.clone(),
        clock: shared.clone(),
    }));

    let wallets = Arc::new(MemoryWalletStore::new());
    wallets
        .put_wallet(WalletIdentity {
            wallet_hash: WALLET.into(),
            is_hd_wallet: false,
            uses_unconfirmed_inputs: false,
            uses_legacy_addresses: false,
        })
        .await;
    let secrets = Arc::new(MemorySecretStore::new());
    secrets.put_mnemonic(WALLET, MNEMONIC).await;

    let env = Arc::new(TransferEnvironment::new(
        config,
        dispatcher,
        wallets.clone(),
        secrets.clone(),
        shared,
    ));
    Harness {
        env,
        transport,
        signer,
        clock,
        wallets,
        secrets,
    }
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

pub struct ScanHarness {
    pub dispatcher: ScannerDispatcher,
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<ManualClock>,
    pub enrichment: Arc<MemoryEnrichmentStore>,
}

pub fn scan_harness() -> ScanHarness {
    let transport = ScriptedTransport::new();
    let clock = Arc::new(ManualClock::new(START_MS));
    let enrichment = Arc::new(MemoryEnrichmentStore::new());
    let dispatcher = ScannerDispatcher::new(ScannerContext {
        config: Arc::new(test_config()),
        transport: transport.clone(),
        clock: clock.clone(),
        enrichment: enrichment.clone(),
    });
    ScanHarness {
        dispatcher,
        transport,
        clock,
        enrichment,
    }
}
