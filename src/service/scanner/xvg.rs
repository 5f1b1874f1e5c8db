//! Verge 扫描器（bitcore-node API）
//!
//! `/address/{a}/txs` 返回的是 coin 列表而不是交易：
//! 第一步把 coin 拆成收入 / 支出草稿，第二步按交易哈希补全对手方、金额与区块信息。
//! 已最终确认的补全结果写入持久缓存，之后的扫描直接跳过。

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    domain::{
        currency::CurrencyInfo,
        transaction::{resolve_direction, BalanceRecord, CanonicalTransaction, Direction, TxStatus},
    },
    error::{BlocksoftError, Result},
    infrastructure::{CacheEntry, ProviderClient, ResultCache},
    repository::TxEnrichmentStore,
    service::scanner::{
        degrade, ms_to_datetime, parse_rfc3339, unwrap_legacy_envelope, value_as_i64,
        value_as_string, value_as_u64, ScannerContext, ScannerProcessor,
    },
};

const PROVIDER: &str = "api.vergecurrency";

/// 超过该确认数的内存缓存结果不再刷新
const STABLE_CONFIRMATIONS: u64 = 100;

/// 第一步产出的交易草稿
#[derive(Debug, Clone, PartialEq, Eq)]
struct TxDraft {
    hash: String,
    block_number: Option<u64>,
    direction: Direction,
    address_from: Option<String>,
    address_to: Option<String>,
    amount: Option<u64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CoinDrafts {
    outgoing: Option<TxDraft>,
    incoming: Option<TxDraft>,
}

/// coin → 草稿；非 XVG 主网记录忽略
fn split_coin(coin: &Value, already: &HashSet<String>) -> Option<CoinDrafts> {
    let text = |name: &str| coin.get(name).and_then(value_as_string).filter(|s| !s.is_empty());
    if text("chain").as_deref() != Some("XVG") || text("network").as_deref() != Some("mainnet") {
        return None;
    }

    let owner = text("address");
    let spent = text("spentTxid");
    let mint = text("mintTxid");
    let mut drafts = CoinDrafts::default();

    if let Some(spent) = spent.as_ref().filter(|h| !already.contains(*h)) {
        drafts.outgoing = Some(TxDraft {
            hash: spent.clone(),
            block_number: coin.get("spentHeight").and_then(value_as_u64).filter(|h| *h > 0),
            direction: Direction::Outcome,
            address_from: owner.clone(),
            address_to: None,
            amount: None,
        });
    }
    if let Some(mint) = mint.filter(|h| Some(h) != spent.as_ref() && !already.contains(h)) {
        drafts.incoming = Some(TxDraft {
            hash: mint,
            block_number: coin.get("mintHeight").and_then(value_as_u64).filter(|h| *h > 0),
            direction: Direction::Income,
            address_from: None,
            address_to: owner,
            amount: coin.get("value").and_then(value_as_u64),
        });
    }
    Some(drafts)
}

fn io_entries(coins: &Value, side: &str) -> Vec<(String, Option<u64>)> {
    coins
        .get(side)
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|io| {
                    let address = io.get("address").and_then(value_as_string).filter(|a| !a.is_empty())?;
                    Some((address, io.get("value").and_then(value_as_u64)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 用 `/tx/{h}/coins` 补全对手方与金额
fn enrich_counterparty(address: &str, draft: &mut TxDraft, coins: &Value) {
    let inputs = io_entries(coins, "inputs");
    let outputs = io_entries(coins, "outputs");

    match draft.direction {
        Direction::Income => {
            let mut saw_self = false;
            for (input, _) in &inputs {
                if input != address {
                    draft.address_from = Some(input.clone());
                    break;
                }
                saw_self = true;
            }
            if draft.address_from.is_none() && saw_self {
                draft.address_from = Some(address.to_string());
            }
        }
        _ => {
            if let Some((_, value)) = inputs.iter().find(|(a, _)| a == address) {
                draft.amount = *value;
            }
            // 取最后一个非本地址输出；全部回到本地址时视为自转
            let external = outputs.iter().rev().find(|(a, _)| a != address);
            draft.address_to = match external {
                Some((a, _)) => Some(a.clone()),
                None if outputs.iter().any(|(a, _)| a == address) => Some(address.to_string()),
                None => None,
            };
        }
    }
}

pub struct XvgScannerProcessor {
    info: &'static CurrencyInfo,
    client: ProviderClient,
    api_url: String,
    balance_cache: ResultCache<BalanceRecord>,
    tx_cache: ResultCache<CanonicalTransaction>,
    enrichment: Arc<dyn TxEnrichmentStore>,
    last_block: AtomicU64,
}

impl XvgScannerProcessor {
    pub fn new(info: &'static CurrencyInfo, ctx: &ScannerContext) -> Self {
        let ttl = ctx.config.scanner.cache_ttl();
        Self {
            info,
            client: ctx.provider(PROVIDER),
            api_url: ctx.config.scanner.xvg_api_url.trim_end_matches('/').to_string(),
            balance_cache: ResultCache::new("xvg_balance", ttl, ctx.clock.clone()),
            tx_cache: ResultCache::new("xvg_tx", ttl, ctx.clock.clone()),
            enrichment: ctx.enrichment.clone(),
            last_block: AtomicU64::new(0),
        }
    }

    fn durable_key(address: &str, hash: &str, kind: &str) -> String {
        format!("{}/{}_{}", address, hash, kind)
    }

    async fn fetch_balance(&self, address: &str) -> Result<Option<BalanceRecord>> {
        if let Some(entry) = self.balance_cache.get_fresh(address) {
            return Ok(Some(Self::stamped(entry)));
        }
        let url = format!("{}/address/{}/balance", self.api_url, address);
        let body = self.client.get_json(&url).await?;
        let Some(confirmed) = body.get("confirmed").and_then(value_as_i64) else {
            return Err(BlocksoftError::malformed(PROVIDER, "balance without confirmed"));
        };
        let unconfirmed = body.get("unconfirmed").and_then(value_as_i64).unwrap_or(0);

        let record = BalanceRecord {
            balance: confirmed.to_string(),
            unconfirmed: unconfirmed.to_string(),
            provider: PROVIDER.to_string(),
            scan_block: None,
            fetched_at: ms_to_datetime(0),
        };
        let entry = self
            .balance_cache
            .store(address, record, PROVIDER, None)
            .into_entry();
        Ok(Some(Self::stamped(entry)))
    }

    /// 记录时间以缓存写入时间为准
    fn stamped(entry: CacheEntry<BalanceRecord>) -> BalanceRecord {
        BalanceRecord {
            fetched_at: ms_to_datetime(entry.fetched_at_ms),
            ..entry.payload
        }
    }

    /// 链高度，失败时保持上次观察值
    async fn refresh_tip(&self) -> u64 {
        let url = format!("{}/block/tip", self.api_url);
        match self.client.get_json(&url).await {
            Ok(tip) => {
                if let Some(height) = tip.get("height").and_then(value_as_u64) {
                    self.last_block.fetch_max(height, Ordering::SeqCst);
                }
            }
            Err(e) => tracing::debug!(error = %e, "XVG tip unavailable, using confirmations from details"),
        }
        self.last_block.load(Ordering::SeqCst)
    }

    /// 未解析的一侧（coinbase 输入、无地址输出）留空；
    /// 只有两侧都未解析而判为自转时才补成查询地址
    fn side(address: &str, resolved: Option<String>, direction: Direction) -> String {
        match (resolved, direction) {
            (Some(a), _) => a,
            (None, Direction::SelfTransfer) => address.to_string(),
            (None, _) => String::new(),
        }
    }

    async fn load_coins(&self, address: &str, hash: &str) -> Result<Value> {
        let key = Self::durable_key(address, hash, "coins");
        if let Some(coins) = self.enrichment.get_cache(&key).await? {
            return Ok(coins);
        }
        let url = format!("{}/tx/{}/coins", self.api_url, hash);
        let coins = self.client.get_json(&url).await?;
        self.enrichment.save_cache(&key, coins.clone()).await?;
        Ok(coins)
    }

    async fn enrich(&self, address: &str, mut draft: TxDraft, last_block: u64) -> Result<CanonicalTransaction> {
        let cache_key = format!("{}/{}", address, draft.hash);
        if let Some(entry) = self.tx_cache.get_any(&cache_key) {
            if entry.payload.confirmations > STABLE_CONFIRMATIONS {
                return Ok(entry.payload);
            }
        }
        if let Some(entry) = self.tx_cache.get_fresh(&cache_key) {
            return Ok(entry.payload);
        }

        let coins = self.load_coins(address, &draft.hash).await?;
        enrich_counterparty(address, &mut draft, &coins);

        let url = format!("{}/tx/{}", self.api_url, draft.hash);
        let details = self.client.get_json(&url).await?;

        let block_number = draft
            .block_number
            .or_else(|| details.get("blockHeight").and_then(value_as_u64).filter(|h| *h > 0));
        let confirmations = match block_number {
            Some(block) if last_block > 0 => last_block.saturating_sub(block),
            _ => details
                .get("confirmations")
                .and_then(value_as_i64)
                .map(|c| c.unsigned_abs())
                .unwrap_or(0),
        };
        let status = if confirmations > self.info.blocks_to_confirm {
            TxStatus::Success
        } else {
            TxStatus::New
        };

        let direction = resolve_direction(
            address,
            draft.address_from.as_deref(),
            draft.address_to.as_deref(),
            draft.direction,
        );
        let amount = match direction {
            Direction::SelfTransfer => "0".to_string(),
            _ => draft.amount.unwrap_or(0).to_string(),
        };

        let tx = CanonicalTransaction {
            transaction_hash: draft.hash.clone(),
            block_hash: details.get("blockHash").and_then(value_as_string),
            block_number,
            block_time: details.get("blockTimeNormalized").and_then(parse_rfc3339),
            confirmations,
            direction,
            address_from: Self::side(address, draft.address_from, direction),
            address_to: Self::side(address, draft.address_to, direction),
            amount,
            fee_amount: details.get("fee").and_then(value_as_i64).map(|f| f.to_string()),
            status,
        };

        if status == TxStatus::Success {
            self.enrichment
                .save_cache(&Self::durable_key(address, &tx.transaction_hash, "data"), details)
                .await?;
        }
        self.tx_cache.store(&cache_key, tx.clone(), PROVIDER, block_number);
        Ok(tx)
    }

    async fn transactions(&self, address: &str) -> Result<Vec<CanonicalTransaction>> {
        let url = format!("{}/address/{}/txs", self.api_url, address);
        let body = unwrap_legacy_envelope(self.client.get_json(&url).await?);
        let coins = body
            .as_array()
            .ok_or_else(|| BlocksoftError::malformed(PROVIDER, "txs is not a list"))?;
        let last_block = self.refresh_tip().await;

        let mut already: HashSet<String> = HashSet::new();
        let mut transactions = Vec::new();
        // 按提供方返回的升序处理
        for coin in coins {
            let Some(drafts) = split_coin(coin, &already) else {
                continue;
            };
            for draft in [drafts.outgoing, drafts.incoming].into_iter().flatten() {
                if already.contains(&draft.hash) {
                    continue;
                }
                let durable = Self::durable_key(address, &draft.hash, "data");
                if self.enrichment.get_cache(&durable).await?.is_some() {
                    already.insert(draft.hash);
                    continue;
                }
                let hash = draft.hash.clone();
                let tx = self.enrich(address, draft, last_block).await?;
                already.insert(hash);
                transactions.push(tx);
            }
        }

        tracing::debug!(
            currency = %self.info.code,
            coins = coins.len(),
            new_transactions = transactions.len(),
            "XVG transactions scanned"
        );
        Ok(transactions)
    }
}

#[async_trait]
impl ScannerProcessor for XvgScannerProcessor {
    fn currency_code(&self) -> &str {
        self.info.code
    }

    async fn get_balance(&self, address: &str) -> Result<Option<BalanceRecord>> {
        degrade(self.info.code, "get_balance", self.fetch_balance(address.trim()).await, || None)
    }

    async fn get_transactions(&self, address: &str) -> Result<Vec<CanonicalTransaction>> {
        degrade(
            self.info.code,
            "get_transactions",
            self.transactions(address.trim()).await,
            Vec::new,
        )
    }
}
