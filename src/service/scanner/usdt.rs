//! Omni USDT 扫描器
//!
//! 一次请求 `{api}/{address}` 同时给出余额与交易列表，结果按地址缓存

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    domain::{
        currency::CurrencyInfo,
        transaction::{resolve_direction, BalanceRecord, CanonicalTransaction, Direction, TxStatus},
    },
    error::{BlocksoftError, Result},
    infrastructure::{CacheEntry, CacheWrite, ProviderClient, ResultCache},
    service::scanner::{
        degrade, ms_to_datetime, parse_rfc3339, unwrap_legacy_envelope, value_as_string,
        value_as_u64, ScannerContext, ScannerProcessor,
    },
    utils::amount,
};

const PROVIDER: &str = "usdt";
const PROVIDER_CACHED: &str = "usdt-cache";

pub struct UsdtScannerProcessor {
    info: &'static CurrencyInfo,
    client: ProviderClient,
    api_url: String,
    cache: ResultCache<Value>,
    /// 观察到的最高区块，只增不减
    last_block: AtomicU64,
}

impl UsdtScannerProcessor {
    pub fn new(info: &'static CurrencyInfo, ctx: &ScannerContext) -> Self {
        Self {
            info,
            client: ctx.provider(PROVIDER),
            api_url: ctx.config.scanner.usdt_api_url.trim_end_matches('/').to_string(),
            cache: ResultCache::new("usdt_scanner", ctx.config.scanner.cache_ttl(), ctx.clock.clone()),
            last_block: AtomicU64::new(0),
        }
    }

    pub fn last_block(&self) -> u64 {
        self.last_block.load(Ordering::SeqCst)
    }

    /// 返回 (缓存条目, 提供方标签)
    async fn fetch(&self, address: &str) -> Result<(CacheEntry<Value>, &'static str)> {
        if let Some(entry) = self.cache.get_fresh(address) {
            return Ok((entry, PROVIDER_CACHED));
        }

        let url = format!("{}/{}", self.api_url, address);
        let body = self.client.get_json(&url).await?;
        if body.get("status").is_none() {
            return Err(BlocksoftError::malformed(PROVIDER, "response without status"));
        }
        let payload = body
            .get("data")
            .filter(|d| d.get("balance").is_some())
            .cloned()
            .ok_or_else(|| BlocksoftError::malformed(PROVIDER, "response without data.balance"))?;
        let block = payload.get("block").and_then(value_as_u64);

        match self.cache.store(address, payload, PROVIDER, block) {
            CacheWrite::Stored(entry) => Ok((entry, PROVIDER)),
            CacheWrite::KeptNewer(entry) => Ok((entry, PROVIDER_CACHED)),
        }
    }

    fn unify(&self, address: &str, tx: &Value, last_block: u64) -> Result<CanonicalTransaction> {
        let field = |name: &str| tx.get(name).and_then(value_as_string);

        let hash = field("transaction_txid")
            .ok_or_else(|| BlocksoftError::malformed(PROVIDER, "transaction without txid"))?;
        let block_number = tx.get("block_number").and_then(value_as_u64);
        let confirmations = block_number
            .map(|b| last_block.saturating_sub(b))
            .unwrap_or(0);

        let valid = field("custom_valid").as_deref() == Some("1")
            && field("_removed").as_deref() == Some("0");
        let status = if valid {
            TxStatus::from_confirmations(confirmations, self.info.blocks_to_confirm)
        } else {
            TxStatus::Fail
        };

        let from = field("from_address").unwrap_or_default();
        let to = field("to_address").unwrap_or_default();
        let reported = if from.eq_ignore_ascii_case(address) {
            Direction::Outcome
        } else {
            Direction::Income
        };
        let direction = resolve_direction(
            address,
            Some(from.as_str()).filter(|s| !s.is_empty()),
            Some(to.as_str()).filter(|s| !s.is_empty()),
            reported,
        );

        let amount = match direction {
            Direction::SelfTransfer => "0".to_string(),
            _ => amount::decimal_to_minimal(&field("amount").unwrap_or_else(|| "0".into()), self.info.decimals)?
                .to_string(),
        };
        let fee_amount = match field("fee") {
            Some(fee) => Some(amount::decimal_to_minimal(&fee, 8)?.to_string()),
            None => None,
        };

        Ok(CanonicalTransaction {
            transaction_hash: hash,
            block_hash: field("transaction_block_hash"),
            block_number,
            block_time: tx.get("created_time").and_then(parse_rfc3339),
            confirmations,
            direction,
            address_from: from,
            address_to: to,
            amount,
            fee_amount,
            status,
        })
    }

    async fn transactions(&self, address: &str) -> Result<Vec<CanonicalTransaction>> {
        let (entry, _) = self.fetch(address).await?;
        let payload = unwrap_legacy_envelope(entry.payload);
        let txs = payload
            .get("txs")
            .and_then(|t| t.as_array())
            .ok_or_else(|| BlocksoftError::malformed(PROVIDER, "response without txs"))?;

        if let Some(block) = payload.get("block").and_then(value_as_u64).or(entry.scan_block) {
            self.last_block.fetch_max(block, Ordering::SeqCst);
        }
        let last_block = self.last_block();

        let mut transactions = Vec::with_capacity(txs.len());
        for tx in txs {
            match self.unify(address, tx, last_block) {
                Ok(unified) => transactions.push(unified),
                Err(e) => tracing::warn!(
                    currency = %self.info.code,
                    error = %e,
                    "Skipping unparseable transaction"
                ),
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl ScannerProcessor for UsdtScannerProcessor {
    fn currency_code(&self) -> &str {
        self.info.code
    }

    async fn get_balance(&self, address: &str) -> Result<Option<BalanceRecord>> {
        let address = address.trim();
        let fetched = degrade(self.info.code, "get_balance", self.fetch(address).await.map(Some), || None)?;
        let Some((entry, provider)) = fetched else {
            return Ok(None);
        };

        let Some(raw) = entry.payload.get("balance").and_then(value_as_string) else {
            return Ok(None);
        };
        let balance = match amount::decimal_to_minimal(&raw, self.info.decimals) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(currency = %self.info.code, balance = %raw, "Unparseable balance");
                return Ok(None);
            }
        };

        tracing::debug!(currency = %self.info.code, provider = %provider, balance = %balance, "Balance loaded");
        Ok(Some(BalanceRecord {
            balance: balance.to_string(),
            unconfirmed: "0".into(),
            provider: provider.to_string(),
            scan_block: entry.scan_block,
            fetched_at: ms_to_datetime(entry.fetched_at_ms),
        }))
    }

    async fn get_transactions(&self, address: &str) -> Result<Vec<CanonicalTransaction>> {
        let address = address.trim();
        degrade(
            self.info.code,
            "get_transactions",
            self.transactions(address).await,
            Vec::new,
        )
    }
}
