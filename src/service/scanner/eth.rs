//! 以太坊扫描器（etherscan 兼容 API）
//!
//! 原生币用 balance / txlist / txlistinternal，ERC-20 用 tokenbalance / tokentx

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    domain::{
        currency::{ChainFamily, CurrencyInfo},
        transaction::{resolve_direction, BalanceRecord, CanonicalTransaction, Direction, TxStatus},
    },
    error::{BlocksoftError, Result},
    infrastructure::{CacheEntry, ProviderClient, ResultCache},
    service::scanner::{
        degrade, ms_to_datetime, value_as_i64, value_as_string, value_as_u64, ScannerContext,
        ScannerProcessor,
    },
};

const NO_TRANSACTIONS: &str = "No transactions found";

pub struct EthScannerProcessor {
    info: &'static CurrencyInfo,
    client: ProviderClient,
    api_url: String,
    api_key: Option<String>,
    balance_cache: ResultCache<BalanceRecord>,
}

impl EthScannerProcessor {
    pub fn new(info: &'static CurrencyInfo, ctx: &ScannerContext) -> Self {
        let scanner = &ctx.config.scanner;
        let (name, api_url) = if info.chain_id == Some(3) {
            ("etherscan_ropsten", scanner.etherscan_ropsten_url.clone())
        } else {
            ("etherscan", scanner.etherscan_mainnet_url.clone())
        };
        Self {
            info,
            client: ctx.provider(name),
            api_url,
            api_key: scanner.etherscan_api_key.clone(),
            balance_cache: ResultCache::new("eth_balance", scanner.cache_ttl(), ctx.clock.clone()),
        }
    }

    fn is_token(&self) -> bool {
        self.info.family == ChainFamily::AccountToken
    }

    fn url(&self, action: &str, address: &str) -> String {
        let mut url = format!(
            "{}?module=account&action={}&address={}",
            self.api_url, action, address
        );
        if let Some(contract) = self.info.token_contract {
            url.push_str(&format!("&contractaddress={}", contract));
        }
        match action {
            "balance" | "tokenbalance" => url.push_str("&tag=latest"),
            _ => url.push_str("&sort=desc"),
        }
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&apikey={}", key));
        }
        url
    }

    /// etherscan 信封：status=1 成功；"No transactions found" 视为空列表；其余 NOTOK 视为上游故障
    async fn call(&self, action: &str, address: &str) -> Result<Value> {
        let body = self.client.get_json(&self.url(action, address)).await?;
        let status = body.get("status").and_then(value_as_string).unwrap_or_default();
        let message = body.get("message").and_then(value_as_string).unwrap_or_default();
        let result = body.get("result").cloned().unwrap_or(Value::Null);

        if status == "1" {
            return Ok(result);
        }
        if message.starts_with(NO_TRANSACTIONS) {
            return Ok(Value::Array(Vec::new()));
        }
        let detail = value_as_string(&result).unwrap_or(message);
        Err(BlocksoftError::upstream(format!("etherscan {}: {}", action, detail)))
    }

    fn stamped(entry: CacheEntry<BalanceRecord>) -> BalanceRecord {
        BalanceRecord {
            fetched_at: ms_to_datetime(entry.fetched_at_ms),
            ..entry.payload
        }
    }

    async fn fetch_balance(&self, address: &str) -> Result<Option<BalanceRecord>> {
        let key = address.to_lowercase();
        if let Some(entry) = self.balance_cache.get_fresh(&key) {
            return Ok(Some(Self::stamped(entry)));
        }
        let action = if self.is_token() { "tokenbalance" } else { "balance" };
        let result = self.call(action, address).await?;
        let balance = value_as_string(&result)
            .filter(|b| !b.is_empty() && b.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), "balance is not an integer"))?;

        let record = BalanceRecord {
            balance,
            unconfirmed: "0".into(),
            provider: self.client.name().to_string(),
            scan_block: None,
            fetched_at: ms_to_datetime(0),
        };
        let entry = self
            .balance_cache
            .store(&key, record, self.client.name(), None)
            .into_entry();
        Ok(Some(Self::stamped(entry)))
    }

    fn unify(&self, address: &str, tx: &Value) -> Option<CanonicalTransaction> {
        let field = |name: &str| tx.get(name).and_then(value_as_string).filter(|s| !s.is_empty());

        let hash = field("hash")?;
        let from = field("from").unwrap_or_default();
        let to = field("to").or_else(|| field("contractAddress")).unwrap_or_default();
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

        let confirmations = tx.get("confirmations").and_then(value_as_u64).unwrap_or(0);
        let status = if field("isError").as_deref() == Some("1") {
            TxStatus::Fail
        } else {
            TxStatus::from_confirmations(confirmations, self.info.blocks_to_confirm)
        };

        let fee_amount = match (
            tx.get("gasUsed").and_then(value_as_u64),
            tx.get("gasPrice").and_then(value_as_u64),
        ) {
            (Some(used), Some(price)) => Some((used as u128 * price as u128).to_string()),
            _ => None,
        };

        Some(CanonicalTransaction {
            transaction_hash: hash,
            block_hash: field("blockHash"),
            block_number: tx.get("blockNumber").and_then(value_as_u64),
            block_time: tx
                .get("timeStamp")
                .and_then(value_as_i64)
                .map(|secs| ms_to_datetime(secs * 1000)),
            confirmations,
            amount: match direction {
                Direction::SelfTransfer => "0".into(),
                _ => field("value").unwrap_or_else(|| "0".into()),
            },
            direction,
            address_from: from,
            address_to: to,
            fee_amount,
            status,
        })
    }

    async fn list(&self, action: &str, address: &str) -> Result<Vec<CanonicalTransaction>> {
        let result = self.call(action, address).await?;
        let items = result
            .as_array()
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), format!("{} is not a list", action)))?;
        Ok(items.iter().filter_map(|tx| self.unify(address, tx)).collect())
    }

    async fn transactions(&self, address: &str) -> Result<Vec<CanonicalTransaction>> {
        if self.is_token() {
            return self.list("tokentx", address).await;
        }
        let mut transactions = self.list("txlist", address).await?;

        // 合约内部转入：父交易已在列表中的不重复计入
        match self.list("txlistinternal", address).await {
            Ok(internal) => {
                for tx in internal {
                    if !transactions.iter().any(|t| t.transaction_hash == tx.transaction_hash) {
                        transactions.push(tx);
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "Internal transactions unavailable"),
        }
        Ok(transactions)
    }
}

#[async_trait]
impl ScannerProcessor for EthScannerProcessor {
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
