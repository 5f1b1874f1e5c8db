//! 链上数据扫描
//!
//! 每个币种一个 ScannerProcessor，把区块浏览器的返回统一成
//! BalanceRecord / CanonicalTransaction。扫描器不依赖转账编排器。

pub mod eth;
pub mod usdt;
pub mod xvg;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::{
    config::Config,
    domain::{
        currency::{self, CurrencyInfo},
        transaction::{BalanceRecord, CanonicalTransaction},
    },
    error::{BlocksoftError, Result},
    infrastructure::{HttpTransport, ProviderClient, SharedClock},
    repository::TxEnrichmentStore,
};

pub use eth::EthScannerProcessor;
pub use usdt::UsdtScannerProcessor;
pub use xvg::XvgScannerProcessor;

#[async_trait]
pub trait ScannerProcessor: Send + Sync {
    fn currency_code(&self) -> &str;

    /// 无可用数据时返回 None
    async fn get_balance(&self, address: &str) -> Result<Option<BalanceRecord>>;

    async fn get_transactions(&self, address: &str) -> Result<Vec<CanonicalTransaction>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 公共工具
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 旧版钱包的返回多包了一层 `{data: ...}`
pub fn unwrap_legacy_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner) if !inner.is_null() => inner,
            Some(inner) => {
                map.insert("data".into(), inner);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

/// 扫描失败的降级规则：
/// - 上游故障 → ServerNotResponding
/// - 结构错误 / 业务拒绝 → 记录后视为无数据
pub(crate) fn degrade<T>(
    currency_code: &str,
    operation: &str,
    result: Result<T>,
    empty: impl FnOnce() -> T,
) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_server_origin() => {
            tracing::warn!(currency = %currency_code, operation = %operation, "Scanner provider unavailable");
            Err(BlocksoftError::server_not_responding(currency_code, operation))
        }
        Err(e @ BlocksoftError::MalformedResponse { .. }) | Err(e @ BlocksoftError::Rejected(_)) => {
            tracing::warn!(
                currency = %currency_code,
                operation = %operation,
                error = %e,
                "Scanner response unusable, treating as no data"
            );
            Ok(empty())
        }
        Err(e) => Err(e),
    }
}

/// 数字或数字字符串
pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 负数与缺失都视为 None
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    value_as_i64(value).and_then(|v| u64::try_from(v).ok())
}

pub(crate) fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub(crate) fn parse_rfc3339(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 分发
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct ScannerContext {
    pub config: Arc<Config>,
    pub transport: Arc<dyn HttpTransport>,
    pub clock: SharedClock,
    pub enrichment: Arc<dyn TxEnrichmentStore>,
}

impl ScannerContext {
    pub fn provider(&self, name: &str) -> ProviderClient {
        ProviderClient::new(name, self.transport.clone(), &self.config.provider)
    }
}

type ScannerFactory = fn(&'static CurrencyInfo, &ScannerContext) -> Arc<dyn ScannerProcessor>;

fn build_usdt(info: &'static CurrencyInfo, ctx: &ScannerContext) -> Arc<dyn ScannerProcessor> {
    Arc::new(UsdtScannerProcessor::new(info, ctx))
}

fn build_xvg(info: &'static CurrencyInfo, ctx: &ScannerContext) -> Arc<dyn ScannerProcessor> {
    Arc::new(XvgScannerProcessor::new(info, ctx))
}

fn build_eth(info: &'static CurrencyInfo, ctx: &ScannerContext) -> Arc<dyn ScannerProcessor> {
    Arc::new(EthScannerProcessor::new(info, ctx))
}

static SCANNER_REGISTRY: Lazy<HashMap<&'static str, ScannerFactory>> = Lazy::new(|| {
    let mut registry: HashMap<&'static str, ScannerFactory> = HashMap::new();
    registry.insert("USDT", build_usdt);
    registry.insert("XVG", build_xvg);
    registry.insert("ETH", build_eth);
    registry.insert("ETH_ROPSTEN", build_eth);
    registry.insert("ETH_USDT", build_eth);
    registry
});

pub fn registered_codes() -> Vec<&'static str> {
    let mut codes: Vec<_> = SCANNER_REGISTRY.keys().copied().collect();
    codes.sort_unstable();
    codes
}

pub struct ScannerDispatcher {
    ctx: ScannerContext,
    resolved: Mutex<HashMap<String, Arc<dyn ScannerProcessor>>>,
}

impl ScannerDispatcher {
    pub fn new(ctx: ScannerContext) -> Self {
        Self {
            ctx,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// 首次调用时构造，缓存与链高度在实例内保留
    pub fn resolve(&self, currency_code: &str) -> Result<Arc<dyn ScannerProcessor>> {
        let mut resolved = match self.resolved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(scanner) = resolved.get(currency_code) {
            return Ok(scanner.clone());
        }
        let factory = SCANNER_REGISTRY
            .get(currency_code)
            .ok_or_else(|| BlocksoftError::UnsupportedCurrency(currency_code.to_string()))?;
        let scanner = factory(currency::require(currency_code)?, &self.ctx);
        resolved.insert(currency_code.to_string(), scanner.clone());
        Ok(scanner)
    }
}
