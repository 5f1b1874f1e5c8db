//! 转账处理器分发
//!
//! 静态注册表：币种代码 → 处理器构造函数；同一代码在进程内只构造一次

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use once_cell::sync::Lazy;

use crate::{
    config::Config,
    domain::currency::{self, CurrencyInfo},
    error::{BlocksoftError, Result},
    infrastructure::{HttpTransport, ProviderClient, SharedClock},
    service::transfer::{
        eth::{EthProcessor, EthRpc},
        processor::TransferProcessor,
        signer::TransactionSigner,
        usdt::UsdtProcessor,
        utxo::{BitcoreBackend, EsploraBackend, UtxoBackend, UtxoProcessor},
    },
};

/// 构造处理器所需的共享依赖
#[derive(Clone)]
pub struct ProcessorContext {
    pub config: Arc<Config>,
    pub transport: Arc<dyn HttpTransport>,
    pub signer: Arc<dyn TransactionSigner>,
    pub clock: SharedClock,
}

impl ProcessorContext {
    pub fn provider(&self, name: &str) -> ProviderClient {
        ProviderClient::new(name, self.transport.clone(), &self.config.provider)
    }
}

type ProcessorFactory = fn(&'static CurrencyInfo, &ProcessorContext) -> Result<Arc<dyn TransferProcessor>>;

static PROCESSOR_REGISTRY: Lazy<HashMap<&'static str, ProcessorFactory>> = Lazy::new(|| {
    let mut registry: HashMap<&'static str, ProcessorFactory> = HashMap::new();
    registry.insert("BTC", build_utxo);
    registry.insert("BTC_TEST", build_utxo);
    registry.insert("XVG", build_utxo);
    registry.insert("USDT", build_usdt);
    registry.insert("ETH", build_eth);
    registry.insert("ETH_ROPSTEN", build_eth);
    registry.insert("ETH_USDT", build_eth);
    registry
});

fn utxo_backend(code: &str, ctx: &ProcessorContext) -> Result<Arc<dyn UtxoBackend>> {
    let networks = &ctx.config.networks;
    let backend: Arc<dyn UtxoBackend> = match code {
        "BTC" | "USDT" => Arc::new(EsploraBackend::new(
            ctx.provider("esplora_btc"),
            networks.btc_api_url.clone(),
        )),
        "BTC_TEST" => Arc::new(EsploraBackend::new(
            ctx.provider("esplora_btc_test"),
            networks.btc_test_api_url.clone(),
        )),
        "XVG" => {
            let info = currency::require("XVG")?;
            Arc::new(BitcoreBackend::new(
                ctx.provider("bitcore_xvg"),
                ctx.config.scanner.xvg_api_url.clone(),
                info.decimals,
            ))
        }
        other => return Err(BlocksoftError::UnsupportedCurrency(other.to_string())),
    };
    Ok(backend)
}

fn utxo_processor(info: &'static CurrencyInfo, ctx: &ProcessorContext) -> Result<UtxoProcessor> {
    Ok(UtxoProcessor::new(
        info,
        utxo_backend(info.code, ctx)?,
        ctx.signer.clone(),
        ctx.clock.clone(),
        ctx.config.scanner.cache_ttl(),
    ))
}

fn build_utxo(info: &'static CurrencyInfo, ctx: &ProcessorContext) -> Result<Arc<dyn TransferProcessor>> {
    Ok(Arc::new(utxo_processor(info, ctx)?))
}

fn build_usdt(info: &'static CurrencyInfo, ctx: &ProcessorContext) -> Result<Arc<dyn TransferProcessor>> {
    Ok(Arc::new(UsdtProcessor::new(utxo_processor(info, ctx)?)))
}

fn build_eth(info: &'static CurrencyInfo, ctx: &ProcessorContext) -> Result<Arc<dyn TransferProcessor>> {
    let networks = &ctx.config.networks;
    let (name, url) = if info.chain_id == Some(3) {
        ("eth_rpc_ropsten", networks.eth_ropsten_rpc_url.clone())
    } else {
        ("eth_rpc", networks.eth_rpc_url.clone())
    };
    let rpc = EthRpc::new(ctx.provider(name), url);
    Ok(Arc::new(EthProcessor::new(
        info,
        rpc,
        ctx.signer.clone(),
        ctx.clock.clone(),
        ctx.config.scanner.cache_ttl(),
    )))
}

/// 已注册转账处理器的币种
pub fn registered_codes() -> Vec<&'static str> {
    let mut codes: Vec<_> = PROCESSOR_REGISTRY.keys().copied().collect();
    codes.sort_unstable();
    codes
}

pub struct TransferDispatcher {
    ctx: ProcessorContext,
    resolved: Mutex<HashMap<String, Arc<dyn TransferProcessor>>>,
}

impl TransferDispatcher {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self {
            ctx,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ProcessorContext {
        &self.ctx
    }

    /// 首次调用时构造，之后返回同一个实例
    pub fn resolve(&self, currency_code: &str) -> Result<Arc<dyn TransferProcessor>> {
        let mut resolved = match self.resolved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(processor) = resolved.get(currency_code) {
            return Ok(processor.clone());
        }

        let factory = PROCESSOR_REGISTRY
            .get(currency_code)
            .ok_or_else(|| BlocksoftError::UnsupportedCurrency(currency_code.to_string()))?;
        let info = currency::require(currency_code)?;
        let processor = factory(info, &self.ctx)?;

        tracing::debug!(currency = %currency_code, "Transfer processor resolved");
        resolved.insert(currency_code.to_string(), processor.clone());
        Ok(processor)
    }

    /// 预先放入处理器（嵌入方自定义实现或测试替身）
    pub fn register(&self, currency_code: &str, processor: Arc<dyn TransferProcessor>) {
        let mut resolved = match self.resolved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        resolved.insert(currency_code.to_string(), processor);
    }
}
