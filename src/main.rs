//! blocksoft 命令行
//!
//! - `blocksoft scan <CURRENCY> <ADDRESS>`：输出余额与标准化交易（JSON）
//! - `blocksoft metrics`：输出 Prometheus 文本

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use blocksoft_core::{
    config::Config,
    infrastructure::{logging::init_logging, system_clock, ReqwestTransport},
    repository::{JsonFileEnrichmentStore, MemoryEnrichmentStore, TxEnrichmentStore},
    service::{ScannerContext, ScannerDispatcher},
};

fn usage() -> &'static str {
    "usage: blocksoft scan <CURRENCY> <ADDRESS> | blocksoft metrics"
}

fn load_config() -> Result<Config> {
    let _ = dotenvy::dotenv();
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn scan(config: Config, currency_code: &str, address: &str) -> Result<()> {
    let transport = Arc::new(ReqwestTransport::new(config.provider.timeout())?);
    let enrichment: Arc<dyn TxEnrichmentStore> = match &config.scanner.xvg_cache_file {
        Some(path) => Arc::new(JsonFileEnrichmentStore::new(path)),
        None => Arc::new(MemoryEnrichmentStore::new()),
    };
    let dispatcher = ScannerDispatcher::new(ScannerContext {
        config: Arc::new(config),
        transport,
        clock: system_clock(),
        enrichment,
    });

    let scanner = dispatcher.resolve(currency_code)?;
    let (balance, transactions) = futures::future::join(
        scanner.get_balance(address),
        scanner.get_transactions(address),
    )
    .await;

    let output = serde_json::json!({
        "currency": currency_code,
        "address": address,
        "balance": balance?,
        "transactions": transactions?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.logging)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["scan", currency_code, address] => {
            tracing::info!(currency = %currency_code, "Scan started");
            scan(config, currency_code, address).await?;
            eprint!("{}", blocksoft_core::metrics::render_prometheus());
        }
        ["metrics"] => print!("{}", blocksoft_core::metrics::render_prometheus()),
        _ => bail!(usage()),
    }
    Ok(())
}
