//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub networks: NetworksConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 提供方 HTTP 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub timeout_ms: u64,
    /// 首次请求之外的重试次数
    pub retries: usize,
    pub backoff_base_ms: u64,
}

/// 成功提交后 nSequence 的推进方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceAdvancePolicy {
    /// 只有网络接受后才推进
    #[default]
    OnSuccess,
    /// 处理器返回非上游错误时也推进
    Always,
}

impl FromStr for SequenceAdvancePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on_success" => Ok(Self::OnSuccess),
            "always" => Ok(Self::Always),
            other => anyhow::bail!("unknown sequence policy: {}", other),
        }
    }
}

/// 转账编排配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub double_send_window_ms: u64,
    pub sequence_policy: SequenceAdvancePolicy,
    pub mnemonic_cache_capacity: usize,
    pub mnemonic_cache_ttl_secs: u64,
}

/// 扫描器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub cache_ttl_ms: u64,
    pub usdt_api_url: String,
    pub xvg_api_url: String,
    /// XVG 富化结果的持久化文件；None 时只保存在内存
    #[serde(default)]
    pub xvg_cache_file: Option<String>,
    pub etherscan_mainnet_url: String,
    pub etherscan_ropsten_url: String,
    #[serde(default)]
    pub etherscan_api_key: Option<String>,
}

/// 链节点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworksConfig {
    /// esplora 兼容 API
    pub btc_api_url: String,
    pub btc_test_api_url: String,
    pub eth_rpc_url: String,
    pub eth_ropsten_rpc_url: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: env_string("LOG_LEVEL", "info"),
            format: env_string("LOG_FORMAT", "text"),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: env_or("PROVIDER_TIMEOUT_MS", 10_000),
            retries: env_or("PROVIDER_RETRIES", 2),
            backoff_base_ms: env_or("PROVIDER_BACKOFF_MS", 50),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            double_send_window_ms: env_or("DOUBLE_SEND_WINDOW_MS", 20_000),
            sequence_policy: env_or("SEQUENCE_POLICY", SequenceAdvancePolicy::OnSuccess),
            mnemonic_cache_capacity: env_or("MNEMONIC_CACHE_CAPACITY", 4),
            mnemonic_cache_ttl_secs: env_or("MNEMONIC_CACHE_TTL_SECS", 300),
        }
    }
}

impl TransferConfig {
    pub fn double_send_window(&self) -> Duration {
        Duration::from_millis(self.double_send_window_ms)
    }

    pub fn mnemonic_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.mnemonic_cache_ttl_secs)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: env_or("SCANNER_CACHE_TTL_MS", 30_000),
            usdt_api_url: env_string("USDT_SCANNER_URL", "https://microscanners.trustee.deals/usdt"),
            xvg_api_url: env_string(
                "XVG_API_URL",
                "https://api.vergecurrency.network/node/api/XVG/mainnet",
            ),
            xvg_cache_file: std::env::var("XVG_CACHE_FILE").ok(),
            etherscan_mainnet_url: env_string("ETHERSCAN_URL", "https://api.etherscan.io/api"),
            etherscan_ropsten_url: env_string(
                "ETHERSCAN_ROPSTEN_URL",
                "https://api-ropsten.etherscan.io/api",
            ),
            etherscan_api_key: std::env::var("ETHERSCAN_API_KEY").ok(),
        }
    }
}

impl ScannerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for NetworksConfig {
    fn default() -> Self {
        Self {
            btc_api_url: env_string("BTC_API_URL", "https://blockstream.info/api"),
            btc_test_api_url: env_string("BTC_TEST_API_URL", "https://blockstream.info/testnet/api"),
            eth_rpc_url: env_string("ETH_RPC_URL", "https://mainnet.infura.io/v3/YOUR_PROJECT_ID"),
            eth_ropsten_rpc_url: env_string(
                "ETH_ROPSTEN_RPC_URL",
                "https://ropsten.infura.io/v3/YOUR_PROJECT_ID",
            ),
        }
    }
}

impl Config {
    /// 从环境变量加载配置（先读取 .env）
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self::default())
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件中出现的段覆盖环境变量）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.provider.timeout_ms == 0 {
            anyhow::bail!("PROVIDER_TIMEOUT_MS must be greater than 0");
        }
        if self.provider.retries > 10 {
            anyhow::bail!("PROVIDER_RETRIES must not exceed 10");
        }

        if self.transfer.double_send_window_ms == 0 {
            anyhow::bail!("DOUBLE_SEND_WINDOW_MS must be greater than 0");
        }
        if self.transfer.mnemonic_cache_capacity == 0 {
            anyhow::bail!("MNEMONIC_CACHE_CAPACITY must be at least 1");
        }

        if self.scanner.cache_ttl_ms == 0 {
            anyhow::bail!("SCANNER_CACHE_TTL_MS must be greater than 0");
        }

        for (name, url) in [
            ("USDT_SCANNER_URL", &self.scanner.usdt_api_url),
            ("XVG_API_URL", &self.scanner.xvg_api_url),
            ("ETHERSCAN_URL", &self.scanner.etherscan_mainnet_url),
            ("ETHERSCAN_ROPSTEN_URL", &self.scanner.etherscan_ropsten_url),
            ("BTC_API_URL", &self.networks.btc_api_url),
            ("BTC_TEST_API_URL", &self.networks.btc_test_api_url),
            ("ETH_RPC_URL", &self.networks.eth_rpc_url),
            ("ETH_ROPSTEN_RPC_URL", &self.networks.eth_ropsten_rpc_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL", name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.scanner.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.transfer.double_send_window(), Duration::from_secs(20));
        assert_eq!(config.transfer.sequence_policy, SequenceAdvancePolicy::OnSuccess);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[provider]
timeout_ms = 5000
retries = 1
backoff_base_ms = 10

[transfer]
double_send_window_ms = 30000
sequence_policy = "always"
mnemonic_cache_capacity = 2
mnemonic_cache_ttl_secs = 60
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.provider.retries, 1);
        assert_eq!(config.transfer.sequence_policy, SequenceAdvancePolicy::Always);
        assert_eq!(config.logging.format, "json");
        // 未出现的段使用默认值
        assert!(config.scanner.xvg_api_url.starts_with("http"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        assert!(config.validate().is_ok());

        config.logging.format = "yaml".into();
        assert!(config.validate().is_err());

        config.logging.format = "text".into();
        config.scanner.usdt_api_url = "ftp://example".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sequence_policy_parse() {
        assert_eq!(
            "Always".parse::<SequenceAdvancePolicy>().unwrap(),
            SequenceAdvancePolicy::Always
        );
        assert!("sometimes".parse::<SequenceAdvancePolicy>().is_err());
    }
}
