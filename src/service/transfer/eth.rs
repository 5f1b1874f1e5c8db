//! 以太坊转账处理器（原生 ETH 与 ERC-20）
//!
//! 与节点的交互全部走 JSON-RPC；错误信息中出现 infura 视为服务端故障

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    domain::{
        currency::{ChainFamily, CurrencyInfo},
        transfer_request::{FeeRate, PrecacheOutcome, SendTxResult, TransferRequest, TransferWarning},
    },
    error::{BlocksoftError, Result},
    infrastructure::{ProviderClient, ResultCache, SharedClock},
    service::transfer::{
        processor::TransferProcessor,
        signer::{AccountTxPlan, SpendKey, TransactionSigner},
    },
    utils::{amount, AddressValidator},
};

pub const NATIVE_GAS_LIMIT: u64 = 21_000;
pub const TOKEN_GAS_LIMIT: u64 = 100_000;

/// ERC-20 transfer(address,uint256)
const TRANSFER_SELECTOR: &str = "a9059cbb";

/// (文案后缀, 相对节点 gasPrice 的百分比)
const GAS_LEVELS: [(&str, u128); 3] = [("slow", 80), ("medium", 100), ("fast", 150)];

/// JSON-RPC 客户端
#[derive(Clone)]
pub struct EthRpc {
    client: ProviderClient,
    url: String,
}

impl EthRpc {
    pub fn new(client: ProviderClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self.client.post_json(&self.url, &body).await?;

        if let Some(error) = resp.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown rpc error")
                .to_string();
            if message.to_lowercase().contains("infura") {
                return Err(BlocksoftError::upstream(format!("{}: {}", method, message)));
            }
            return Err(BlocksoftError::Rejected(message));
        }

        resp.get("result")
            .cloned()
            .filter(|r| !r.is_null())
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), format!("{} returned no result", method)))
    }

    async fn call_quantity(&self, method: &str, params: Value) -> Result<u128> {
        let result = self.call(method, params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), format!("{} result is not a string", method)))?;
        amount::hex_to_u128(hex)
    }

    pub async fn gas_price(&self) -> Result<u128> {
        self.call_quantity("eth_gasPrice", json!([])).await
    }

    pub async fn balance(&self, address: &str) -> Result<u128> {
        self.call_quantity("eth_getBalance", json!([address, "latest"])).await
    }

    pub async fn pending_nonce(&self, address: &str) -> Result<u64> {
        let nonce = self
            .call_quantity("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        u64::try_from(nonce).map_err(|_| BlocksoftError::malformed(self.client.name(), "nonce overflow"))
    }

    pub async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String> {
        let raw = if raw_hex.starts_with("0x") {
            raw_hex.to_string()
        } else {
            format!("0x{}", raw_hex)
        };
        let result = self.call("eth_sendRawTransaction", json!([raw])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), "tx hash is not a string"))
    }
}

/// transfer(to, amount) 的 calldata
pub fn erc20_transfer_data(to: &str, value: u128) -> String {
    let to = to.trim_start_matches("0x").to_lowercase();
    format!(
        "0x{}{}{}",
        TRANSFER_SELECTOR,
        amount::pad_32_bytes(&to),
        amount::pad_32_bytes(&format!("{:x}", value))
    )
}

pub struct EthProcessor {
    info: &'static CurrencyInfo,
    rpc: EthRpc,
    signer: Arc<dyn TransactionSigner>,
    gas_cache: ResultCache<u128>,
}

impl EthProcessor {
    pub fn new(
        info: &'static CurrencyInfo,
        rpc: EthRpc,
        signer: Arc<dyn TransactionSigner>,
        clock: SharedClock,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            info,
            rpc,
            signer,
            gas_cache: ResultCache::new("eth_gas_price", cache_ttl, clock),
        }
    }

    fn is_token(&self) -> bool {
        self.info.family == ChainFamily::AccountToken
    }

    fn default_gas_limit(&self) -> u64 {
        if self.is_token() {
            TOKEN_GAS_LIMIT
        } else {
            NATIVE_GAS_LIMIT
        }
    }

    async fn node_gas_price(&self) -> Result<u128> {
        if let Some(entry) = self.gas_cache.get_fresh("gas_price") {
            return Ok(entry.payload);
        }
        let price = self.rpc.gas_price().await?;
        self.gas_cache.store("gas_price", price, self.info.code, None);
        Ok(price)
    }

    /// 用户选定的 (gasPrice, gasLimit)，未选定时取 medium 档
    async fn chosen_gas(&self, req: &TransferRequest) -> Result<(u128, u64)> {
        let selected = req.fee_for_tx.as_ref();
        let gas_limit = selected
            .and_then(|f| f.gas_limit)
            .unwrap_or_else(|| self.default_gas_limit());
        if let Some(price) = selected
            .and_then(|f| f.gas_price.as_deref())
            .and_then(|p| p.parse::<u128>().ok())
        {
            return Ok((price, gas_limit));
        }
        Ok((self.node_gas_price().await?, gas_limit))
    }

    fn token_contract(&self) -> Result<&'static str> {
        self.info.token_contract.ok_or_else(|| {
            BlocksoftError::configuration(format!("{} has no token contract", self.info.code))
        })
    }

    fn chain_id(&self) -> Result<u64> {
        self.info
            .chain_id
            .ok_or_else(|| BlocksoftError::configuration(format!("{} has no chain id", self.info.code)))
    }
}

#[async_trait]
impl TransferProcessor for EthProcessor {
    fn currency_code(&self) -> &str {
        self.info.code
    }

    /// 代币转账要求 ETH 余额足够支付 gas
    async fn check_transfer_has_error(&self, req: &TransferRequest) -> Result<Option<TransferWarning>> {
        if !self.is_token() {
            return Ok(None);
        }
        let from = req.require_address_from()?;
        let (gas_price, gas_limit) = self.chosen_gas(req).await?;
        let need = gas_price * gas_limit as u128;
        let have = self.rpc.balance(from).await?;
        if have < need {
            return Ok(Some(TransferWarning {
                code: "not.enough.eth.for.gas".into(),
                message: format!("{} balance {} is below gas cost {}", self.info.fee_currency(), have, need),
            }));
        }
        Ok(None)
    }

    async fn get_fee_rate(&self, _req: &TransferRequest, _is_precount: bool) -> Result<Vec<FeeRate>> {
        let base = self.node_gas_price().await?;
        let gas_limit = self.default_gas_limit();
        Ok(GAS_LEVELS
            .iter()
            .map(|(level, percent)| {
                let gas_price = base * percent / 100;
                FeeRate {
                    lang_msg: format!("eth_speed_{}", level),
                    fee_for_tx: (gas_price * gas_limit as u128).to_string(),
                    tx_size: None,
                    fee_for_byte: None,
                    gas_price: Some(gas_price.to_string()),
                    gas_limit: Some(gas_limit),
                }
            })
            .collect())
    }

    async fn get_transfer_all_balance(&self, req: &TransferRequest, balance_raw: &str) -> Result<String> {
        if self.is_token() {
            return Ok(balance_raw.to_string());
        }
        let balance = match amount::parse_amount(balance_raw) {
            Ok(value) => value,
            Err(_) => self.rpc.balance(req.require_address_from()?).await?,
        };
        let (gas_price, gas_limit) = self.chosen_gas(req).await?;
        Ok(balance
            .saturating_sub(gas_price * gas_limit as u128)
            .to_string())
    }

    async fn get_transfer_precache(&self, _req: &TransferRequest) -> Result<PrecacheOutcome> {
        self.node_gas_price().await?;
        Ok(PrecacheOutcome {
            warmed: vec!["gas_price".into()],
        })
    }

    async fn send_tx(&self, req: &TransferRequest) -> Result<SendTxResult> {
        let from = req.require_address_from()?;
        let to = req.require_address_to()?;
        AddressValidator::validate(self.info.code, to)?;

        let private_key = req
            .private_key
            .clone()
            .ok_or_else(|| BlocksoftError::configuration("privateKey is not resolved"))?;
        let (gas_price, gas_limit) = self.chosen_gas(req).await?;
        let gas_cost = gas_price * gas_limit as u128;

        let mut corrected = None;
        let requested = match req.amount.as_deref() {
            Some(raw) => amount::parse_amount(raw)?,
            None if req.transfer_all => 0,
            None => return Err(BlocksoftError::configuration("amount is not set")),
        };

        let plan = if self.is_token() {
            if requested == 0 {
                return Err(BlocksoftError::InvalidAmount("0".into()));
            }
            AccountTxPlan {
                currency_code: self.info.code.to_string(),
                chain_id: self.chain_id()?,
                nonce: self.rpc.pending_nonce(from).await?,
                to: self.token_contract()?.to_string(),
                value: 0,
                gas_price,
                gas_limit,
                data: Some(erc20_transfer_data(to, requested)),
            }
        } else {
            let value = if req.transfer_all {
                let balance = self.rpc.balance(from).await?;
                let value = balance.checked_sub(gas_cost).filter(|v| *v > 0).ok_or_else(|| {
                    BlocksoftError::InsufficientFunds {
                        have: balance.to_string(),
                        need: gas_cost.to_string(),
                    }
                })?;
                if value != requested {
                    corrected = Some(value.to_string());
                }
                value
            } else {
                requested
            };
            AccountTxPlan {
                currency_code: self.info.code.to_string(),
                chain_id: self.chain_id()?,
                nonce: self.rpc.pending_nonce(from).await?,
                to: to.to_string(),
                value,
                gas_price,
                gas_limit,
                data: None,
            }
        };

        let key = SpendKey {
            address: from.to_string(),
            private_key,
        };
        let signed = self.signer.sign_account(&plan, &key).await?;
        let hash = self.rpc.send_raw_transaction(&signed.raw_hex).await?;

        tracing::info!(
            currency = %self.info.code,
            tx_hash = %hash,
            nonce = plan.nonce,
            gas_price = %plan.gas_price,
            "Account transaction broadcast"
        );
        Ok(SendTxResult {
            hash,
            corrected_amount_from: corrected,
            terminal_sequence: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erc20_transfer_data() {
        let data = erc20_transfer_data("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", 1_000_000);
        assert!(data.starts_with("0xa9059cbb000000000000000000000000"));
        assert!(data.contains("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(data.ends_with("00000000000f4240"));
        assert_eq!(data.len(), 2 + 8 + 64 + 64);
    }
}
