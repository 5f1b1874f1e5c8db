//! UTXO 转账处理器（BTC / BTC_TEST / XVG）
//!
//! 币种差异只在数据源：esplora 兼容 API 或 bitcore-node API

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    domain::{
        currency::CurrencyInfo,
        transfer_request::{
            FeeRate, PrecacheOutcome, SendTxResult, TransferRequest, SEQUENCE_FINAL, SEQUENCE_NO_RBF,
        },
    },
    error::{BlocksoftError, Result},
    infrastructure::{ProviderClient, ResultCache, SharedClock},
    service::transfer::{
        processor::TransferProcessor,
        signer::{SpendKey, TransactionSigner, TxOutput, UtxoInput, UtxoSpendPlan},
    },
    utils::{amount, AddressValidator},
};

/// 低于该值的找零直接并入手续费
pub const DUST_THRESHOLD: u64 = 546;

const TX_OVERHEAD_BYTES: u64 = 10;
const LEGACY_INPUT_BYTES: u64 = 148;
const SEGWIT_INPUT_BYTES: u64 = 68;
const PAY_OUTPUT_BYTES: u64 = 34;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 手续费档位
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeLevel {
    Fast,
    Normal,
    Slow,
}

impl FeeLevel {
    pub const ALL: [FeeLevel; 3] = [FeeLevel::Fast, FeeLevel::Normal, FeeLevel::Slow];

    /// 目标确认区块数
    pub fn target_blocks(&self) -> u32 {
        match self {
            Self::Fast => 2,
            Self::Normal => 6,
            Self::Slow => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::Slow => "slow",
        }
    }
}

/// 每字节手续费（最小单位）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeLevels {
    pub fast: u64,
    pub normal: u64,
    pub slow: u64,
}

impl FeeLevels {
    pub fn get(&self, level: FeeLevel) -> u64 {
        match level {
            FeeLevel::Fast => self.fast,
            FeeLevel::Normal => self.normal,
            FeeLevel::Slow => self.slow,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 数据源
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait UtxoBackend: Send + Sync {
    async fn list_unspent(&self, address: &str) -> Result<Vec<UtxoInput>>;

    async fn fee_levels(&self) -> Result<FeeLevels>;

    /// 返回交易哈希
    async fn broadcast(&self, raw_hex: &str) -> Result<String>;
}

/// esplora 兼容 API（blockstream.info / mempool.space）
pub struct EsploraBackend {
    client: ProviderClient,
    base_url: String,
}

#[derive(Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    #[serde(default)]
    status: EsploraStatus,
}

#[derive(Deserialize, Default)]
struct EsploraStatus {
    #[serde(default)]
    confirmed: bool,
}

impl EsploraBackend {
    pub fn new(client: ProviderClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UtxoBackend for EsploraBackend {
    async fn list_unspent(&self, address: &str) -> Result<Vec<UtxoInput>> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let utxos: Vec<EsploraUtxo> = self.client.get_typed(&url).await?;
        Ok(utxos
            .into_iter()
            .map(|u| UtxoInput {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
                address: address.to_string(),
                confirmed: u.status.confirmed,
            })
            .collect())
    }

    async fn fee_levels(&self) -> Result<FeeLevels> {
        let url = format!("{}/fee-estimates", self.base_url);
        let estimates: std::collections::HashMap<String, f64> = self.client.get_typed(&url).await?;

        // 目标区块数没有精确命中时取更快一档的估值
        let rate_for = |blocks: u32| -> Option<u64> {
            let mut keys: Vec<(u32, f64)> = estimates
                .iter()
                .filter_map(|(k, v)| k.parse::<u32>().ok().map(|k| (k, *v)))
                .filter(|(k, _)| *k <= blocks)
                .collect();
            keys.sort_by_key(|(k, _)| *k);
            keys.last().map(|(_, v)| v.ceil().max(1.0) as u64)
        };

        match (
            rate_for(FeeLevel::Fast.target_blocks()),
            rate_for(FeeLevel::Normal.target_blocks()),
            rate_for(FeeLevel::Slow.target_blocks()),
        ) {
            (Some(fast), Some(normal), Some(slow)) => Ok(FeeLevels { fast, normal, slow }),
            _ => Err(BlocksoftError::malformed(
                self.client.name(),
                "fee-estimates missing short targets",
            )),
        }
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String> {
        let url = format!("{}/tx", self.base_url);
        let txid = self.client.post_text(&url, raw_hex).await?;
        Ok(txid.trim().to_string())
    }
}

/// bitcore-node API（XVG）
pub struct BitcoreBackend {
    client: ProviderClient,
    base_url: String,
    decimals: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitcoreCoin {
    mint_txid: String,
    mint_index: u32,
    value: u64,
    #[serde(default)]
    mint_height: i64,
}

impl BitcoreBackend {
    pub fn new(client: ProviderClient, base_url: impl Into<String>, decimals: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            decimals,
        }
    }

    /// feerate 单位为 币/kB
    async fn fee_for(&self, blocks: u32) -> Result<u64> {
        let url = format!("{}/fee/{}", self.base_url, blocks);
        let body = self.client.get_json(&url).await?;
        let per_kb = body
            .get("feerate")
            .and_then(|v| v.as_f64())
            .filter(|v| *v > 0.0)
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), "missing feerate"))?;
        let per_byte = per_kb * 10f64.powi(self.decimals as i32) / 1000.0;
        Ok(per_byte.ceil().max(1.0) as u64)
    }
}

#[async_trait]
impl UtxoBackend for BitcoreBackend {
    async fn list_unspent(&self, address: &str) -> Result<Vec<UtxoInput>> {
        let url = format!("{}/address/{}/?unspent=true", self.base_url, address);
        let coins: Vec<BitcoreCoin> = self.client.get_typed(&url).await?;
        Ok(coins
            .into_iter()
            .map(|c| UtxoInput {
                txid: c.mint_txid,
                vout: c.mint_index,
                value: c.value,
                address: address.to_string(),
                confirmed: c.mint_height > 0,
            })
            .collect())
    }

    async fn fee_levels(&self) -> Result<FeeLevels> {
        Ok(FeeLevels {
            fast: self.fee_for(FeeLevel::Fast.target_blocks()).await?,
            normal: self.fee_for(FeeLevel::Normal.target_blocks()).await?,
            slow: self.fee_for(FeeLevel::Slow.target_blocks()).await?,
        })
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String> {
        let url = format!("{}/tx/send", self.base_url);
        let body = self
            .client
            .post_json(&url, &serde_json::json!({ "rawTx": raw_hex }))
            .await?;
        body.get("txid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| BlocksoftError::malformed(self.client.name(), "broadcast response without txid"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 选币与体积估算
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn is_segwit_address(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    lower.starts_with("bc1") || lower.starts_with("tb1")
}

/// 输出的序列化字节数
fn output_bytes(output: &TxOutput) -> u64 {
    match output {
        TxOutput::Pay { .. } => PAY_OUTPUT_BYTES,
        // value(8) + script len(1) + OP_RETURN(1) + push(1) + data
        TxOutput::OpReturn { data_hex } => 11 + (data_hex.len() as u64) / 2,
    }
}

pub fn estimate_size(inputs: &[UtxoInput], outputs: &[TxOutput], with_change: bool) -> u64 {
    let input_bytes: u64 = inputs
        .iter()
        .map(|i| {
            if is_segwit_address(&i.address) {
                SEGWIT_INPUT_BYTES
            } else {
                LEGACY_INPUT_BYTES
            }
        })
        .sum();
    let output_bytes: u64 = outputs.iter().map(output_bytes).sum();
    let change_bytes = if with_change { PAY_OUTPUT_BYTES } else { 0 };
    TX_OVERHEAD_BYTES + input_bytes + output_bytes + change_bytes
}

/// 选币结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<UtxoInput>,
    pub fee: u64,
    pub change: u64,
    pub size: u64,
}

/// 从大到小累加，直到覆盖 `target + fee`；不足时返回 None
pub fn select_coins(
    utxos: &[UtxoInput],
    outputs: &[TxOutput],
    target: u64,
    fee_per_byte: u64,
) -> Option<Selection> {
    let mut sorted: Vec<UtxoInput> = utxos.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let mut chosen = Vec::new();
    let mut total = 0u64;
    for utxo in sorted {
        total = total.saturating_add(utxo.value);
        chosen.push(utxo);

        let size_with_change = estimate_size(&chosen, outputs, true);
        let fee_with_change = size_with_change.checked_mul(fee_per_byte)?;
        // 金额超出 u64 时不可能被覆盖
        let need_with_change = target.checked_add(fee_with_change)?;
        if total >= need_with_change {
            let change = total - need_with_change;
            if change >= DUST_THRESHOLD {
                return Some(Selection {
                    inputs: chosen,
                    fee: fee_with_change,
                    change,
                    size: size_with_change,
                });
            }
        }

        let size = estimate_size(&chosen, outputs, false);
        let fee = size.checked_mul(fee_per_byte)?;
        if total >= target.checked_add(fee)? {
            // 零头并入手续费
            return Some(Selection {
                fee: total - target,
                inputs: chosen,
                change: 0,
                size,
            });
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 处理器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UtxoProcessor {
    info: &'static CurrencyInfo,
    backend: Arc<dyn UtxoBackend>,
    signer: Arc<dyn TransactionSigner>,
    utxo_cache: ResultCache<Vec<UtxoInput>>,
    fee_cache: ResultCache<FeeLevels>,
}

impl UtxoProcessor {
    pub fn new(
        info: &'static CurrencyInfo,
        backend: Arc<dyn UtxoBackend>,
        signer: Arc<dyn TransactionSigner>,
        clock: SharedClock,
        cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            info,
            backend,
            signer,
            utxo_cache: ResultCache::new("utxo", cache_ttl, clock.clone()),
            fee_cache: ResultCache::new("utxo_fee", cache_ttl, clock),
        }
    }

    pub fn info(&self) -> &'static CurrencyInfo {
        self.info
    }

    fn lang_prefix(&self) -> String {
        self.info.fee_currency().to_lowercase()
    }

    /// 本钱包可花费地址：主地址 + legacy 影子地址
    fn spend_addresses(req: &TransferRequest) -> Result<Vec<String>> {
        let mut addresses = vec![req.require_address_from()?.to_string()];
        if let Some(legacy) = req.address_from_legacy.as_deref() {
            if !addresses.iter().any(|a| a == legacy) {
                addresses.push(legacy.to_string());
            }
        }
        Ok(addresses)
    }

    pub(crate) async fn spendable(&self, req: &TransferRequest) -> Result<Vec<UtxoInput>> {
        let mut all = Vec::new();
        let mut seen = HashSet::new();
        for address in Self::spend_addresses(req)? {
            let utxos = match self.utxo_cache.get_fresh(&address) {
                Some(entry) => entry.payload,
                None => {
                    let fresh = self.backend.list_unspent(&address).await?;
                    self.utxo_cache
                        .store(&address, fresh, self.info.code, None)
                        .into_entry()
                        .payload
                }
            };
            for utxo in utxos {
                if seen.insert((utxo.txid.clone(), utxo.vout)) {
                    all.push(utxo);
                }
            }
        }

        if !req.uses_unconfirmed_inputs() {
            all.retain(|u| u.confirmed);
        }
        Ok(all)
    }

    pub(crate) async fn fee_levels(&self) -> Result<FeeLevels> {
        if let Some(entry) = self.fee_cache.get_fresh("fees") {
            return Ok(entry.payload);
        }
        let levels = self.backend.fee_levels().await?;
        self.fee_cache.store("fees", levels, self.info.code, None);
        Ok(levels)
    }

    /// 用户选定的费率；未选定时取 normal 档
    pub(crate) async fn chosen_fee_per_byte(&self, req: &TransferRequest) -> Result<u64> {
        if let Some(per_byte) = req
            .fee_for_tx
            .as_ref()
            .and_then(|f| f.fee_for_byte.as_deref())
            .and_then(|v| v.parse::<u64>().ok())
        {
            return Ok(per_byte);
        }
        Ok(self.fee_levels().await?.normal)
    }

    fn fee_rate(&self, level: FeeLevel, per_byte: u64, selection: &Selection) -> FeeRate {
        FeeRate {
            lang_msg: format!("{}_speed_{}", self.lang_prefix(), level.as_str()),
            fee_for_tx: selection.fee.to_string(),
            tx_size: Some(selection.size),
            fee_for_byte: Some(per_byte.to_string()),
            gas_price: None,
            gas_limit: None,
        }
    }

    /// 全部转出：所有输入，无找零
    fn sweep(utxos: &[UtxoInput], outputs: &[TxOutput], per_byte: u64) -> Selection {
        let size = estimate_size(utxos, outputs, false);
        Selection {
            inputs: utxos.to_vec(),
            fee: size.saturating_mul(per_byte),
            change: 0,
            size,
        }
    }

    /// 按给定的支付输出计算各档手续费
    pub(crate) async fn fee_rates_for(
        &self,
        req: &TransferRequest,
        outputs: &[TxOutput],
        target: u64,
        sweep: bool,
        is_precount: bool,
    ) -> Result<Vec<FeeRate>> {
        let utxos = self.spendable(req).await?;
        let total: u64 = utxos.iter().map(|u| u.value).sum();
        if utxos.is_empty() {
            if is_precount {
                return Ok(Vec::new());
            }
            return Err(BlocksoftError::InsufficientFunds {
                have: "0".into(),
                need: target.to_string(),
            });
        }

        let levels = self.fee_levels().await?;
        let mut rates = Vec::new();
        for level in FeeLevel::ALL {
            let per_byte = levels.get(level);
            let selection = if sweep {
                Some(Self::sweep(&utxos, outputs, per_byte))
            } else {
                select_coins(&utxos, outputs, target, per_byte)
                    .or_else(|| is_precount.then(|| Self::sweep(&utxos, outputs, per_byte)))
            };
            if let Some(selection) = selection {
                rates.push(self.fee_rate(level, per_byte, &selection));
            }
        }

        if rates.is_empty() {
            return Err(BlocksoftError::InsufficientFunds {
                have: total.to_string(),
                need: target.to_string(),
            });
        }
        Ok(rates)
    }

    fn spend_keys(req: &TransferRequest) -> Result<Vec<SpendKey>> {
        let primary = req
            .private_key
            .clone()
            .ok_or_else(|| BlocksoftError::configuration("privateKey is not resolved"))?;
        let mut keys = vec![SpendKey {
            address: req.require_address_from()?.to_string(),
            private_key: primary,
        }];
        if let (Some(address), Some(key)) = (&req.address_from_legacy, &req.private_key_legacy) {
            keys.push(SpendKey {
                address: address.clone(),
                private_key: key.clone(),
            });
        }
        Ok(keys)
    }

    /// 组装、签名、广播；`outputs` 为收款方输出，找零由这里追加
    pub(crate) async fn submit(
        &self,
        req: &TransferRequest,
        mut outputs: Vec<TxOutput>,
        target: u64,
        sweep: bool,
    ) -> Result<(String, Option<u64>)> {
        let utxos = self.spendable(req).await?;
        let total: u64 = utxos.iter().map(|u| u.value).sum();
        let per_byte = self.chosen_fee_per_byte(req).await?;

        let (selection, corrected) = if sweep {
            let selection = Self::sweep(&utxos, &outputs, per_byte);
            let send_value = total.saturating_sub(selection.fee);
            if send_value < DUST_THRESHOLD {
                return Err(BlocksoftError::InsufficientFunds {
                    have: total.to_string(),
                    need: selection.fee.saturating_add(DUST_THRESHOLD).to_string(),
                });
            }
            // 全部转出时把扣掉手续费后的金额写回支付输出
            if let Some(TxOutput::Pay { value, .. }) = outputs.first_mut() {
                *value = send_value;
            }
            (selection, Some(send_value))
        } else {
            let selection = select_coins(&utxos, &outputs, target, per_byte).ok_or_else(|| {
                BlocksoftError::InsufficientFunds {
                    have: total.to_string(),
                    need: target
                        .saturating_add(estimate_size(&utxos, &outputs, false).saturating_mul(per_byte))
                        .to_string(),
                }
            })?;
            (selection, None)
        };

        if selection.change > 0 {
            let change_address = req
                .change_address_hd
                .clone()
                .or_else(|| req.change_address.clone())
                .unwrap_or(req.require_address_from()?.to_string());
            outputs.push(TxOutput::Pay {
                address: change_address,
                value: selection.change,
            });
        }

        let plan = UtxoSpendPlan {
            currency_code: self.info.code.to_string(),
            inputs: selection.inputs,
            outputs,
            fee: selection.fee,
            sequence: req.sequence_number.unwrap_or(SEQUENCE_FINAL),
        };

        let keys = Self::spend_keys(req)?;
        let signed = self.signer.sign_utxo(&plan, &keys).await?;
        let hash = self.backend.broadcast(&signed.raw_hex).await?;

        for address in Self::spend_addresses(req)? {
            self.utxo_cache.invalidate(&address);
        }

        tracing::info!(
            currency = %self.info.code,
            tx_hash = %hash,
            inputs = plan.inputs.len(),
            fee = plan.fee,
            sequence = plan.sequence,
            "UTXO transaction broadcast"
        );
        Ok((hash, corrected))
    }
}

#[async_trait]
impl TransferProcessor for UtxoProcessor {
    fn currency_code(&self) -> &str {
        self.info.code
    }

    async fn get_fee_rate(&self, req: &TransferRequest, is_precount: bool) -> Result<Vec<FeeRate>> {
        let to = req
            .address_to
            .clone()
            .unwrap_or_else(|| req.address_from.clone().unwrap_or_default());
        let target = match req.amount.as_deref() {
            Some(a) if !req.transfer_all => amount::parse_satoshi(a)?,
            _ => 0,
        };
        let outputs = vec![TxOutput::Pay {
            address: to,
            value: target,
        }];
        self.fee_rates_for(req, &outputs, target, req.transfer_all, is_precount)
            .await
    }

    async fn get_transfer_all_balance(&self, req: &TransferRequest, balance_raw: &str) -> Result<String> {
        let utxos = self.spendable(req).await?;
        if utxos.is_empty() {
            tracing::debug!(currency = %self.info.code, balance_raw = %balance_raw, "No spendable outputs");
            return Ok("0".into());
        }
        let per_byte = self.chosen_fee_per_byte(req).await?;
        let outputs = vec![TxOutput::Pay {
            address: req.address_to.clone().unwrap_or_default(),
            value: 0,
        }];
        let selection = Self::sweep(&utxos, &outputs, per_byte);
        let total: u64 = utxos.iter().map(|u| u.value).sum();
        Ok(total.saturating_sub(selection.fee).to_string())
    }

    async fn get_transfer_precache(&self, req: &TransferRequest) -> Result<PrecacheOutcome> {
        let mut warmed = Vec::new();
        for address in Self::spend_addresses(req)? {
            if self.utxo_cache.get_fresh(&address).is_none() {
                let utxos = self.backend.list_unspent(&address).await?;
                self.utxo_cache.store(&address, utxos, self.info.code, None);
            }
            warmed.push(format!("utxo:{}", address));
        }
        self.fee_levels().await?;
        warmed.push("fees".into());
        Ok(PrecacheOutcome { warmed })
    }

    async fn send_tx(&self, req: &TransferRequest) -> Result<SendTxResult> {
        let to = req.require_address_to()?;
        AddressValidator::validate(self.info.code, to)?;

        let target = if req.transfer_all {
            0
        } else {
            let raw = req
                .amount
                .as_deref()
                .ok_or_else(|| BlocksoftError::configuration("amount is not set"))?;
            let value = amount::parse_satoshi(raw)?;
            if value < DUST_THRESHOLD {
                return Err(BlocksoftError::InvalidAmount(format!(
                    "{} is below dust threshold {}",
                    raw, DUST_THRESHOLD
                )));
            }
            value
        };

        let outputs = vec![TxOutput::Pay {
            address: to.to_string(),
            value: target,
        }];
        let (hash, corrected) = self.submit(req, outputs, target, req.transfer_all).await?;
        let sequence = req.sequence_number.unwrap_or(SEQUENCE_FINAL);
        Ok(SendTxResult {
            hash,
            corrected_amount_from: corrected.map(|v| v.to_string()),
            terminal_sequence: sequence >= SEQUENCE_NO_RBF,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(value: u64, address: &str) -> UtxoInput {
        UtxoInput {
            txid: format!("{:064x}", value),
            vout: 0,
            value,
            address: address.into(),
            confirmed: true,
        }
    }

    fn pay(value: u64) -> Vec<TxOutput> {
        vec![TxOutput::Pay {
            address: "bc1qdest".into(),
            value,
        }]
    }

    #[test]
    fn test_estimate_size_segwit_vs_legacy() {
        let segwit = [utxo(10_000, "bc1qself")];
        let legacy = [utxo(10_000, "1Self")];
        assert_eq!(estimate_size(&segwit, &pay(1), true), 10 + 68 + 34 + 34);
        assert_eq!(estimate_size(&legacy, &pay(1), false), 10 + 148 + 34);
    }

    #[test]
    fn test_select_coins_largest_first_with_change() {
        let utxos = [utxo(5_000, "bc1qself"), utxo(100_000, "bc1qself"), utxo(20_000, "bc1qself")];
        let selection = select_coins(&utxos, &pay(50_000), 50_000, 10).unwrap();
        assert_eq!(selection.inputs.len(), 1);
        assert_eq!(selection.inputs[0].value, 100_000);
        assert_eq!(selection.fee, (10 + 68 + 34 + 34) * 10);
        assert_eq!(selection.change, 100_000 - 50_000 - selection.fee);
    }

    #[test]
    fn test_select_coins_absorbs_dust_change() {
        let utxos = [utxo(51_500, "bc1qself")];
        // 无找零时手续费 (10+68+34)*10 = 1120，剩余 380 < 546
        let selection = select_coins(&utxos, &pay(50_000), 50_000, 10).unwrap();
        assert_eq!(selection.change, 0);
        assert_eq!(selection.fee, 1_500);
    }

    #[test]
    fn test_select_coins_insufficient() {
        let utxos = [utxo(1_000, "bc1qself")];
        assert!(select_coins(&utxos, &pay(50_000), 50_000, 10).is_none());
    }

    #[test]
    fn test_select_coins_amount_near_u64_max() {
        let utxos = [utxo(100_000, "bc1qself"), utxo(u64::MAX, "bc1qself")];
        assert!(select_coins(&utxos, &pay(u64::MAX), u64::MAX, 10).is_none());
        assert!(select_coins(&utxos[..1], &pay(1_000), 1_000, u64::MAX).is_none());
    }

    #[test]
    fn test_op_return_output_size() {
        let outputs = vec![TxOutput::OpReturn {
            data_hex: "00".repeat(20),
        }];
        assert_eq!(output_bytes(&outputs[0]), 31);
    }
}
