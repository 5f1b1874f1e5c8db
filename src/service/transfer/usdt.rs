//! Omni USDT 转账
//!
//! 资金走 BTC UTXO：收款方得到一个粉尘输出，代币数量写在 OP_RETURN 里

use async_trait::async_trait;

use crate::{
    domain::transfer_request::{
        FeeRate, PrecacheOutcome, SendTxResult, TransferRequest, TransferWarning, SEQUENCE_FINAL,
        SEQUENCE_NO_RBF,
    },
    error::{BlocksoftError, Result},
    service::transfer::{
        processor::TransferProcessor,
        signer::TxOutput,
        utxo::{estimate_size, UtxoProcessor, DUST_THRESHOLD},
    },
    utils::{amount, AddressValidator},
};

/// Omni Layer 上 USDT 的 property id
pub const OMNI_USDT_PROPERTY_ID: u32 = 31;

/// "omni" + 版本 0 + simple send + property + 数量
pub fn omni_simple_send_payload(amount: u64) -> String {
    format!(
        "6f6d6e69{:04x}{:04x}{:08x}{:016x}",
        0u16, 0u16, OMNI_USDT_PROPERTY_ID, amount
    )
}

pub struct UsdtProcessor {
    btc: UtxoProcessor,
}

impl UsdtProcessor {
    pub fn new(btc: UtxoProcessor) -> Self {
        Self { btc }
    }

    fn outputs(address_to: &str, token_amount: u64) -> Vec<TxOutput> {
        vec![
            TxOutput::Pay {
                address: address_to.to_string(),
                value: DUST_THRESHOLD,
            },
            TxOutput::OpReturn {
                data_hex: omni_simple_send_payload(token_amount),
            },
        ]
    }

    fn token_amount(req: &TransferRequest) -> Result<u64> {
        let raw = req
            .amount
            .as_deref()
            .ok_or_else(|| BlocksoftError::configuration("amount is not set"))?;
        let value = amount::parse_satoshi(raw)?;
        if value == 0 {
            return Err(BlocksoftError::InvalidAmount(raw.to_string()));
        }
        Ok(value)
    }
}

#[async_trait]
impl TransferProcessor for UsdtProcessor {
    fn currency_code(&self) -> &str {
        self.btc.info().code
    }

    /// BTC 余额不足以支付粉尘输出 + 最低手续费时给出提示
    async fn check_transfer_has_error(&self, req: &TransferRequest) -> Result<Option<TransferWarning>> {
        let utxos = self.btc.spendable(req).await?;
        let total: u64 = utxos.iter().map(|u| u.value).sum();
        let outputs = Self::outputs(req.address_to.as_deref().unwrap_or_default(), 0);
        let minimal_fee = estimate_size(&utxos, &outputs, false);
        let need = DUST_THRESHOLD + minimal_fee;

        if total < need {
            tracing::info!(
                currency = %self.currency_code(),
                btc_balance = total,
                btc_needed = need,
                "Not enough BTC to carry USDT transfer"
            );
            return Ok(Some(TransferWarning {
                code: "not.enough.btc.for.fee".into(),
                message: format!("BTC balance {} is below required {}", total, need),
            }));
        }
        Ok(None)
    }

    async fn get_fee_rate(&self, req: &TransferRequest, is_precount: bool) -> Result<Vec<FeeRate>> {
        let to = req
            .address_to
            .clone()
            .unwrap_or_else(|| req.address_from.clone().unwrap_or_default());
        let token_amount = req
            .amount
            .as_deref()
            .and_then(|a| amount::parse_satoshi(a).ok())
            .unwrap_or(0);
        let outputs = Self::outputs(&to, token_amount);
        self.btc
            .fee_rates_for(req, &outputs, DUST_THRESHOLD, false, is_precount)
            .await
    }

    /// 代币全部转出不影响 BTC 手续费，余额即可转金额
    async fn get_transfer_all_balance(&self, _req: &TransferRequest, balance_raw: &str) -> Result<String> {
        Ok(balance_raw.to_string())
    }

    async fn get_transfer_precache(&self, req: &TransferRequest) -> Result<PrecacheOutcome> {
        self.btc.get_transfer_precache(req).await
    }

    async fn send_tx(&self, req: &TransferRequest) -> Result<SendTxResult> {
        let to = req.require_address_to()?;
        AddressValidator::validate(self.currency_code(), to)?;
        let token_amount = Self::token_amount(req)?;

        let (hash, _) = self
            .btc
            .submit(req, Self::outputs(to, token_amount), DUST_THRESHOLD, false)
            .await?;
        let sequence = req.sequence_number.unwrap_or(SEQUENCE_FINAL);
        Ok(SendTxResult {
            hash,
            corrected_amount_from: None,
            terminal_sequence: sequence >= SEQUENCE_NO_RBF,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_omni_payload_layout() {
        let payload = omni_simple_send_payload(100_000_000);
        assert_eq!(
            payload,
            "6f6d6e69000000000000001f0000000005f5e100"
        );
        assert_eq!(payload.len(), 40);
    }
}
