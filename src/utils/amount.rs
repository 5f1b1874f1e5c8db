//! 金额与十六进制数值工具
//!
//! 金额一律以最小单位（satoshi / wei）的十进制字符串流转

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{BlocksoftError, Result};

/// 解析最小单位整数金额
pub fn parse_amount(amount: &str) -> Result<u128> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(BlocksoftError::InvalidAmount(amount.to_string()));
    }
    trimmed
        .parse::<u128>()
        .map_err(|_| BlocksoftError::InvalidAmount(amount.to_string()))
}

/// UTXO 金额必须落在 u64 内
pub fn parse_satoshi(amount: &str) -> Result<u64> {
    let value = parse_amount(amount)?;
    u64::try_from(value).map_err(|_| BlocksoftError::InvalidAmount(amount.to_string()))
}

/// `0x1a` → 26；空串视为 0
pub fn hex_to_u128(hex: &str) -> Result<u128> {
    let trimmed = hex.trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(trimmed, 16)
        .map_err(|e| BlocksoftError::malformed("rpc", format!("invalid hex quantity {}: {}", hex, e)))
}

pub fn u128_to_hex(value: u128) -> String {
    format!("0x{:x}", value)
}

/// 左补零到 32 字节（ABI 编码）
pub fn pad_32_bytes(hex_without_prefix: &str) -> String {
    format!("{:0>64}", hex_without_prefix)
}

/// 十进制币单位 → 最小单位，如 "0.0001" BTC → 10000 sat
pub fn decimal_to_minimal(value: &str, decimals: u32) -> Result<u128> {
    let parsed = Decimal::from_str(value.trim())
        .map_err(|_| BlocksoftError::InvalidAmount(value.to_string()))?;
    if parsed.is_sign_negative() {
        return Err(BlocksoftError::InvalidAmount(value.to_string()));
    }
    let scaled = parsed
        .checked_mul(Decimal::from(10u64.pow(decimals)))
        .ok_or_else(|| BlocksoftError::InvalidAmount(value.to_string()))?;
    scaled
        .round()
        .to_string()
        .parse::<u128>()
        .map_err(|_| BlocksoftError::InvalidAmount(value.to_string()))
}
