//! 日志脱敏
//!
//! 私钥、助记词、xpub 不得进入日志；地址只保留首尾

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domain::transfer_request::TransferRequest;

/// 可脱敏trait
pub trait SensitiveRedact {
    fn redact(&self) -> String;
}

/// 脱敏十六进制字符串（显示前缀和后缀）
pub fn redact_hex_string(hex: &str, show_chars: usize) -> String {
    if hex.len() <= show_chars * 2 {
        return "*".repeat(hex.len());
    }

    let prefix = &hex[..show_chars];
    let suffix = &hex[hex.len() - show_chars..];
    format!("{}...{}", prefix, suffix)
}

/// 脱敏地址（显示前6位和后4位）
pub fn redact_address(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return "*".repeat(address.len());
    }

    let prefix = &address[..6];
    let suffix = &address[address.len() - 4..];
    format!("{}...{}", prefix, suffix)
}

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // 64 位 hex 私钥（可带 0x）
        r"\b(0x)?[0-9a-fA-F]{64}\b",
        // WIF 私钥
        r"\b[5KLc9][1-9A-HJ-NP-Za-km-z]{50,51}\b",
        // 扩展公钥 / 私钥
        r"\b[xyzt](pub|prv)[1-9A-HJ-NP-Za-km-z]{100,}\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// 清除自由文本（如上游错误信息）中的疑似密钥
pub fn scrub_secrets(text: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "***").into_owned())
}

#[derive(Debug, Serialize)]
struct RedactedTransferRequest {
    currency_code: String,
    address_from: Option<String>,
    address_to: Option<String>,
    amount: Option<String>,
    transfer_all: bool,
    sequence_number: Option<u32>,
    has_private_key: bool,
    has_legacy_key: bool,
    has_xpub: bool,
}

impl SensitiveRedact for TransferRequest {
    fn redact(&self) -> String {
        serde_json::to_string(&RedactedTransferRequest {
            currency_code: self.currency_code.clone(),
            address_from: self.address_from.as_deref().map(redact_address),
            address_to: self.address_to.as_deref().map(redact_address),
            amount: self.amount.clone(),
            transfer_all: self.transfer_all,
            sequence_number: self.sequence_number,
            has_private_key: self.private_key.is_some(),
            has_legacy_key: self.private_key_legacy.is_some(),
            has_xpub: self.address_from_xpub.is_some(),
        })
        .unwrap_or_else(|_| "{ redacted }".to_string())
    }
}
