//! 转账构建状态与密钥材料
//!
//! TransferRequest 只属于一个编排会话；私钥以 SecretKey 保存，Drop 时清零

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// nSequence：无前序交易 / 默认值
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;
/// nSequence：禁用 RBF 但允许 locktime
pub const SEQUENCE_NO_RBF: u32 = 0xffff_fffe;

/// 钱包元数据（由持久层提供，会话内只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub wallet_hash: String,
    pub is_hd_wallet: bool,
    pub uses_unconfirmed_inputs: bool,
    pub uses_legacy_addresses: bool,
}

/// 私钥（hex / WIF 文本），Debug 输出恒为占位符
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 仅在签名时调用
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// 派生结果：地址 + 私钥 + 路径
#[derive(Clone, PartialEq, Eq)]
pub struct SigningMaterial {
    pub address: String,
    pub private_key: SecretKey,
    pub derivation_path: String,
}

impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("address", &self.address)
            .field("private_key", &"***")
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

/// BTC 系一次派生出的两套密钥
#[derive(Debug, Clone)]
pub struct DualSigningMaterial {
    pub segwit: SigningMaterial,
    pub legacy: SigningMaterial,
}

/// 一档手续费估算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRate {
    /// UI 文案 key，如 `btc_speed_fast`
    pub lang_msg: String,
    /// 总手续费（最小单位）
    pub fee_for_tx: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_for_byte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTxResult {
    pub hash: String,
    /// 处理器为凑手续费调整过的实际发送额
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_amount_from: Option<String>,
    /// 处理器声明本次 nSequence 已是终值，不再自增
    #[serde(default)]
    pub terminal_sequence: bool,
}

/// 预检结果：不阻断流程，交给 UI 决定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferWarning {
    pub code: String,
    pub message: String,
}

/// 预热结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheOutcome {
    pub warmed: Vec<String>,
}

/// 转账构建状态
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub currency_code: String,
    pub address_from: Option<String>,
    pub address_from_legacy: Option<String>,
    pub address_from_xpub: Option<String>,
    pub address_from_legacy_xpub: Option<String>,
    pub address_to: Option<String>,
    /// 最小单位整数字符串
    pub amount: Option<String>,
    pub transfer_all: bool,
    pub fee_for_tx: Option<FeeRate>,
    pub memo: Option<String>,
    pub tx_hash: Option<String>,
    pub sequence_number: Option<u32>,
    pub change_address: Option<String>,
    pub change_address_hd: Option<String>,
    pub private_key: Option<SecretKey>,
    pub private_key_legacy: Option<SecretKey>,
    pub additional_data: Option<serde_json::Value>,
    /// None = 尚未从持久层解析
    pub wallet_uses_unconfirmed: Option<bool>,
    pub wallet_uses_legacy: Option<bool>,
}

impl TransferRequest {
    pub fn new(currency_code: impl Into<String>) -> Self {
        Self {
            currency_code: currency_code.into(),
            ..Default::default()
        }
    }

    pub fn require_address_from(&self) -> crate::error::Result<&str> {
        self.address_from
            .as_deref()
            .ok_or_else(|| crate::error::BlocksoftError::configuration("addressFrom is not set"))
    }

    pub fn require_address_to(&self) -> crate::error::Result<&str> {
        self.address_to
            .as_deref()
            .ok_or_else(|| crate::error::BlocksoftError::configuration("addressTo is not set"))
    }

    pub fn uses_unconfirmed_inputs(&self) -> bool {
        self.wallet_uses_unconfirmed.unwrap_or(false)
    }
}

/// nSequence 规则：
/// - None → 0xffffffff
/// - 0xfffffffe / 0xffffffff → 保持当前值
/// - 其他 → prev + 1
pub fn next_sequence(current: Option<u32>, prev: Option<u32>) -> Option<u32> {
    match prev {
        None => Some(SEQUENCE_FINAL),
        Some(SEQUENCE_NO_RBF) | Some(SEQUENCE_FINAL) => current,
        Some(value) => Some(value + 1),
    }
}
