//! 标准化交易 / 余额记录
//!
//! 各扫描器把不同区块浏览器的返回统一成这里的结构，与币种无关

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Outcome,
    #[serde(rename = "self")]
    SelfTransfer,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Outcome => "outcome",
            Self::SelfTransfer => "self",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// 未上链或确认数为 0
    New,
    /// 已上链，确认数未达阈值
    Confirming,
    /// 确认数达到阈值
    Success,
    /// 链上失败 / 被移除
    Fail,
}

impl TxStatus {
    /// 按确认数推导：`>= blocks_to_confirm` 为 success，`> 0` 为 confirming
    pub fn from_confirmations(confirmations: u64, blocks_to_confirm: u64) -> Self {
        if confirmations >= blocks_to_confirm {
            Self::Success
        } else if confirmations > 0 {
            Self::Confirming
        } else {
            Self::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirming => "confirming",
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 标准化交易，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub transaction_hash: String,
    pub block_hash: Option<String>,
    pub block_number: Option<u64>,
    pub block_time: Option<DateTime<Utc>>,
    pub confirmations: u64,
    pub direction: Direction,
    pub address_from: String,
    pub address_to: String,
    /// 最小单位或提供方给出的十进制文本
    pub amount: String,
    pub fee_amount: Option<String>,
    pub status: TxStatus,
}

/// 方向判定：from、to 都是查询地址（或都无法解析）时为 self，金额归零
///
/// `address_from` / `address_to` 为 None 表示提供方返回了占位符
pub fn resolve_direction(
    queried: &str,
    address_from: Option<&str>,
    address_to: Option<&str>,
    reported: Direction,
) -> Direction {
    let is_self = |a: Option<&str>| a.map(|a| a.eq_ignore_ascii_case(queried));
    match (is_self(address_from), is_self(address_to)) {
        (Some(true), Some(true)) | (None, None) => Direction::SelfTransfer,
        (Some(true), _) => Direction::Outcome,
        (_, Some(true)) => Direction::Income,
        _ => reported,
    }
}

/// 余额记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub balance: String,
    pub unconfirmed: String,
    pub provider: String,
    /// 提供方报告的链高度；无法获得时为 None
    pub scan_block: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}
