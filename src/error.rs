//! 统一错误定义
//!
//! 调度层、扫描层共用一个错误枚举，UI 只需要按 `code()` 分支

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlocksoftError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlocksoftError {
    /// 调用方编程错误：缺少币种、必填字段未设置等，不重试
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// 助记词 / 私钥不可用
    #[error("secret unavailable for wallet {wallet_hash}")]
    SecretUnavailable { wallet_hash: String },

    /// 派生出的两个地址（legacy/segwit）都不是设置的 addressFrom
    #[error("derived addresses {legacy} / {segwit} do not match {expected}")]
    AddressMismatch {
        legacy: String,
        segwit: String,
        expected: String,
    },

    #[error("path {path} derives {derived}, expected {expected}")]
    PathMismatch {
        path: String,
        derived: String,
        expected: String,
    },

    /// 上游失败统一形态，总是带币种
    #[error("server not responding for {currency_code} ({operation})")]
    ServerNotResponding {
        currency_code: String,
        operation: String,
    },

    #[error("malformed response from {provider}: {detail}")]
    MalformedResponse { provider: String, detail: String },

    #[error("duplicate submission of {currency_code} to {address_to}")]
    DuplicateSubmission {
        currency_code: String,
        address_to: String,
    },

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: String, need: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// 处理器 / ProviderClient 打上的"服务端来源"标记，
    /// 到达调用方之前由编排器改写为 ServerNotResponding
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// 链上节点拒绝交易等其余业务错误，原样透传
    #[error("{0}")]
    Rejected(String),

    /// 持久层（钱包库、扫描缓存文件）读写失败
    #[error("storage error: {0}")]
    Storage(String),
}

impl BlocksoftError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn malformed(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn server_not_responding(currency_code: &str, operation: &str) -> Self {
        Self::ServerNotResponding {
            currency_code: currency_code.to_string(),
            operation: operation.to_string(),
        }
    }

    /// 是否为服务端来源的错误
    pub fn is_server_origin(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::ServerNotResponding { .. })
    }

    /// 可稍后重试
    pub fn is_retryable(&self) -> bool {
        self.is_server_origin()
    }

    /// 稳定的错误码，供 UI 层翻译
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration.error",
            Self::UnsupportedCurrency(_) => "unsupported.currency",
            Self::SecretUnavailable { .. } => "secret.unavailable",
            Self::AddressMismatch { .. } => "address.mismatch",
            Self::PathMismatch { .. } => "path.mismatch",
            Self::ServerNotResponding { .. } => "server.not.responding",
            Self::MalformedResponse { .. } => "malformed.response",
            Self::DuplicateSubmission { .. } => "ui.confirm.double.send",
            Self::InsufficientFunds { .. } => "not.enough.balance",
            Self::InvalidAddress(_) => "invalid.address",
            Self::InvalidAmount(_) => "invalid.amount",
            Self::Upstream(_) => "server.response",
            Self::Rejected(_) => "transfer.rejected",
            Self::Storage(_) => "storage.error",
        }
    }
}
