//! Domain 模块
//!
//! 币种注册表、转账构建状态、标准化交易模型与密钥派生

pub mod currency;
pub mod derivation;
pub mod transaction;
pub mod transfer_request;

// 重新导出常用类型
pub use currency::{AddressEncoding, ChainFamily, CurrencyInfo};
pub use derivation::{DerivationStrategy, DerivationStrategyFactory, DerivedWallet, KeyDerivationService};
pub use transaction::{resolve_direction, BalanceRecord, CanonicalTransaction, Direction, TxStatus};
pub use transfer_request::{
    DualSigningMaterial, FeeRate, PrecacheOutcome, SecretKey, SendTxResult, SigningMaterial,
    TransferRequest, TransferWarning, WalletIdentity,
};
