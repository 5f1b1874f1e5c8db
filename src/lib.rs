//! blocksoft-core - 多币种钱包的转账分发与链上扫描核心
//!
//! 私钥只在会话内存中存在：助记词由宿主的 SecretStore 提供，签名由 TransactionSigner 完成

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod repository;
pub mod service;
pub mod utils;

pub use error::{BlocksoftError, Result};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{
            BalanceRecord, CanonicalTransaction, Direction, FeeRate, KeyDerivationService,
            SendTxResult, TransferRequest, TxStatus,
        },
        error::{BlocksoftError, Result},
        service::{
            BlocksoftTransfer, ScannerDispatcher, ScannerProcessor, TransferDispatcher,
            TransferEnvironment,
        },
    };
}
