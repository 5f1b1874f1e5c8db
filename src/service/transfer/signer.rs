//! 签名能力
//!
//! 处理器只负责组装交易计划并广播；椭圆曲线签名由宿主注入的 TransactionSigner 完成

use async_trait::async_trait;

use crate::{
    domain::transfer_request::SecretKey,
    error::{BlocksoftError, Result},
};

/// 某个输入地址对应的私钥
#[derive(Debug, Clone)]
pub struct SpendKey {
    pub address: String,
    pub private_key: SecretKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoInput {
    pub txid: String,
    pub vout: u32,
    /// 最小单位
    pub value: u64,
    pub address: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutput {
    Pay { address: String, value: u64 },
    /// OP_RETURN 数据（hex，不含操作码）
    OpReturn { data_hex: String },
}

/// UTXO 交易计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSpendPlan {
    pub currency_code: String,
    pub inputs: Vec<UtxoInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    /// 每个输入的 nSequence
    pub sequence: u32,
}

/// 账户模型交易计划（legacy gasPrice 交易）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTxPlan {
    pub currency_code: String,
    pub chain_id: u64,
    pub nonce: u64,
    /// 代币转账时为合约地址
    pub to: String,
    pub value: u128,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// 0x 前缀的 calldata
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw_hex: String,
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_utxo(&self, plan: &UtxoSpendPlan, keys: &[SpendKey]) -> Result<SignedTransaction>;

    async fn sign_account(&self, plan: &AccountTxPlan, key: &SpendKey) -> Result<SignedTransaction>;
}

/// 未注入签名器时的占位实现（只读场景，如 CLI 扫描）
#[derive(Debug, Default)]
pub struct UnavailableSigner;

#[async_trait]
impl TransactionSigner for UnavailableSigner {
    async fn sign_utxo(&self, plan: &UtxoSpendPlan, _keys: &[SpendKey]) -> Result<SignedTransaction> {
        Err(BlocksoftError::configuration(format!(
            "no transaction signer configured for {}",
            plan.currency_code
        )))
    }

    async fn sign_account(&self, plan: &AccountTxPlan, _key: &SpendKey) -> Result<SignedTransaction> {
        Err(BlocksoftError::configuration(format!(
            "no transaction signer configured for {}",
            plan.currency_code
        )))
    }
}
