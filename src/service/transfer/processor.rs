//! 转账处理器接口
//!
//! 每个币种一个实现；处理器把服务端来源的失败标记为 `Upstream`，
//! 由编排器统一改写

use async_trait::async_trait;

use crate::{
    domain::transfer_request::{FeeRate, PrecacheOutcome, SendTxResult, TransferRequest, TransferWarning},
    error::Result,
};

#[async_trait]
pub trait TransferProcessor: Send + Sync {
    fn currency_code(&self) -> &str;

    /// 发送前预检（如代币转账时手续费币余额不足），默认无警告
    async fn check_transfer_has_error(&self, _req: &TransferRequest) -> Result<Option<TransferWarning>> {
        Ok(None)
    }

    /// 各档手续费；`is_precount` 时允许在金额未定的情况下粗估
    async fn get_fee_rate(&self, req: &TransferRequest, is_precount: bool) -> Result<Vec<FeeRate>>;

    /// 全部转出时实际可发送的金额（最小单位）
    async fn get_transfer_all_balance(&self, req: &TransferRequest, balance_raw: &str) -> Result<String>;

    /// 预热 UTXO / nonce / gas 等网络数据
    async fn get_transfer_precache(&self, req: &TransferRequest) -> Result<PrecacheOutcome>;

    /// 组装、签名并广播
    async fn send_tx(&self, req: &TransferRequest) -> Result<SendTxResult>;
}
