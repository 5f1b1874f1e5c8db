//! 转账编排器
//!
//! 一个 BlocksoftTransfer 就是一次转账会话：调用方用 setter 逐步填充，
//! 再依次调用 get_fee_rate / send_tx。会话不跨线程共享；
//! 重复提交保护与处理器注册表通过 TransferEnvironment 在会话之间共享。

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::{Config, SequenceAdvancePolicy},
    domain::{
        currency,
        derivation::KeyDerivationService,
        transfer_request::{
            next_sequence, FeeRate, PrecacheOutcome, SecretKey, SendTxResult, TransferRequest,
            TransferWarning, WalletIdentity,
        },
    },
    error::{BlocksoftError, Result},
    infrastructure::{
        log_redact::{scrub_secrets, SensitiveRedact},
        SharedClock,
    },
    repository::{AddressKind, SecretStore, WalletStore},
    service::{
        double_send_guard::DoubleSendGuard,
        mnemonic_cache::MnemonicCache,
        transfer::{TransferDispatcher, TransferProcessor},
    },
};

/// BTC_TEST 全部转出估算时使用的占位收款地址
const BTC_TEST_SWEEP_PROBE_ADDRESS: &str = "mjojEgUSi68PqNHoAyjhVkwdqQyLv9dTfV";

/// 会话之间共享的依赖
pub struct TransferEnvironment {
    pub config: Arc<Config>,
    pub dispatcher: Arc<TransferDispatcher>,
    pub wallets: Arc<dyn WalletStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub guard: DoubleSendGuard,
    pub derivation: KeyDerivationService,
    pub clock: SharedClock,
}

impl TransferEnvironment {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<TransferDispatcher>,
        wallets: Arc<dyn WalletStore>,
        secrets: Arc<dyn SecretStore>,
        clock: SharedClock,
    ) -> Self {
        let guard = DoubleSendGuard::new(config.transfer.double_send_window(), clock.clone());
        Self {
            config,
            dispatcher,
            wallets,
            secrets,
            guard,
            derivation: KeyDerivationService::new(),
            clock,
        }
    }
}

pub struct BlocksoftTransfer {
    env: Arc<TransferEnvironment>,
    session_id: Uuid,
    data: TransferRequest,
    wallet_hash: Option<String>,
    derive_path: Option<String>,
    /// None = 尚未从持久层解析
    wallet_is_hd: Option<bool>,
    once_precache: Option<String>,
    mnemonics: MnemonicCache,
}

impl BlocksoftTransfer {
    pub fn new(env: Arc<TransferEnvironment>) -> Self {
        let mnemonics = MnemonicCache::new(
            env.config.transfer.mnemonic_cache_capacity,
            env.config.transfer.mnemonic_cache_ttl(),
            env.clock.clone(),
        );
        Self {
            env,
            session_id: Uuid::new_v4(),
            data: TransferRequest::default(),
            wallet_hash: None,
            derive_path: None,
            wallet_is_hd: None,
            once_precache: None,
            mnemonics,
        }
    }

    pub fn request(&self) -> &TransferRequest {
        &self.data
    }

    pub fn wallet_hash(&self) -> Option<&str> {
        self.wallet_hash.as_deref()
    }

    pub fn derive_path(&self) -> Option<&str> {
        self.derive_path.as_deref()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Setters
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn reset_wallet_flags(&mut self) {
        self.wallet_is_hd = None;
        self.data.wallet_uses_unconfirmed = None;
        self.data.wallet_uses_legacy = None;
    }

    pub fn set_wallet_hash(&mut self, wallet_hash: &str) -> &mut Self {
        if self.wallet_hash.as_deref() != Some(wallet_hash) {
            self.mnemonics.clear();
        }
        self.wallet_hash = Some(wallet_hash.to_string());
        self.reset_wallet_flags();
        self.data.private_key = None;
        self
    }

    /// 直接指定私钥，与 wallet hash 互斥
    pub fn set_private_key(&mut self, private_key: &str) -> &mut Self {
        self.wallet_hash = None;
        self.mnemonics.clear();
        self.reset_wallet_flags();
        self.data.private_key = Some(SecretKey::new(private_key));
        self
    }

    /// 兼容旧格式 `m/44quote/0quote/0quote/0/0`
    pub fn set_derive_path(&mut self, derive_path: &str) -> &mut Self {
        self.derive_path = Some(derive_path.replace("quote", "'"));
        self
    }

    pub fn set_address_from(&mut self, address: &str) -> &mut Self {
        let address = address.trim();
        if self.data.address_from.as_deref() == Some(address)
            || self.data.address_from_legacy.as_deref() == Some(address)
        {
            return self;
        }
        self.data.tx_hash = None;
        self.data.address_from = Some(address.to_string());
        self.data.address_from_legacy = None;
        self.data.address_from_xpub = None;
        self.data.address_from_legacy_xpub = None;
        self.data.change_address_hd = None;
        self
    }

    pub fn set_address_to(&mut self, address: &str) -> &mut Self {
        self.data.address_to = Some(address.trim().to_string());
        self
    }

    /// 最小单位整数字符串
    pub fn set_amount(&mut self, amount: impl Into<String>) -> &mut Self {
        self.data.amount = Some(amount.into());
        self.data.transfer_all = false;
        self
    }

    pub fn set_transfer_all(&mut self, on: bool) -> &mut Self {
        self.data.transfer_all = on;
        if on {
            self.data.amount = None;
        }
        self
    }

    pub fn set_fee(&mut self, fee: FeeRate) -> &mut Self {
        self.data.fee_for_tx = Some(fee);
        self
    }

    pub fn set_memo(&mut self, memo: &str) -> &mut Self {
        self.data.memo = Some(memo.to_string());
        self
    }

    pub fn set_tx_hash(&mut self, tx_hash: &str) -> &mut Self {
        self.data.tx_hash = Some(tx_hash.to_string());
        self
    }

    pub fn set_additional_data(&mut self, data: serde_json::Value) -> &mut Self {
        self.data.additional_data = Some(data);
        self
    }

    /// `prev` 为上一笔交易的 nSequence
    pub fn set_sequence(&mut self, prev: Option<u32>) -> &mut Self {
        self.data.sequence_number = next_sequence(self.data.sequence_number, prev);
        self
    }

    /// 切换币种时清空其余字段；wallet hash 与派生路径保留
    pub fn set_currency_code(&mut self, currency_code: &str) -> &mut Self {
        if self.data.currency_code != currency_code {
            self.data = TransferRequest::new(currency_code);
            self.reset_wallet_flags();
        }
        self
    }

    /// 全部转出估算时替换收款地址（测试网不能向自己估算）
    pub fn address_to_for_transfer_all(&self, address_to: &str) -> String {
        if self.data.currency_code == "BTC_TEST" {
            BTC_TEST_SWEEP_PROBE_ADDRESS.to_string()
        } else {
            address_to.to_string()
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 内部
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn processor(&self) -> Result<Arc<dyn TransferProcessor>> {
        if self.data.currency_code.is_empty() {
            return Err(BlocksoftError::configuration(
                "currency code must be set before calling",
            ));
        }
        self.env.dispatcher.resolve(&self.data.currency_code)
    }

    /// 服务端来源的错误统一改写；其余原样返回
    fn classify(&self, operation: &str, err: BlocksoftError) -> BlocksoftError {
        if err.is_server_origin() {
            tracing::warn!(
                session = %self.session_id,
                currency = %self.data.currency_code,
                operation = %operation,
                "Provider failure"
            );
            BlocksoftError::server_not_responding(&self.data.currency_code, operation)
        } else {
            tracing::error!(
                session = %self.session_id,
                currency = %self.data.currency_code,
                operation = %operation,
                code = err.code(),
                error = %scrub_secrets(&err.to_string()),
                "Transfer operation failed"
            );
            err
        }
    }

    async fn load_mnemonic(&mut self, wallet_hash: &str) -> Result<zeroize::Zeroizing<String>> {
        if let Some(mnemonic) = self.mnemonics.get(wallet_hash) {
            return Ok(mnemonic);
        }
        let mnemonic = self
            .env
            .secrets
            .get_wallet_mnemonic(wallet_hash)
            .await?
            .ok_or_else(|| BlocksoftError::SecretUnavailable {
                wallet_hash: wallet_hash.to_string(),
            })?;
        self.mnemonics.insert(wallet_hash, mnemonic.clone());
        Ok(mnemonic)
    }

    async fn load_wallet(&self, wallet_hash: &str) -> Result<WalletIdentity> {
        self.env
            .wallets
            .get_wallet_by_hash(wallet_hash)
            .await?
            .ok_or_else(|| {
                BlocksoftError::configuration(format!("wallet {} is not registered", wallet_hash))
            })
    }

    /// 从助记词解析私钥及钱包标记；没有 wallet hash 或 addressFrom 时什么都不做
    async fn init_private(&mut self) -> Result<bool> {
        let (wallet_hash, address_from) = match (&self.wallet_hash, &self.data.address_from) {
            (Some(hash), Some(from)) => (hash.clone(), from.clone()),
            _ => return Ok(false),
        };
        let info = currency::require(&self.data.currency_code)?;
        let mnemonic = self.load_mnemonic(&wallet_hash).await?;

        let mut wallet = None;
        if self.data.wallet_uses_unconfirmed.is_none() || self.data.wallet_uses_legacy.is_none() {
            let loaded = self.load_wallet(&wallet_hash).await?;
            self.data.wallet_uses_unconfirmed = Some(loaded.uses_unconfirmed_inputs);
            self.data.wallet_uses_legacy = Some(loaded.uses_legacy_addresses);
            wallet = Some(loaded);
        }

        let derive_path = self
            .derive_path
            .clone()
            .unwrap_or_else(|| info.default_derivation_path());

        if !info.dual_derivation {
            let material = self.env.derivation.derive(
                &mnemonic,
                &derive_path,
                info.code,
                &wallet_hash,
                Some(&address_from),
            )?;
            self.data.private_key = Some(material.private_key);
            tracing::debug!(
                session = %self.session_id,
                currency = %info.code,
                "Private key resolved"
            );
            return Ok(true);
        }

        // BTC 系：legacy + segwit 两套，segwit 为主
        let account_code = info.fee_currency();
        let pair = self.env.derivation.derive_utxo_pair(
            &mnemonic,
            &derive_path,
            info.code,
            &wallet_hash,
            &address_from,
        )?;
        self.env
            .wallets
            .insert_account_by_derived_key(&wallet_hash, account_code, &pair.segwit)
            .await?;

        self.data.address_from = Some(pair.segwit.address.clone());
        self.data.private_key = Some(pair.segwit.private_key.clone());
        self.data.address_from_legacy = Some(pair.legacy.address.clone());
        self.data.private_key_legacy = Some(pair.legacy.private_key.clone());

        if self.wallet_is_hd.is_none() {
            let is_hd = match &wallet {
                Some(w) => w.is_hd_wallet,
                None => self.load_wallet(&wallet_hash).await?.is_hd_wallet,
            };
            self.wallet_is_hd = Some(is_hd);
        }

        if self.wallet_is_hd == Some(true) {
            let xpubs = self
                .env
                .wallets
                .get_or_generate_xpubs(&wallet_hash, account_code)
                .await?;
            let kind = AddressKind::for_change(self.data.wallet_uses_legacy.unwrap_or(false));
            let mut change = self
                .env
                .wallets
                .get_account_for_change(&wallet_hash, account_code, kind)
                .await?;
            if change.is_none() {
                self.env
                    .wallets
                    .discover_more_accounts(&wallet_hash, account_code, kind)
                    .await?;
                change = self
                    .env
                    .wallets
                    .get_account_for_change(&wallet_hash, account_code, kind)
                    .await?;
            }
            if change.is_some() {
                self.data.change_address_hd = change;
            }
            self.data.address_from_xpub = xpubs.as_ref().map(|x| x.segwit.clone());
            self.data.address_from_legacy_xpub = xpubs.map(|x| x.legacy);
        } else {
            self.data.address_from_xpub = None;
            self.data.address_from_legacy_xpub = None;
        }

        tracing::debug!(
            session = %self.session_id,
            currency = %info.code,
            is_hd = ?self.wallet_is_hd,
            uses_legacy = ?self.data.wallet_uses_legacy,
            request = %self.data.redact(),
            "Dual private keys resolved"
        );
        Ok(true)
    }

    fn advance_sequence(&mut self) {
        let current = self.data.sequence_number;
        self.set_sequence(current);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 操作
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 处理器预检，不解析私钥
    pub async fn check_transfer_has_error(&mut self) -> Result<Option<TransferWarning>> {
        let processor = self.processor()?;
        processor
            .check_transfer_has_error(&self.data)
            .await
            .map_err(|e| self.classify("check_transfer_has_error", e))
    }

    pub async fn get_transfer_all_balance(&mut self, balance_raw: &str) -> Result<String> {
        let processor = self.processor()?;
        self.init_private().await?;
        let balance = processor
            .get_transfer_all_balance(&self.data, balance_raw)
            .await
            .map_err(|e| self.classify("get_transfer_all_balance", e))?;
        tracing::debug!(
            session = %self.session_id,
            currency = %self.data.currency_code,
            balance = %balance,
            "Transfer-all balance computed"
        );
        Ok(balance)
    }

    /// 同一 (币种, addressFrom) 只预热一次；已预热时返回 None
    pub async fn get_transfer_precache(&mut self) -> Result<Option<PrecacheOutcome>> {
        let processor = self.processor()?;
        let once_key = format!(
            "{}_{}",
            self.data.currency_code,
            self.data.address_from.as_deref().unwrap_or_default()
        );
        if self.once_precache.as_deref() == Some(once_key.as_str()) {
            return Ok(None);
        }

        self.init_private().await?;
        let outcome = processor
            .get_transfer_precache(&self.data)
            .await
            .map_err(|e| self.classify("get_transfer_precache", e))?;
        self.once_precache = Some(once_key);
        Ok(Some(outcome))
    }

    pub async fn get_fee_rate(&mut self, is_precount: bool) -> Result<Vec<FeeRate>> {
        let processor = self.processor()?;
        self.init_private().await?;
        tracing::debug!(
            session = %self.session_id,
            request = %self.data.redact(),
            is_precount,
            "getFeeRate started"
        );
        processor
            .get_fee_rate(&self.data, is_precount)
            .await
            .map_err(|e| self.classify("get_fee_rate", e))
    }

    /// `ui_error_confirmed`：用户已确认重复提交，跳过保护检查
    pub async fn send_tx(&mut self, ui_error_confirmed: bool) -> Result<SendTxResult> {
        let processor = self.processor()?;
        self.init_private().await?;

        let currency_code = self.data.currency_code.clone();
        let address_to = self.data.require_address_to()?.to_string();
        let amount = self.data.amount.clone().unwrap_or_default();
        let ticket = self
            .env
            .guard
            .reserve(&currency_code, &address_to, &amount, !ui_error_confirmed)?;

        tracing::info!(
            session = %self.session_id,
            request = %self.data.redact(),
            ui_error_confirmed,
            "sendTx started"
        );

        let result = match processor.send_tx(&self.data).await {
            Ok(result) => result,
            Err(e) => {
                drop(ticket);
                crate::metrics::inc_tx_failed(&currency_code);
                if self.env.config.transfer.sequence_policy == SequenceAdvancePolicy::Always
                    && !e.is_server_origin()
                {
                    self.advance_sequence();
                }
                return Err(self.classify("send_tx", e));
            }
        };

        ticket.commit();
        crate::metrics::inc_tx_submitted(&currency_code);

        let info = currency::require(&currency_code)?;
        if info.dual_derivation {
            if let (Some(change), Some(wallet_hash)) =
                (self.data.change_address_hd.clone(), self.wallet_hash.clone())
            {
                let shown = vec![change, address_to.clone()];
                // 交易已广播，这里失败只记录
                if let Err(e) = self
                    .env
                    .wallets
                    .mass_update_account_flags(&wallet_hash, info.fee_currency(), &shown, true)
                    .await
                {
                    tracing::warn!(
                        session = %self.session_id,
                        error = %e,
                        "Failed to mark change address as shown"
                    );
                }
            }
        }

        if !result.terminal_sequence {
            self.advance_sequence();
        }

        tracing::info!(
            session = %self.session_id,
            currency = %currency_code,
            tx_hash = %result.hash,
            corrected_amount = ?result.corrected_amount_from,
            "sendTx finished"
        );
        Ok(result)
    }
}
