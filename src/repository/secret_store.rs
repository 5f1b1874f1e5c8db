// 助记词读取
//
// 实际存储（Keychain / Keystore / HSM）由宿主提供；返回值在 Drop 时清零

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::error::Result;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// 钱包不存在时返回 None
    async fn get_wallet_mnemonic(&self, wallet_hash: &str) -> Result<Option<Zeroizing<String>>>;
}

/// 内存版 SecretStore，记录读取次数便于验证缓存
#[derive(Default)]
pub struct MemorySecretStore {
    mnemonics: RwLock<HashMap<String, Zeroizing<String>>>,
    reads: std::sync::atomic::AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_mnemonic(&self, wallet_hash: &str, mnemonic: &str) {
        self.mnemonics
            .write()
            .await
            .insert(wallet_hash.to_string(), Zeroizing::new(mnemonic.to_string()));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_wallet_mnemonic(&self, wallet_hash: &str) -> Result<Option<Zeroizing<String>>> {
        self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.mnemonics.read().await.get(wallet_hash).cloned())
    }
}
