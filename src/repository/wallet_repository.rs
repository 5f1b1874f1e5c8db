// 钱包数据访问 Repository
//
// 编排器只通过 WalletStore 读取钱包元数据、xpub 与找零地址，
// 具体存储（SQL、移动端本地库）不在本 crate 内

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    domain::{
        derivation::path_purpose,
        transfer_request::{SigningMaterial, WalletIdentity},
    },
    error::Result,
};

// ============ 领域模型 ============

/// HD 钱包的两条路径的扩展公钥
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdXpubs {
    /// m/44' 路径
    pub legacy: String,
    /// m/84' 路径
    pub segwit: String,
}

/// 地址类型，对应 HD 钱包 m/44' 与 m/84' 两条路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Legacy,
    Segwit,
}

impl AddressKind {
    /// 钱包偏好 legacy 时找零走 m/44'
    pub fn for_change(uses_legacy_addresses: bool) -> Self {
        if uses_legacy_addresses {
            Self::Legacy
        } else {
            Self::Segwit
        }
    }

    pub fn of_path(path: &str) -> Self {
        match path_purpose(path) {
            Some(44) => Self::Legacy,
            _ => Self::Segwit,
        }
    }
}

/// 已登记账户（只保存地址与路径，不保存私钥）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub address: String,
    pub kind: AddressKind,
    pub derivation_path: Option<String>,
    pub already_shown: bool,
}

// ============ Repository Trait ============

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// 根据 wallet_hash 查询钱包
    async fn get_wallet_by_hash(&self, wallet_hash: &str) -> Result<Option<WalletIdentity>>;

    /// 读取（必要时生成）HD xpub
    async fn get_or_generate_xpubs(
        &self,
        wallet_hash: &str,
        currency_code: &str,
    ) -> Result<Option<HdXpubs>>;

    /// 指定路径上下一个未展示过的找零地址
    async fn get_account_for_change(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        kind: AddressKind,
    ) -> Result<Option<String>>;

    /// 触发账户发现（在指定路径上生成更多地址）
    async fn discover_more_accounts(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        kind: AddressKind,
    ) -> Result<()>;

    /// 登记由助记词派生出的账户
    async fn insert_account_by_derived_key(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        material: &SigningMaterial,
    ) -> Result<()>;

    /// 批量更新账户展示标记
    async fn mass_update_account_flags(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        addresses: &[String],
        already_shown: bool,
    ) -> Result<()>;
}

// ============ 内存实现 ============

type AccountKey = (String, String);

fn key(wallet_hash: &str, currency_code: &str) -> AccountKey {
    (wallet_hash.to_string(), currency_code.to_string())
}

#[derive(Default)]
struct MemoryState {
    wallets: HashMap<String, WalletIdentity>,
    xpubs: HashMap<AccountKey, HdXpubs>,
    accounts: HashMap<AccountKey, Vec<AccountRecord>>,
    /// discover_more_accounts 时才加入 accounts 的地址
    undiscovered: HashMap<AccountKey, Vec<(String, AddressKind)>>,
    discover_calls: usize,
}

/// 内存版 WalletStore，供嵌入方与测试使用
#[derive(Default)]
pub struct MemoryWalletStore {
    state: RwLock<MemoryState>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_wallet(&self, wallet: WalletIdentity) {
        self.state
            .write()
            .await
            .wallets
            .insert(wallet.wallet_hash.clone(), wallet);
    }

    pub async fn put_xpubs(&self, wallet_hash: &str, currency_code: &str, xpubs: HdXpubs) {
        self.state
            .write()
            .await
            .xpubs
            .insert(key(wallet_hash, currency_code), xpubs);
    }

    pub async fn put_account(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        address: &str,
        kind: AddressKind,
    ) {
        self.state
            .write()
            .await
            .accounts
            .entry(key(wallet_hash, currency_code))
            .or_default()
            .push(AccountRecord {
                address: address.to_string(),
                kind,
                derivation_path: None,
                already_shown: false,
            });
    }

    /// 预置只有账户发现之后才可见的地址
    pub async fn put_undiscovered(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        address: &str,
        kind: AddressKind,
    ) {
        self.state
            .write()
            .await
            .undiscovered
            .entry(key(wallet_hash, currency_code))
            .or_default()
            .push((address.to_string(), kind));
    }

    pub async fn accounts(&self, wallet_hash: &str, currency_code: &str) -> Vec<AccountRecord> {
        self.state
            .read()
            .await
            .accounts
            .get(&key(wallet_hash, currency_code))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn discover_calls(&self) -> usize {
        self.state.read().await.discover_calls
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn get_wallet_by_hash(&self, wallet_hash: &str) -> Result<Option<WalletIdentity>> {
        Ok(self.state.read().await.wallets.get(wallet_hash).cloned())
    }

    async fn get_or_generate_xpubs(
        &self,
        wallet_hash: &str,
        currency_code: &str,
    ) -> Result<Option<HdXpubs>> {
        Ok(self
            .state
            .read()
            .await
            .xpubs
            .get(&key(wallet_hash, currency_code))
            .cloned())
    }

    async fn get_account_for_change(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        kind: AddressKind,
    ) -> Result<Option<String>> {
        Ok(self
            .state
            .read()
            .await
            .accounts
            .get(&key(wallet_hash, currency_code))
            .and_then(|list| list.iter().find(|a| a.kind == kind && !a.already_shown))
            .map(|a| a.address.clone()))
    }

    async fn discover_more_accounts(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        kind: AddressKind,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.discover_calls += 1;
        let k = key(wallet_hash, currency_code);
        let pending = state.undiscovered.remove(&k).unwrap_or_default();
        let (found, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(_, pending)| *pending == kind);
        if !rest.is_empty() {
            state.undiscovered.insert(k.clone(), rest);
        }
        let list = state.accounts.entry(k).or_default();
        list.extend(found.into_iter().map(|(address, kind)| AccountRecord {
            address,
            kind,
            derivation_path: None,
            already_shown: false,
        }));
        Ok(())
    }

    async fn insert_account_by_derived_key(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        material: &SigningMaterial,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let list = state.accounts.entry(key(wallet_hash, currency_code)).or_default();
        if !list.iter().any(|a| a.address == material.address) {
            list.push(AccountRecord {
                address: material.address.clone(),
                kind: AddressKind::of_path(&material.derivation_path),
                derivation_path: Some(material.derivation_path.clone()),
                // 主地址，不作为找零候选
                already_shown: true,
            });
        }
        Ok(())
    }

    async fn mass_update_account_flags(
        &self,
        wallet_hash: &str,
        currency_code: &str,
        addresses: &[String],
        already_shown: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(list) = state.accounts.get_mut(&key(wallet_hash, currency_code)) {
            for account in list.iter_mut().filter(|a| addresses.contains(&a.address)) {
                account.already_shown = already_shown;
            }
        }
        Ok(())
    }
}
