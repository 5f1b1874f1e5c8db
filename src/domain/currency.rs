//! 币种注册表
//!
//! 所有受支持币种的静态配置：链族、地址编码、确认阈值、派生参数

use std::collections::HashMap;

use bitcoin::Network;
use once_cell::sync::Lazy;

use crate::error::{BlocksoftError, Result};

/// 链族，决定使用哪类转账处理器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    /// UTXO 模型 (BTC, BTC_TEST, XVG)
    Utxo,
    /// 搭载在 BTC UTXO 链上的 omni 代币 (USDT)
    OmniOverUtxo,
    /// 账户模型原生币 (ETH)
    Account,
    /// 账户模型上的 ERC-20 代币
    AccountToken,
}

impl ChainFamily {
    pub fn is_utxo(&self) -> bool {
        matches!(self, Self::Utxo | Self::OmniOverUtxo)
    }
}

/// 地址编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEncoding {
    /// 由路径 purpose 决定 P2PKH (44') 还是 P2WPKH (84')
    Bitcoin(Network),
    /// 自定义版本字节的 Base58Check P2PKH（比特币分叉币）
    Base58Check { p2pkh_version: u8 },
    /// 0x + keccak256(pubkey)[12..]
    EthHex,
}

#[derive(Debug, Clone)]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub family: ChainFamily,
    pub encoding: AddressEncoding,
    /// BIP44 coin type
    pub coin_type: u32,
    pub decimals: u32,
    /// 确认阈值：超过该确认数视为 success
    pub blocks_to_confirm: u64,
    /// ERC-20 合约地址
    pub token_contract: Option<&'static str>,
    /// EIP-155 chain id，仅账户模型
    pub chain_id: Option<u64>,
    /// 同一助记词同时派生 legacy(44') 与 segwit(84') 两套地址
    pub dual_derivation: bool,
}

impl CurrencyInfo {
    /// 默认派生路径（账户 0，外部链，索引 0）
    pub fn default_derivation_path(&self) -> String {
        let purpose = if self.dual_derivation { 84 } else { 44 };
        format!("m/{}'/{}'/0'/0/0", purpose, self.coin_type)
    }

    /// 手续费 / gas 结算所用的币种
    pub fn fee_currency(&self) -> &'static str {
        match self.family {
            ChainFamily::OmniOverUtxo => "BTC",
            ChainFamily::AccountToken => {
                if self.chain_id == Some(3) {
                    "ETH_ROPSTEN"
                } else {
                    "ETH"
                }
            }
            _ => self.code,
        }
    }
}

static CURRENCY_REGISTRY: Lazy<HashMap<&'static str, CurrencyInfo>> = Lazy::new(|| {
    let currencies = vec![
        CurrencyInfo {
            code: "BTC",
            name: "Bitcoin",
            family: ChainFamily::Utxo,
            encoding: AddressEncoding::Bitcoin(Network::Bitcoin),
            coin_type: 0,
            decimals: 8,
            blocks_to_confirm: 1,
            token_contract: None,
            chain_id: None,
            dual_derivation: true,
        },
        CurrencyInfo {
            code: "BTC_TEST",
            name: "Bitcoin Testnet",
            family: ChainFamily::Utxo,
            encoding: AddressEncoding::Bitcoin(Network::Testnet),
            coin_type: 1,
            decimals: 8,
            blocks_to_confirm: 1,
            token_contract: None,
            chain_id: None,
            dual_derivation: false,
        },
        CurrencyInfo {
            code: "USDT",
            name: "Tether (Omni)",
            family: ChainFamily::OmniOverUtxo,
            encoding: AddressEncoding::Bitcoin(Network::Bitcoin),
            coin_type: 0,
            decimals: 8,
            blocks_to_confirm: 1,
            token_contract: None,
            chain_id: None,
            dual_derivation: true,
        },
        CurrencyInfo {
            code: "XVG",
            name: "Verge",
            family: ChainFamily::Utxo,
            encoding: AddressEncoding::Base58Check { p2pkh_version: 0x1e },
            coin_type: 77,
            decimals: 6,
            blocks_to_confirm: 20,
            token_contract: None,
            chain_id: None,
            dual_derivation: false,
        },
        CurrencyInfo {
            code: "ETH",
            name: "Ethereum",
            family: ChainFamily::Account,
            encoding: AddressEncoding::EthHex,
            coin_type: 60,
            decimals: 18,
            blocks_to_confirm: 12,
            token_contract: None,
            chain_id: Some(1),
            dual_derivation: false,
        },
        CurrencyInfo {
            code: "ETH_ROPSTEN",
            name: "Ethereum Ropsten",
            family: ChainFamily::Account,
            encoding: AddressEncoding::EthHex,
            coin_type: 60,
            decimals: 18,
            blocks_to_confirm: 12,
            token_contract: None,
            chain_id: Some(3),
            dual_derivation: false,
        },
        CurrencyInfo {
            code: "ETH_USDT",
            name: "Tether (ERC-20)",
            family: ChainFamily::AccountToken,
            encoding: AddressEncoding::EthHex,
            coin_type: 60,
            decimals: 6,
            blocks_to_confirm: 12,
            token_contract: Some("0xdac17f958d2ee523a2206206994597c13d831ec7"),
            chain_id: Some(1),
            dual_derivation: false,
        },
    ];

    currencies.into_iter().map(|c| (c.code, c)).collect()
});

/// 查找币种配置
pub fn lookup(currency_code: &str) -> Option<&'static CurrencyInfo> {
    CURRENCY_REGISTRY.get(currency_code)
}

/// 查找币种配置，不存在时返回 UnsupportedCurrency
pub fn require(currency_code: &str) -> Result<&'static CurrencyInfo> {
    lookup(currency_code)
        .ok_or_else(|| BlocksoftError::UnsupportedCurrency(currency_code.to_string()))
}
