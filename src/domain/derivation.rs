//! 密钥派生服务
//!
//! 从助记词 + 路径 + 币种确定性地得到地址与私钥，不做任何持久化

use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use k256::ecdsa::SigningKey;
use zeroize::Zeroizing;

use crate::domain::currency::{self, AddressEncoding, CurrencyInfo};
use crate::domain::transfer_request::{DualSigningMaterial, SecretKey, SigningMaterial};
use crate::error::{BlocksoftError, Result};

/// 派生结果
#[derive(Debug, Clone)]
pub struct DerivedWallet {
    /// 公钥 (hex 编码)
    pub public_key: String,
    pub address: String,
    pub private_key: SecretKey,
}

/// 地址编码策略
pub trait DerivationStrategy: Send + Sync {
    /// 从种子按路径派生
    fn derive_wallet(&self, seed: &[u8], path: &str, info: &CurrencyInfo)
        -> Result<DerivedWallet>;
}

fn derive_signing_key(seed: &[u8], path: &str) -> Result<SigningKey> {
    use coins_bip32::prelude::*;

    let derivation_path = path
        .parse::<DerivationPath>()
        .map_err(|e| BlocksoftError::configuration(format!("invalid derivation path {}: {}", path, e)))?;

    let master_key = XPriv::root_from_seed(seed, None)
        .map_err(|e| BlocksoftError::configuration(format!("failed to derive master key: {}", e)))?;

    let derived_key = master_key
        .derive_path(&derivation_path)
        .map_err(|e| BlocksoftError::configuration(format!("failed to derive key: {}", e)))?;

    // XPriv 实现 AsRef<SigningKey>
    let signing_key: &SigningKey = derived_key.as_ref();
    Ok(signing_key.clone())
}

/// 路径的 purpose 段，如 `m/84'/0'/0'/0/0` → 84
pub fn path_purpose(path: &str) -> Option<u32> {
    path.split('/')
        .nth(1)
        .and_then(|seg| seg.trim_end_matches(['\'', 'h']).parse().ok())
}

/// 替换路径的 purpose 段，其余保持不变
pub fn with_purpose(path: &str, purpose: u32) -> Result<String> {
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments[0] != "m" {
        return Err(BlocksoftError::configuration(format!(
            "derivation path must start with m/: {}",
            path
        )));
    }
    let replaced = format!("{}'", purpose);
    segments[1] = &replaced;
    Ok(segments.join("/"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bitcoin 策略 (BTC, BTC_TEST, USDT-omni)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BitcoinStrategy;

impl DerivationStrategy for BitcoinStrategy {
    fn derive_wallet(&self, seed: &[u8], path: &str, info: &CurrencyInfo) -> Result<DerivedWallet> {
        use bitcoin::{
            secp256k1::{PublicKey as Secp256k1PublicKey, SecretKey as Secp256k1SecretKey},
            Address, PrivateKey, PublicKey as BitcoinPublicKey,
        };

        let network = match info.encoding {
            AddressEncoding::Bitcoin(network) => network,
            _ => {
                return Err(BlocksoftError::configuration(format!(
                    "{} is not a bitcoin-encoded currency",
                    info.code
                )))
            }
        };

        let signing_key = derive_signing_key(seed, path)?;
        let public_key_bytes = signing_key.verifying_key().to_encoded_point(true); // 压缩格式

        let secp_pubkey = Secp256k1PublicKey::from_slice(public_key_bytes.as_bytes())
            .map_err(|e| BlocksoftError::configuration(format!("invalid secp256k1 public key: {}", e)))?;
        let bitcoin_pubkey = BitcoinPublicKey::new(secp_pubkey);

        let address = match path_purpose(path) {
            Some(84) => Address::p2wpkh(&bitcoin_pubkey, network)
                .map_err(|e| BlocksoftError::configuration(format!("p2wpkh: {}", e)))?,
            Some(49) => Address::p2shwpkh(&bitcoin_pubkey, network)
                .map_err(|e| BlocksoftError::configuration(format!("p2shwpkh: {}", e)))?,
            _ => Address::p2pkh(&bitcoin_pubkey, network),
        };

        let secret = Secp256k1SecretKey::from_slice(&signing_key.to_bytes())
            .map_err(|e| BlocksoftError::configuration(format!("invalid secret key: {}", e)))?;
        let wif = PrivateKey::new(secret, network).to_wif();

        Ok(DerivedWallet {
            public_key: hex::encode(public_key_bytes.as_bytes()),
            address: address.to_string(),
            private_key: SecretKey::new(wif),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Base58Check 策略（自定义版本字节的比特币分叉币，如 XVG）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Base58CheckStrategy;

impl DerivationStrategy for Base58CheckStrategy {
    fn derive_wallet(&self, seed: &[u8], path: &str, info: &CurrencyInfo) -> Result<DerivedWallet> {
        use bitcoin::hashes::{hash160, Hash};

        let version = match info.encoding {
            AddressEncoding::Base58Check { p2pkh_version } => p2pkh_version,
            _ => {
                return Err(BlocksoftError::configuration(format!(
                    "{} is not a base58check currency",
                    info.code
                )))
            }
        };

        let signing_key = derive_signing_key(seed, path)?;
        let public_key_bytes = signing_key.verifying_key().to_encoded_point(true);

        let pubkey_hash = hash160::Hash::hash(public_key_bytes.as_bytes());
        let mut payload = Vec::with_capacity(21);
        payload.push(version);
        payload.extend_from_slice(pubkey_hash.as_byte_array());
        let address = bitcoin::base58::encode_check(&payload);

        // WIF 前缀 = p2pkh 版本 + 0x80，末尾 0x01 表示压缩公钥
        let mut wif = Vec::with_capacity(34);
        wif.push(version.wrapping_add(0x80));
        wif.extend_from_slice(&signing_key.to_bytes());
        wif.push(0x01);

        Ok(DerivedWallet {
            public_key: hex::encode(public_key_bytes.as_bytes()),
            address,
            private_key: SecretKey::new(bitcoin::base58::encode_check(&wif)),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ethereum 策略 (ETH, ERC-20)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EthereumStrategy;

impl DerivationStrategy for EthereumStrategy {
    fn derive_wallet(&self, seed: &[u8], path: &str, _info: &CurrencyInfo) -> Result<DerivedWallet> {
        use sha3::{Digest, Keccak256};

        let signing_key = derive_signing_key(seed, path)?;
        let private_key_bytes = signing_key.to_bytes();

        let public_key_bytes = signing_key.verifying_key().to_encoded_point(false); // 未压缩格式
        let public_key_slice = &public_key_bytes.as_bytes()[1..]; // 去掉 0x04 前缀

        let hash = Keccak256::digest(public_key_slice);
        let address = format!("0x{}", hex::encode(&hash[12..]));

        Ok(DerivedWallet {
            public_key: hex::encode(public_key_slice),
            address,
            private_key: SecretKey::new(format!("0x{}", hex::encode(private_key_bytes))),
        })
    }
}

/// 策略工厂
pub struct DerivationStrategyFactory;

impl DerivationStrategyFactory {
    pub fn create_strategy(encoding: AddressEncoding) -> Box<dyn DerivationStrategy> {
        match encoding {
            AddressEncoding::Bitcoin(_) => Box::new(BitcoinStrategy),
            AddressEncoding::Base58Check { .. } => Box::new(Base58CheckStrategy),
            AddressEncoding::EthHex => Box::new(EthereumStrategy),
        }
    }
}

fn addresses_equal(encoding: AddressEncoding, a: &str, b: &str) -> bool {
    match encoding {
        AddressEncoding::EthHex => a.eq_ignore_ascii_case(b),
        _ => a == b,
    }
}

/// 密钥派生服务（无状态）
#[derive(Debug, Clone, Default)]
pub struct KeyDerivationService;

impl KeyDerivationService {
    pub fn new() -> Self {
        Self
    }

    fn seed(mnemonic: &str, wallet_hash: &str) -> Result<Zeroizing<[u8; 64]>> {
        let mnemonic = Mnemonic::parse_in(Language::English, mnemonic).map_err(|_| {
            BlocksoftError::SecretUnavailable {
                wallet_hash: wallet_hash.to_string(),
            }
        })?;
        Ok(Zeroizing::new(mnemonic.to_seed("")))
    }

    fn derive_with_seed(
        seed: &[u8],
        path: &str,
        info: &CurrencyInfo,
    ) -> Result<SigningMaterial> {
        let wallet = DerivationStrategyFactory::create_strategy(info.encoding)
            .derive_wallet(seed, path, info)?;
        Ok(SigningMaterial {
            address: wallet.address,
            private_key: wallet.private_key,
            derivation_path: path.to_string(),
        })
    }

    /// 派生单个地址的密钥
    ///
    /// `expected_address` 只用于校验：派生结果不一致时返回 PathMismatch
    pub fn derive(
        &self,
        mnemonic: &str,
        path: &str,
        currency_code: &str,
        wallet_hash: &str,
        expected_address: Option<&str>,
    ) -> Result<SigningMaterial> {
        let info = currency::require(currency_code)?;
        let seed = Self::seed(mnemonic, wallet_hash)?;
        let material = Self::derive_with_seed(seed.as_slice(), path, info)?;

        if let Some(expected) = expected_address {
            if !addresses_equal(info.encoding, &material.address, expected) {
                return Err(BlocksoftError::PathMismatch {
                    path: path.to_string(),
                    derived: material.address.clone(),
                    expected: expected.to_string(),
                });
            }
        }

        tracing::debug!(
            currency = %currency_code,
            path = %path,
            address = %material.address,
            "Derived signing material"
        );
        Ok(material)
    }

    /// BTC 系：同一助记词派生 legacy(44') 与 segwit(84') 两套密钥，
    /// 二者之一必须等于 `address_from`
    pub fn derive_utxo_pair(
        &self,
        mnemonic: &str,
        derive_path: &str,
        currency_code: &str,
        wallet_hash: &str,
        address_from: &str,
    ) -> Result<DualSigningMaterial> {
        let info = currency::require(currency_code)?;
        let seed = Self::seed(mnemonic, wallet_hash)?;

        let legacy = Self::derive_with_seed(seed.as_slice(), &with_purpose(derive_path, 44)?, info)?;
        let segwit = Self::derive_with_seed(seed.as_slice(), &with_purpose(derive_path, 84)?, info)?;

        if legacy.address != address_from && segwit.address != address_from {
            return Err(BlocksoftError::AddressMismatch {
                legacy: legacy.address,
                segwit: segwit.address,
                expected: address_from.to_string(),
            });
        }

        Ok(DualSigningMaterial { segwit, legacy })
    }
}
