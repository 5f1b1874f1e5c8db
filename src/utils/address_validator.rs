//! 地址验证模块
//!
//! 按币种的地址编码校验收款地址

use std::str::FromStr;

use crate::{
    domain::currency::{self, AddressEncoding},
    error::{BlocksoftError, Result},
};

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 验证地址格式
    ///
    /// # 返回
    /// - Ok(()): 地址有效
    /// - Err(InvalidAddress): 地址无效
    /// - Err(UnsupportedCurrency): 未注册的币种
    pub fn validate(currency_code: &str, address: &str) -> Result<()> {
        let info = currency::require(currency_code)?;
        let valid = match info.encoding {
            AddressEncoding::Bitcoin(network) => Self::is_bitcoin_address(address, network),
            AddressEncoding::Base58Check { p2pkh_version } => {
                Self::is_base58check_address(address, p2pkh_version)
            }
            AddressEncoding::EthHex => Self::is_evm_address(address),
        };
        if valid {
            Ok(())
        } else {
            Err(BlocksoftError::InvalidAddress(format!(
                "{} is not a valid {} address",
                address, currency_code
            )))
        }
    }

    /// P2PKH / P2SH / Bech32，且网络匹配
    fn is_bitcoin_address(address: &str, network: bitcoin::Network) -> bool {
        bitcoin::Address::from_str(address)
            .ok()
            .and_then(|a| a.require_network(network).ok())
            .is_some()
    }

    /// 版本字节 + 20 字节 hash160 + 校验和
    fn is_base58check_address(address: &str, version: u8) -> bool {
        match bitcoin::base58::decode_check(address) {
            Ok(decoded) => decoded.len() == 21 && decoded[0] == version,
            Err(_) => false,
        }
    }

    /// 验证EVM地址（支持EIP-55 Checksum）
    fn is_evm_address(address: &str) -> bool {
        if !address.starts_with("0x") || address.len() != 42 {
            return false;
        }

        let hex_part = &address[2..];
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        // 混合大小写时才校验 checksum
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return Self::verify_eip55_checksum(hex_part);
        }

        true
    }

    /// https://eips.ethereum.org/EIPS/eip-55
    fn verify_eip55_checksum(hex_part: &str) -> bool {
        use sha3::{Digest, Keccak256};

        let hash = Keccak256::digest(hex_part.to_lowercase().as_bytes());

        hex_part.chars().enumerate().all(|(i, ch)| {
            if !ch.is_ascii_alphabetic() {
                return true;
            }
            let hash_byte = hash[i / 2];
            let hash_nibble = if i % 2 == 0 {
                hash_byte >> 4
            } else {
                hash_byte & 0x0f
            };
            ch.is_ascii_uppercase() == (hash_nibble >= 8)
        })
    }
}
