// Repository 抽象层：钱包元数据、助记词、扫描缓存

pub mod scan_cache_repository;
pub mod secret_store;
pub mod wallet_repository;

pub use scan_cache_repository::{JsonFileEnrichmentStore, MemoryEnrichmentStore, TxEnrichmentStore};
pub use secret_store::{MemorySecretStore, SecretStore};
pub use wallet_repository::{AccountRecord, AddressKind, HdXpubs, MemoryWalletStore, WalletStore};
