//! 链相关的转账处理器

pub mod dispatcher;
pub mod eth;
pub mod processor;
pub mod signer;
pub mod usdt;
pub mod utxo;

pub use dispatcher::{ProcessorContext, TransferDispatcher};
pub use processor::TransferProcessor;
pub use signer::{
    AccountTxPlan, SignedTransaction, SpendKey, TransactionSigner, TxOutput, UnavailableSigner,
    UtxoInput, UtxoSpendPlan,
};
