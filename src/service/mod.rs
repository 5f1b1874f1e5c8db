pub mod blocksoft_transfer;
pub mod double_send_guard;
pub mod mnemonic_cache;
pub mod scanner;
pub mod transfer;

pub use blocksoft_transfer::{BlocksoftTransfer, TransferEnvironment};
pub use double_send_guard::{DoubleSendGuard, GuardTicket, SendRecord};
pub use scanner::{ScannerContext, ScannerDispatcher, ScannerProcessor};
pub use transfer::{ProcessorContext, TransferDispatcher, TransferProcessor};
