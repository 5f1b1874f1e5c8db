pub mod address_validator;
pub mod amount;

pub use address_validator::AddressValidator;
