pub mod bundle;
pub mod checker;
pub mod constants;
pub mod delegated_account;
