pub mod analytics;
pub mod batch;
pub mod config;
pub mod interrupt;
pub mod service;
pub mod signer;
pub mod store;
pub mod watcher;
