//! Bankwerk - Core Library
//! Concurrent multi-currency banking core with an asynchronous stock order engine

// Public modules
pub mod account;
pub mod core;
pub mod feeds;
pub mod ledger;
pub mod orders;

// Re-exports
pub use core::{Config, Error, Result};
