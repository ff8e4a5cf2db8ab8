pub mod api;
pub mod audit;
pub mod authorization;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod presence;
pub mod service;
pub mod storage;
pub mod validation;

pub use error::LedgerError;
