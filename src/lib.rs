pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod io;
pub mod ledger;

pub use application::{ClientError, LedgerClient};
pub use config::LedgerClientConfig;
pub use domain::*;
