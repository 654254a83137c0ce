pub mod chain;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod server;
pub mod state;
pub mod strategy;
