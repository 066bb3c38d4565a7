pub mod address;
pub mod amount;
pub mod approval;
pub mod balances;
pub mod commands;
pub mod config;
pub mod contracts;
pub mod database;
pub mod error;
pub mod multicall;
pub mod persistence;
pub mod position;
pub mod session;
pub mod store;
pub mod tokens;
pub mod tracker;
pub mod transactions;
pub mod updater;
pub mod user;
