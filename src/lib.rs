pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod event;
pub mod identity;
pub mod ledger;
pub mod list;
pub mod medicine;
pub mod mock;
pub mod service;
pub mod utils;
