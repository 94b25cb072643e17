mod config;
mod error;
mod trade_store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use trade_store::{TradeSink, TradeStore};
