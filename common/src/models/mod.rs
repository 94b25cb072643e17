mod config;
mod exchange;
mod market;

pub use config::TraderConfig;
pub use exchange::{ExchangeDescriptor, Market};
pub use market::{OrderId, PortfolioEntry, Side, Ticker, Trade, TradeId};
