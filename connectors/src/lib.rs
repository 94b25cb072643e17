pub mod bitfinex;
pub mod gdax;
pub mod poloniex;
pub mod retry;
pub mod scanback;
pub mod trader;

mod http;

use async_trait::async_trait;
use common::{
    models::{OrderId, PortfolioEntry, Ticker, Trade},
    Result,
};

pub use retry::RetryPolicy;
pub use scanback::{Delivery, Scanback, ScanbackState, TradePager};
pub use trader::{ExchangeKind, Trader, TradesQuery};

/// Trait defining the interface every exchange implementation provides.
///
/// Calls are made once, retries happen in [`Trader`].
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Display name used in logs
    fn name(&self) -> &str;

    /// All balances, codes uppercased
    async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>>;

    /// Best bid/ask of the configured pair
    async fn get_ticker(&self) -> Result<Ticker>;

    /// Fee as a fraction of the traded amount
    async fn get_fee(&self) -> Result<f64>;

    /// Place a limit buy order
    async fn buy(&self, amount: f64, price: f64) -> Result<OrderId>;

    /// Place a limit sell order
    async fn sell(&self, amount: f64, price: f64) -> Result<OrderId>;

    /// Whether the order is no longer live (filled, rejected or cancelled)
    async fn check_order(&self, order: &OrderId) -> Result<bool>;

    async fn cancel_order(&self, order: &OrderId) -> Result<()>;

    /// The most recent trades the exchange hands out in one call, newest
    /// first. Exchanges that take a start time get `since`.
    async fn recent_trades(&self, since: Option<i64>) -> Result<Vec<Trade>>;

    /// Cursor based paging, for exchanges that only serve history in small
    /// batches
    fn pager(&self) -> Option<&dyn TradePager> {
        None
    }

    /// Most rows [`recent_trades`](Self::recent_trades) returns when asked
    /// for history. A response of exactly this size can't be told apart from
    /// a truncated one.
    fn truncation_limit(&self) -> Option<usize> {
        None
    }
}

/// Limit an amount to the 8 decimals exchanges accept, rounding down
pub(crate) fn truncate_amount(amount: f64) -> f64 {
    (amount * 100_000_000.0).floor() / 100_000_000.0
}
