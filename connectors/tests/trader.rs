use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::{
    models::{OrderId, PortfolioEntry, Ticker, Trade, TradeId, TraderConfig},
    Error, Registry, Result,
};
use connectors::{ExchangeAdapter, RetryPolicy, TradePager, Trader, TradesQuery};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const START: i64 = 1_500_000_000;

/// Counters shared between a test and the exchange it handed to the trader
#[derive(Default)]
struct Calls {
    pages: AtomicUsize,
    recent: AtomicUsize,
    orders: AtomicUsize,
    cancels: AtomicUsize,
}

/// In memory exchange with trades 1..=count, one every 10 seconds.
struct FakeExchange {
    trades: Vec<Trade>,
    batch: usize,
    paginated: bool,
    truncation_limit: Option<usize>,
    /// 1-based page fetch that fails once with a transient error
    fail_page: Option<usize>,
    cancel_error: Option<fn() -> Error>,
    calls: Arc<Calls>,
}

impl FakeExchange {
    fn new(count: u64, calls: Arc<Calls>) -> Self {
        Self {
            trades: (1..=count)
                .map(|tid| Trade {
                    tid,
                    date: date_of(tid),
                    price: 100.0 + tid as f64,
                    amount: 0.25,
                })
                .collect(),
            batch: 100,
            paginated: true,
            truncation_limit: None,
            fail_page: None,
            cancel_error: None,
            calls,
        }
    }

    fn unpaginated(mut self) -> Self {
        self.paginated = false;
        self
    }
}

fn date_of(tid: TradeId) -> i64 {
    START + tid as i64 * 10
}

fn quick() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(1), None)
}

fn trader(exchange: FakeExchange) -> Trader {
    Trader::new(Box::new(exchange), quick(), true)
}

#[async_trait]
impl TradePager for FakeExchange {
    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn fetch_page(&self, after: Option<TradeId>, limit: usize) -> Result<Vec<Trade>> {
        let call = self.calls.pages.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_page == Some(call) {
            return Err(Error::ExchangeError("502 Bad Gateway".to_string()));
        }
        Ok(self
            .trades
            .iter()
            .rev()
            .filter(|t| after.map_or(true, |a| t.tid < a))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExchangeAdapter for FakeExchange {
    fn name(&self) -> &str {
        "Fake"
    }

    async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        Ok(vec![PortfolioEntry {
            name: "BTC".to_string(),
            amount: 1.0,
        }])
    }

    async fn get_ticker(&self) -> Result<Ticker> {
        Ok(Ticker { bid: 99.0, ask: 101.0 })
    }

    async fn get_fee(&self) -> Result<f64> {
        Ok(0.0025)
    }

    async fn buy(&self, _amount: f64, _price: f64) -> Result<OrderId> {
        self.calls.orders.fetch_add(1, Ordering::SeqCst);
        Ok(OrderId::new("buy-1"))
    }

    async fn sell(&self, _amount: f64, _price: f64) -> Result<OrderId> {
        self.calls.orders.fetch_add(1, Ordering::SeqCst);
        Ok(OrderId::new("sell-1"))
    }

    async fn check_order(&self, _order: &OrderId) -> Result<bool> {
        self.calls.orders.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn cancel_order(&self, _order: &OrderId) -> Result<()> {
        self.calls.cancels.fetch_add(1, Ordering::SeqCst);
        match self.cancel_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn recent_trades(&self, since: Option<i64>) -> Result<Vec<Trade>> {
        self.calls.recent.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .trades
            .iter()
            .rev()
            .filter(|t| since.map_or(true, |s| t.date >= s))
            .take(self.truncation_limit.unwrap_or(self.batch))
            .cloned()
            .collect())
    }

    fn pager(&self) -> Option<&dyn TradePager> {
        if self.paginated {
            Some(self)
        } else {
            None
        }
    }

    fn truncation_limit(&self) -> Option<usize> {
        self.truncation_limit
    }
}

fn already_done() -> Error {
    Error::Rejected("Order already done".to_string())
}

fn unavailable() -> Error {
    Error::ExchangeError("503 Service Unavailable".to_string())
}

fn since(tid: TradeId) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(date_of(tid), 0).unwrap()
}

#[tokio::test]
async fn history_is_sorted_and_reaches_the_newest_trade() {
    let calls = Arc::new(Calls::default());
    let mut trader = trader(FakeExchange::new(1_000, calls.clone()));

    let trades = trader.get_trades(TradesQuery::since(since(420))).await.unwrap();

    assert!(trades.windows(2).all(|w| w[0].tid < w[1].tid));
    assert!(trades.first().map_or(false, |t| t.tid <= 420));
    assert_eq!(trades.last().map(|t| t.tid), Some(1_000));
}

#[tokio::test]
async fn failure_mid_scan_restarts_with_the_same_result() {
    let calls = Arc::new(Calls::default());
    let mut baseline = trader(FakeExchange::new(1_000, calls.clone()));
    let expected = baseline.get_trades(TradesQuery::since(since(250))).await.unwrap();
    let clean_run = calls.pages.load(Ordering::SeqCst);
    assert!(clean_run > 3);

    for fail_at in [1, 3, clean_run] {
        let calls = Arc::new(Calls::default());
        let mut exchange = FakeExchange::new(1_000, calls.clone());
        exchange.fail_page = Some(fail_at);
        let mut trader = trader(exchange);

        let trades = trader.get_trades(TradesQuery::since(since(250))).await.unwrap();

        assert_eq!(trades, expected, "failing page {}", fail_at);
        assert_eq!(calls.pages.load(Ordering::SeqCst), clean_run + fail_at);
    }
}

#[tokio::test]
async fn descending_reverses_the_order() {
    let calls = Arc::new(Calls::default());
    let mut trader = trader(FakeExchange::new(1_000, calls.clone()).unpaginated());

    let trades = trader
        .get_trades(TradesQuery::recent().descending())
        .await
        .unwrap();

    assert_eq!(trades.len(), 100);
    assert_eq!(trades.first().map(|t| t.tid), Some(1_000));
    assert!(trades.windows(2).all(|w| w[0].date > w[1].date));
    assert_eq!(calls.pages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn recent_trades_skip_the_scan_even_when_paginated() {
    let calls = Arc::new(Calls::default());
    let mut trader = trader(FakeExchange::new(1_000, calls.clone()));

    let trades = trader.get_trades(TradesQuery::recent()).await.unwrap();

    assert_eq!(trades.len(), 100);
    assert_eq!(calls.recent.load(Ordering::SeqCst), 1);
    assert_eq!(calls.pages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn truncated_history_is_not_retried() {
    let calls = Arc::new(Calls::default());
    let mut exchange = FakeExchange::new(1_000, calls.clone()).unpaginated();
    exchange.truncation_limit = Some(50);
    let mut trader = trader(exchange);

    let result = trader.get_trades(TradesQuery::since(since(100))).await;

    assert!(matches!(result, Err(Error::InsufficientData(_))));
    assert_eq!(calls.recent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn import_pages_add_up_to_the_full_history() {
    let calls = Arc::new(Calls::default());
    let expected = trader(FakeExchange::new(1_000, calls.clone()))
        .get_trades(TradesQuery::since(since(333)))
        .await
        .unwrap();

    let mut trader = trader(FakeExchange::new(1_000, Arc::new(Calls::default())));
    let mut imported = Vec::new();
    loop {
        let page = trader.get_trades(TradesQuery::import(since(333))).await.unwrap();
        if page.is_empty() {
            break;
        }
        imported.extend(page);
    }

    assert_eq!(imported, expected);
}

async fn import_all(trader: &mut Trader, from: TradeId) -> Vec<Trade> {
    let mut imported = Vec::new();
    loop {
        let page = trader.get_trades(TradesQuery::import(since(from))).await.unwrap();
        if page.is_empty() {
            return imported;
        }
        imported.extend(page);
    }
}

#[tokio::test]
async fn import_failure_while_walking_forward_keeps_the_cursor() {
    let expected = trader(FakeExchange::new(1_000, Arc::new(Calls::default())))
        .get_trades(TradesQuery::since(since(333)))
        .await
        .unwrap();
    let calls = Arc::new(Calls::default());
    import_all(&mut trader(FakeExchange::new(1_000, calls.clone())), 333).await;
    let clean_run = calls.pages.load(Ordering::SeqCst);

    // four pages back reach trade 333, everything after walks forward
    for fail_at in [6, 8, clean_run] {
        let calls = Arc::new(Calls::default());
        let mut exchange = FakeExchange::new(1_000, calls.clone());
        exchange.fail_page = Some(fail_at);
        let mut trader = trader(exchange);

        let imported = import_all(&mut trader, 333).await;

        let mut tids: Vec<TradeId> = imported.iter().map(|t| t.tid).collect();
        tids.dedup();
        assert_eq!(tids.len(), imported.len(), "failing page {}", fail_at);
        assert_eq!(imported, expected, "failing page {}", fail_at);
        assert_eq!(calls.pages.load(Ordering::SeqCst), clean_run + 1);
    }
}

#[tokio::test]
async fn check_order_without_an_id_never_calls_the_exchange() {
    let calls = Arc::new(Calls::default());
    let trader = trader(FakeExchange::new(10, calls.clone()));

    assert!(matches!(trader.check_order(None).await, Err(Error::EmptyOrderId)));
    let empty = OrderId::new("");
    assert!(matches!(
        trader.check_order(Some(&empty)).await,
        Err(Error::EmptyOrderId)
    ));
    assert_eq!(calls.orders.load(Ordering::SeqCst), 0);

    let placed = trader.buy(0.1, 100.0).await.unwrap();
    assert!(trader.check_order(Some(&placed)).await.unwrap());
}

#[tokio::test]
async fn orders_are_refused_when_trading_is_disabled() {
    let calls = Arc::new(Calls::default());
    let trader = Trader::new(Box::new(FakeExchange::new(10, calls.clone())), quick(), false);

    assert!(matches!(trader.sell(1.0, 100.0).await, Err(Error::ConfigError(_))));
    assert_eq!(calls.orders.load(Ordering::SeqCst), 0);
    assert_eq!(trader.get_ticker().await.unwrap().ask, 101.0);
}

#[tokio::test]
async fn cancel_failures_are_swallowed() {
    let calls = Arc::new(Calls::default());
    let mut exchange = FakeExchange::new(10, calls.clone());
    exchange.cancel_error = Some(already_done);
    let trader = trader(exchange);

    trader.cancel_order(Some(&OrderId::new("abc"))).await;
    trader.cancel_order(None).await;

    assert_eq!(calls.cancels.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_cancel_failures_give_up_after_the_bound() {
    let calls = Arc::new(Calls::default());
    let mut exchange = FakeExchange::new(10, calls.clone());
    exchange.cancel_error = Some(unavailable);
    let trader = Trader::new(
        Box::new(exchange),
        RetryPolicy::new(Duration::from_millis(1), Some(2)),
        true,
    );

    trader.cancel_order(Some(&OrderId::new("abc"))).await;

    assert_eq!(calls.cancels.load(Ordering::SeqCst), 2);
}

#[test]
fn invalid_configs_build_no_trader() {
    let registry = Registry::builtin();

    let unknown = TraderConfig::new("mtgox", "USD", "BTC");
    assert!(matches!(
        Trader::from_config(&unknown, registry, quick()),
        Err(Error::ConfigError(msg)) if msg.contains("mtgox")
    ));

    let mut missing_passphrase = TraderConfig::new("gdax", "USD", "BTC");
    missing_passphrase.key = "k".to_string();
    missing_passphrase.secret = "s".to_string();
    missing_passphrase.trading_enabled = true;
    assert!(matches!(
        Trader::from_config(&missing_passphrase, registry, quick()),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn valid_configs_pick_the_right_adapter() {
    let registry = Registry::builtin();

    let trader = Trader::from_config(&TraderConfig::new("GDAX", "USD", "BTC"), registry, quick()).unwrap();
    assert_eq!(trader.name(), "GDAX");
    assert!(trader.is_paginated());
    assert!(!trader.trading_enabled());

    let trader = Trader::from_config(&TraderConfig::new("poloniex", "BTC", "ETH"), registry, quick()).unwrap();
    assert_eq!(trader.name(), "Poloniex");
    assert!(!trader.is_paginated());
}
