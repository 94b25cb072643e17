//! In memory exchange and trade sink for the service tests

use async_trait::async_trait;
use common::models::{Market, OrderId, PortfolioEntry, Ticker, Trade, TradeId};
use common::{Error, Result};
use connectors::{ExchangeAdapter, TradePager};
use std::sync::Mutex;
use std::time::Duration;
use store::{StoreError, TradeSink};

pub const START: i64 = 1_600_000_000;

/// Trades 1..=count, one a minute, served 25 per page
pub struct History {
    trades: Vec<Trade>,
    paginated: bool,
    /// Trade requests hang for this long before answering
    pub stall: Option<Duration>,
}

impl History {
    pub fn new(count: u64, paginated: bool) -> Self {
        Self {
            trades: (1..=count)
                .map(|tid| Trade {
                    tid,
                    date: START + tid as i64 * 60,
                    price: 10.0,
                    amount: 1.0,
                })
                .collect(),
            paginated,
            stall: None,
        }
    }

    async fn newest_first(&self, after: Option<TradeId>, limit: usize) -> Vec<Trade> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.trades
            .iter()
            .rev()
            .filter(|t| after.map_or(true, |a| t.tid < a))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TradePager for History {
    fn batch_size(&self) -> usize {
        25
    }

    async fn fetch_page(&self, after: Option<TradeId>, limit: usize) -> Result<Vec<Trade>> {
        Ok(self.newest_first(after, limit).await)
    }
}

#[async_trait]
impl ExchangeAdapter for History {
    fn name(&self) -> &str {
        "History"
    }

    async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        Ok(Vec::new())
    }

    async fn get_ticker(&self) -> Result<Ticker> {
        Ok(Ticker { bid: 9.0, ask: 11.0 })
    }

    async fn get_fee(&self) -> Result<f64> {
        Ok(0.0)
    }

    async fn buy(&self, _amount: f64, _price: f64) -> Result<OrderId> {
        Err(Error::Rejected("read only".to_string()))
    }

    async fn sell(&self, _amount: f64, _price: f64) -> Result<OrderId> {
        Err(Error::Rejected("read only".to_string()))
    }

    async fn check_order(&self, _order: &OrderId) -> Result<bool> {
        Ok(true)
    }

    async fn cancel_order(&self, _order: &OrderId) -> Result<()> {
        Ok(())
    }

    async fn recent_trades(&self, _since: Option<i64>) -> Result<Vec<Trade>> {
        Ok(self.newest_first(None, 40).await)
    }

    fn pager(&self) -> Option<&dyn TradePager> {
        if self.paginated {
            Some(self)
        } else {
            None
        }
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub pages: Mutex<Vec<(String, Vec<Trade>)>>,
}

#[async_trait]
impl TradeSink for MemorySink {
    async fn store_trades(
        &self,
        exchange: &str,
        _market: &Market,
        trades: &[Trade],
    ) -> std::result::Result<usize, StoreError> {
        self.pages
            .lock()
            .unwrap()
            .push((exchange.to_string(), trades.to_vec()));
        Ok(trades.len())
    }
}
