use crate::{
    bitfinex::BitfinexAdapter,
    gdax::GdaxAdapter,
    poloniex::PoloniexAdapter,
    retry::RetryPolicy,
    scanback::{self, Delivery, Scanback},
    ExchangeAdapter,
};
use chrono::{DateTime, Utc};
use common::{
    models::{OrderId, PortfolioEntry, Side, Ticker, Trade, TraderConfig},
    Checker, Error, Registry, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Exchanges we have an adapter for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    #[serde(rename = "gdax")]
    Gdax,
    #[serde(rename = "bitfinex")]
    Bitfinex,
    #[serde(rename = "poloniex")]
    Poloniex,
}

impl ExchangeKind {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_lowercase().as_str() {
            "gdax" => Some(ExchangeKind::Gdax),
            "bitfinex" => Some(ExchangeKind::Bitfinex),
            "poloniex" => Some(ExchangeKind::Poloniex),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeKind::Gdax => write!(f, "gdax"),
            ExchangeKind::Bitfinex => write!(f, "bitfinex"),
            ExchangeKind::Poloniex => write!(f, "poloniex"),
        }
    }
}

/// Parameters of a trade history request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradesQuery {
    /// Fetch complete history back to this point instead of the latest page
    pub since: Option<DateTime<Utc>>,
    /// Newest first instead of oldest first
    pub descending: bool,
    pub delivery: Delivery,
}

impl TradesQuery {
    /// The exchange's latest page of trades
    pub fn recent() -> Self {
        Self::default()
    }

    /// Everything since `since`, in one list
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }

    /// Everything since `since`, one page per call
    pub fn import(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            delivery: Delivery::Import,
            ..Self::default()
        }
    }

    pub fn descending(self) -> Self {
        Self {
            descending: true,
            ..self
        }
    }
}

/// One exchange account for one pair, with retries and history backfill on
/// top of the raw [`ExchangeAdapter`].
pub struct Trader {
    adapter: Box<dyn ExchangeAdapter>,
    retry: RetryPolicy,
    scanback: Scanback,
    trading_enabled: bool,
}

impl Trader {
    pub fn new(adapter: Box<dyn ExchangeAdapter>, retry: RetryPolicy, trading_enabled: bool) -> Self {
        Self {
            adapter,
            retry,
            scanback: Scanback::new(),
            trading_enabled,
        }
    }

    /// Build the adapter for `config`. Configs the [`Checker`] rejects are
    /// refused.
    pub fn from_config(config: &TraderConfig, registry: &Registry, retry: RetryPolicy) -> Result<Self> {
        if let Some(rejection) = Checker::new(registry).not_valid(config) {
            return Err(Error::ConfigError(rejection.message));
        }

        let slug = config.slug();
        let kind = ExchangeKind::from_slug(&slug)
            .ok_or_else(|| Error::NotFound(format!("No adapter for exchange {}", slug)))?;

        let adapter: Box<dyn ExchangeAdapter> = match kind {
            ExchangeKind::Gdax => Box::new(GdaxAdapter::new(config)),
            ExchangeKind::Bitfinex => Box::new(BitfinexAdapter::new(config)),
            ExchangeKind::Poloniex => Box::new(PoloniexAdapter::new(config)),
        };

        info!(
            "Created {} trader for {}/{} (trading {})",
            adapter.name(),
            config.asset,
            config.currency,
            if config.trading_enabled { "enabled" } else { "disabled" }
        );

        Ok(Self::new(adapter, retry, config.trading_enabled))
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn trading_enabled(&self) -> bool {
        self.trading_enabled
    }

    /// Whether history requests are served page by page
    pub fn is_paginated(&self) -> bool {
        self.adapter.pager().is_some()
    }

    pub async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        let adapter = self.adapter.as_ref();
        self.retry
            .run(adapter.name(), move || adapter.get_portfolio())
            .await
    }

    pub async fn get_ticker(&self) -> Result<Ticker> {
        let adapter = self.adapter.as_ref();
        self.retry.run(adapter.name(), move || adapter.get_ticker()).await
    }

    pub async fn get_fee(&self) -> Result<f64> {
        let adapter = self.adapter.as_ref();
        self.retry.run(adapter.name(), move || adapter.get_fee()).await
    }

    pub async fn buy(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.place(Side::Buy, amount, price).await
    }

    pub async fn sell(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.place(Side::Sell, amount, price).await
    }

    async fn place(&self, side: Side, amount: f64, price: f64) -> Result<OrderId> {
        if !self.trading_enabled {
            return Err(Error::ConfigError(format!(
                "Trading is not enabled, refusing to {} at {}",
                side,
                self.name()
            )));
        }

        debug!("Placing {} order at {}: {} @ {}", side, self.name(), amount, price);
        let adapter = self.adapter.as_ref();
        self.retry
            .run(adapter.name(), move || match side {
                Side::Buy => adapter.buy(amount, price),
                Side::Sell => adapter.sell(amount, price),
            })
            .await
    }

    /// Whether the order is done. A missing order id is reported without
    /// asking the exchange.
    pub async fn check_order(&self, order: Option<&OrderId>) -> Result<bool> {
        let order = match order {
            Some(order) if !order.is_empty() => order,
            _ => return Err(Error::EmptyOrderId),
        };

        let adapter = self.adapter.as_ref();
        self.retry
            .run(adapter.name(), move || adapter.check_order(order))
            .await
    }

    /// Best effort, a failed cancel is only logged. Use
    /// [`check_order`](Self::check_order) to find out what happened.
    pub async fn cancel_order(&self, order: Option<&OrderId>) {
        let order = match order {
            Some(order) if !order.is_empty() => order,
            _ => return,
        };

        let adapter = self.adapter.as_ref();
        if let Err(e) = self
            .retry
            .run(adapter.name(), move || adapter.cancel_order(order))
            .await
        {
            error!("unable to cancel order {} at {}: {}", order, adapter.name(), e);
        }
    }

    /// Trade history, oldest first unless the query asks otherwise.
    ///
    /// A failure while scanning retries the whole request, starting the scan
    /// over. Calls must not overlap, which `&mut self` takes care of.
    pub async fn get_trades(&mut self, query: TradesQuery) -> Result<Vec<Trade>> {
        let since = query.since.map(|t| t.timestamp());
        let mut attempt = 0;
        loop {
            match self.fetch_trades(since, query.delivery).await {
                Ok(trades) if query.descending => return Ok(trades.into_iter().rev().collect()),
                Ok(trades) => return Ok(trades),
                Err(err) => {
                    self.retry
                        .backoff(self.adapter.name(), &mut attempt, err)
                        .await?
                }
            }
        }
    }

    async fn fetch_trades(&mut self, since: Option<i64>, delivery: Delivery) -> Result<Vec<Trade>> {
        if let (Some(since), Some(pager)) = (since, self.adapter.pager()) {
            return match delivery {
                Delivery::Accumulate => self.scanback.collect(pager, since).await,
                Delivery::Import => self.scanback.next_page(pager, since).await,
            };
        }

        let trades = self.adapter.recent_trades(since).await?;

        // a full response is ambiguous, stop rather than carry on with a gap
        if since.is_some() && self.adapter.truncation_limit() == Some(trades.len()) {
            return Err(Error::InsufficientData(format!(
                "{} returned exactly {} trades, the history is most likely truncated",
                self.adapter.name(),
                trades.len()
            )));
        }

        Ok(scanback::normalize(trades))
    }
}
