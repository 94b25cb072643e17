use crate::importer;
use chrono::{DateTime, Utc};
use common::{
    models::{ExchangeDescriptor, Market, OrderId, PortfolioEntry, Side, Ticker, Trade, TraderConfig},
    Checker, Error, Registry, Rejection, Result,
};
use connectors::{RetryPolicy, Trader, TradesQuery};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use store::TradeSink;
use tokio::sync::Mutex;
use tracing::{error, info};

/// What a config is checked for
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    Monitor,
    Trade,
    History,
}

/// The configured trader plus everything needed to validate configs and
/// import its history.
///
/// History scans run on a trader of their own behind a lock, so orders and
/// quotes never wait for a backfill.
pub struct TraderService {
    registry: &'static Registry,
    config: TraderConfig,
    retry: RetryPolicy,
    trader: Trader,
    history: Mutex<Trader>,
    store: Option<Arc<dyn TradeSink>>,
    importing: Arc<AtomicBool>,
}

impl TraderService {
    /// `trader` serves orders and quotes, `history` serves trade history.
    /// Both are built from `config`.
    pub fn new(
        registry: &'static Registry,
        config: TraderConfig,
        retry: RetryPolicy,
        trader: Trader,
        history: Trader,
        store: Option<Arc<dyn TradeSink>>,
    ) -> Self {
        Self {
            registry,
            config,
            retry,
            trader,
            history: Mutex::new(history),
            store,
            importing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn list_exchanges(&self) -> Vec<ExchangeDescriptor> {
        self.registry.all().cloned().collect()
    }

    pub fn get_exchange(&self, slug: &str) -> Result<ExchangeDescriptor> {
        self.registry
            .find(slug)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Exchange '{}' not found", slug)))
    }

    pub fn check(&self, config: &TraderConfig, mode: Option<CheckMode>) -> Option<Rejection> {
        let checker = Checker::new(self.registry);
        match mode {
            Some(CheckMode::Monitor) => checker.cant_monitor(config),
            Some(CheckMode::Trade) => checker.cant_trade(config),
            Some(CheckMode::History) => checker.cant_fetch_full_history(config),
            None => checker.not_valid(config),
        }
    }

    pub async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        self.trader.get_portfolio().await
    }

    pub async fn get_ticker(&self) -> Result<Ticker> {
        self.trader.get_ticker().await
    }

    pub async fn get_fee(&self) -> Result<f64> {
        self.trader.get_fee().await
    }

    pub async fn get_trades(&self, since: Option<DateTime<Utc>>, descending: bool) -> Result<Vec<Trade>> {
        let mut query = match since {
            Some(since) => TradesQuery::since(since),
            None => TradesQuery::recent(),
        };
        if descending {
            query = query.descending();
        }
        self.history.lock().await.get_trades(query).await
    }

    pub async fn place_order(&self, side: Side, amount: f64, price: f64) -> Result<OrderId> {
        match side {
            Side::Buy => self.trader.buy(amount, price).await,
            Side::Sell => self.trader.sell(amount, price).await,
        }
    }

    pub async fn check_order(&self, order: &OrderId) -> Result<bool> {
        self.trader.check_order(Some(order)).await
    }

    pub async fn cancel_order(&self, order: &OrderId) {
        self.trader.cancel_order(Some(order)).await
    }

    /// Start importing history since `since` in the background. Fails when
    /// the exchange can't provide it, no store is configured or an import is
    /// already running.
    pub fn start_import(&self, since: DateTime<Utc>) -> Result<()> {
        if let Some(rejection) = Checker::new(self.registry).cant_fetch_full_history(&self.config) {
            return Err(Error::ConfigError(rejection.message));
        }
        let sink = self
            .store
            .clone()
            .ok_or_else(|| Error::ConfigError("No trade store configured".to_string()))?;

        if self.importing.swap(true, Ordering::SeqCst) {
            return Err(Error::Rejected("An import is already running".to_string()));
        }

        let trader = match Trader::from_config(&self.config, self.registry, self.retry) {
            Ok(trader) => trader,
            Err(e) => {
                self.importing.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let market = Market::new(&self.config.currency, &self.config.asset);
        let importing = self.importing.clone();
        tokio::spawn(async move {
            match importer::import(trader, sink, market, since).await {
                Ok(total) => info!("Import finished with {} trades", total),
                Err(e) => error!("Import failed: {}", e),
            }
            importing.store(false, Ordering::SeqCst);
        });

        Ok(())
    }
}
