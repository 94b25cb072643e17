use crate::{StoreConfig, StoreError};
use async_trait::async_trait;
use common::models::{Market, Trade};
use futures::stream;
use influxdb2::{models::DataPoint, Client};
use tracing::debug;

const MEASUREMENT: &str = "trades";
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Somewhere imported trade history can be written to
#[async_trait]
pub trait TradeSink: Send + Sync {
    /// Write a page of trades, returning how many were written
    async fn store_trades(
        &self,
        exchange: &str,
        market: &Market,
        trades: &[Trade],
    ) -> Result<usize, StoreError>;
}

/// Trade history in InfluxDB, one point per trade.
///
/// Points are keyed by exchange, pair, time and trade id, so writing a page
/// twice overwrites rather than duplicates.
pub struct TradeStore {
    client: Client,
    config: StoreConfig,
}

impl TradeStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::new(&config.url, &config.org, &config.token);

        Ok(Self { client, config })
    }
}

/// Trade dates only have second resolution. The trade id goes in the
/// nanoseconds so trades in the same second don't overwrite each other.
fn point_time(trade: &Trade) -> i64 {
    trade.date * NANOS_PER_SEC + (trade.tid % NANOS_PER_SEC as u64) as i64
}

fn to_points(exchange: &str, market: &Market, trades: &[Trade]) -> Result<Vec<DataPoint>, StoreError> {
    trades
        .iter()
        .map(|trade| {
            DataPoint::builder(MEASUREMENT)
                .tag("exchange", exchange)
                .tag("currency", market.currency.as_str())
                .tag("asset", market.asset.as_str())
                .field("tid", trade.tid as i64)
                .field("price", trade.price)
                .field("amount", trade.amount)
                .timestamp(point_time(trade))
                .build()
                .map_err(StoreError::from)
        })
        .collect()
}

#[async_trait]
impl TradeSink for TradeStore {
    async fn store_trades(
        &self,
        exchange: &str,
        market: &Market,
        trades: &[Trade],
    ) -> Result<usize, StoreError> {
        if trades.is_empty() {
            return Ok(0);
        }

        debug!(
            "Storing {} {}/{} trades from {}",
            trades.len(),
            market.asset,
            market.currency,
            exchange
        );

        let points = to_points(exchange, market, trades)?;
        let written = points.len();
        self.client
            .write(&self.config.bucket, stream::iter(points))
            .await?;

        Ok(written)
    }
}
