use chrono::{DateTime, Utc};
use common::{models::Market, Result};
use connectors::{Trader, TradesQuery};
use std::sync::Arc;
use store::TradeSink;
use tracing::info;

/// Backfill the trader's history since `since` into `sink`, page by page.
/// Returns the number of trades written.
pub async fn import(
    mut trader: Trader,
    sink: Arc<dyn TradeSink>,
    market: Market,
    since: DateTime<Utc>,
) -> Result<usize> {
    let exchange = trader.name().to_lowercase();
    info!(
        "Importing {}/{} trades from {} since {}",
        market.asset, market.currency, exchange, since
    );

    let mut total = 0;
    loop {
        let page = trader.get_trades(TradesQuery::import(since)).await?;
        let latest = match page.last() {
            Some(trade) => trade.date,
            None => break,
        };

        total += sink.store_trades(&exchange, &market, &page).await?;
        info!("Imported {} trades, up to {}", total, latest);

        // everything there is came back in one response
        if !trader.is_paginated() {
            break;
        }
    }

    info!("Import from {} done, {} trades", exchange, total);
    Ok(total)
}
