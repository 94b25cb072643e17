use crate::{http, truncate_amount, ExchangeAdapter};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use common::{
    models::{OrderId, PortfolioEntry, Side, Ticker, Trade, TradeId, TraderConfig},
    Error, Result,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha384;
use tracing::{debug, error};

const BITFINEX_API_URL: &str = "https://api.bitfinex.com";

/// Most trades the trades endpoint hands out in one call
const HISTORY_LIMIT: usize = 2000;

/// Only limit orders are placed, so every fill pays the maker fee. Volume
/// discounts are not taken into account.
const MAKER_FEE: f64 = 0.001;

type HmacSha384 = Hmac<Sha384>;

pub struct BitfinexAdapter {
    client: reqwest::Client,
    key: String,
    secret: String,
    symbol: String,
}

impl BitfinexAdapter {
    pub fn new(config: &TraderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: config.key.clone(),
            secret: config.secret.clone(),
            symbol: format_symbol(&config.asset, &config.currency),
        }
    }

    /// Authenticated v1 call. `params` are merged into the signed payload.
    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, params: Value) -> Result<T> {
        let mut payload = json!({
            "request": path,
            "nonce": Utc::now().timestamp_micros().to_string(),
        });
        if let (Some(payload), Value::Object(params)) = (payload.as_object_mut(), params) {
            payload.extend(params);
        }

        let encoded = STANDARD.encode(payload.to_string());
        let signature = sign(&self.secret, &encoded)?;

        debug!("Calling Bitfinex {}", path);

        let request = self
            .client
            .post(format!("{}{}", BITFINEX_API_URL, path))
            .header("X-BFX-APIKEY", &self.key)
            .header("X-BFX-PAYLOAD", encoded)
            .header("X-BFX-SIGNATURE", signature);

        http::send_json("Bitfinex", request).await
    }

    async fn submit_order(&self, side: Side, amount: f64, price: f64) -> Result<OrderId> {
        let params = NewOrder {
            symbol: &self.symbol,
            amount: truncate_amount(amount).to_string(),
            price: price.to_string(),
            exchange: "bitfinex",
            side,
            order_type: "exchange limit",
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| Error::InternalError(format!("Failed to encode Bitfinex order: {}", e)))?;

        let order: BitfinexOrder = self.post("/v1/order/new", params).await.map_err(|e| {
            error!("unable to {}: {}", side, e);
            e
        })?;
        Ok(OrderId::new(order.order_id.to_string()))
    }

    fn order_params(order: &OrderId) -> Result<Value> {
        let id: u64 = order
            .as_str()
            .parse()
            .map_err(|_| Error::Rejected(format!("Invalid Bitfinex order id {}", order)))?;
        Ok(json!({ "order_id": id }))
    }
}

fn format_symbol(asset: &str, currency: &str) -> String {
    format!("{}{}", asset, currency).to_lowercase()
}

/// `X-BFX-SIGNATURE`: hex HMAC-SHA384 of the base64 payload
fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha384::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::ConfigError(format!("Invalid Bitfinex secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct BitfinexBalance {
    #[serde(rename = "type")]
    wallet: String,
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct BitfinexTicker {
    bid: String,
    ask: String,
}

#[derive(Debug, Serialize)]
struct NewOrder<'a> {
    symbol: &'a str,
    amount: String,
    price: String,
    exchange: &'static str,
    side: Side,
    #[serde(rename = "type")]
    order_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct BitfinexOrder {
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct BitfinexOrderStatus {
    is_live: bool,
    #[serde(default)]
    is_cancelled: bool,
}

#[derive(Debug, Deserialize)]
struct BitfinexTrade {
    tid: TradeId,
    timestamp: i64,
    price: String,
    amount: String,
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|e| {
        Error::ParseError(format!("Failed to parse Bitfinex {} '{}': {}", field, value, e))
    })
}

/// Only the exchange wallets can be traded from. An unreadable balance is
/// fatal, not retried.
fn to_portfolio(balances: Vec<BitfinexBalance>) -> Result<Vec<PortfolioEntry>> {
    balances
        .into_iter()
        .filter(|balance| balance.wallet == "exchange")
        .map(|balance| {
            let amount = parse_number("available", &balance.available).map_err(|e| {
                Error::Fatal(format!("Bitfinex returned an unreadable portfolio: {}", e))
            })?;
            Ok(PortfolioEntry {
                amount,
                name: balance.currency.to_uppercase(),
            })
        })
        .collect()
}

fn to_trades(trades: Vec<BitfinexTrade>) -> Result<Vec<Trade>> {
    trades
        .into_iter()
        .map(|trade| {
            Ok(Trade {
                tid: trade.tid,
                date: trade.timestamp,
                price: parse_number("price", &trade.price)?,
                amount: parse_number("amount", &trade.amount)?,
            })
        })
        .collect()
}

#[async_trait]
impl ExchangeAdapter for BitfinexAdapter {
    fn name(&self) -> &str {
        "Bitfinex"
    }

    async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        let balances: Vec<BitfinexBalance> = self.post("/v1/balances", json!({})).await?;
        to_portfolio(balances)
    }

    async fn get_ticker(&self) -> Result<Ticker> {
        let url = format!("{}/v1/pubticker/{}", BITFINEX_API_URL, self.symbol);
        debug!("Fetching Bitfinex ticker: {}", url);

        let ticker: BitfinexTicker = http::send_json("Bitfinex", self.client.get(&url)).await?;
        Ok(Ticker {
            bid: parse_number("bid", &ticker.bid)?,
            ask: parse_number("ask", &ticker.ask)?,
        })
    }

    async fn get_fee(&self) -> Result<f64> {
        Ok(MAKER_FEE)
    }

    async fn buy(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.submit_order(Side::Buy, amount, price).await
    }

    async fn sell(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.submit_order(Side::Sell, amount, price).await
    }

    async fn check_order(&self, order: &OrderId) -> Result<bool> {
        let status: BitfinexOrderStatus = self
            .post("/v1/order/status", Self::order_params(order)?)
            .await?;
        Ok(!status.is_live)
    }

    async fn cancel_order(&self, order: &OrderId) -> Result<()> {
        let status: BitfinexOrderStatus = self
            .post("/v1/order/cancel", Self::order_params(order)?)
            .await?;
        if !status.is_cancelled {
            error!("unable to cancel order {} (still live: {})", order, status.is_live);
        }
        Ok(())
    }

    async fn recent_trades(&self, since: Option<i64>) -> Result<Vec<Trade>> {
        let url = format!("{}/v1/trades/{}", BITFINEX_API_URL, self.symbol);
        let mut request = self.client.get(&url);
        if since.is_some() {
            request = request.query(&[("limit_trades", HISTORY_LIMIT)]);
        }

        debug!("Fetching Bitfinex trades: {}", url);

        let trades: Vec<BitfinexTrade> = http::send_json("Bitfinex", request).await?;
        to_trades(trades)
    }
}
