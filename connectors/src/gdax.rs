use crate::{http, scanback::TradePager, truncate_amount, ExchangeAdapter};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use common::{
    models::{OrderId, PortfolioEntry, Side, Ticker, Trade, TradeId, TraderConfig},
    Error, Result,
};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

const GDAX_API_URL: &str = "https://api.exchange.coinbase.com";
const GDAX_SANDBOX_API_URL: &str = "https://api-public.sandbox.exchange.coinbase.com";
const USER_AGENT: &str = "tradebridge/0.1";

/// Trades per page of the public trades endpoint
const BATCH_SIZE: usize = 100;

/// Taker fee. Makers trade for free, which is all that post only orders can do.
const TAKER_FEE: f64 = 0.0025;

type HmacSha256 = Hmac<Sha256>;

pub struct GdaxAdapter {
    client: reqwest::Client,
    base_url: &'static str,
    key: String,
    secret: String,
    passphrase: String,
    product_id: String,
    post_only: bool,
}

impl GdaxAdapter {
    pub fn new(config: &TraderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: if config.sandbox {
                GDAX_SANDBOX_API_URL
            } else {
                GDAX_API_URL
            },
            key: config.key.clone(),
            secret: config.secret.clone(),
            passphrase: config.passphrase.clone().unwrap_or_default(),
            product_id: format_product_id(&config.asset, &config.currency),
            post_only: config.post_only,
        }
    }

    fn public(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    fn signed(&self, method: Method, path: &str, body: Option<String>) -> Result<reqwest::RequestBuilder> {
        let timestamp = Utc::now().timestamp().to_string();
        let body = body.unwrap_or_default();
        let signature = sign(&self.secret, &timestamp, method.as_str(), path, &body)?;

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("CB-ACCESS-KEY", &self.key)
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp)
            .header("CB-ACCESS-PASSPHRASE", &self.passphrase);

        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        Ok(request)
    }

    async fn submit_order(&self, side: Side, amount: f64, price: f64) -> Result<OrderId> {
        let params = GdaxOrderParams {
            order_type: "limit",
            side,
            product_id: &self.product_id,
            price: price.to_string(),
            size: truncate_amount(amount).to_string(),
            post_only: self.post_only,
        };
        let body = serde_json::to_string(&params)
            .map_err(|e| Error::InternalError(format!("Failed to encode GDAX order: {}", e)))?;

        debug!("Placing GDAX {} order: {}", side, body);

        let order: GdaxOrder =
            http::send_json("GDAX", self.signed(Method::POST, "/orders", Some(body))?).await?;
        Ok(OrderId::new(order.id))
    }
}

fn format_product_id(asset: &str, currency: &str) -> String {
    format!("{}-{}", asset, currency).to_uppercase()
}

/// `CB-ACCESS-SIGN`: base64 HMAC-SHA256 of timestamp, method, path and body,
/// keyed with the base64 decoded secret
fn sign(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
    let key = STANDARD
        .decode(secret)
        .map_err(|e| Error::ConfigError(format!("GDAX secret is not valid base64: {}", e)))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| Error::ConfigError(format!("Invalid GDAX secret: {}", e)))?;
    mac.update(format!("{}{}{}{}", timestamp, method, path, body).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct GdaxAccount {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct GdaxTicker {
    bid: String,
    ask: String,
}

#[derive(Debug, Serialize)]
struct GdaxOrderParams<'a> {
    #[serde(rename = "type")]
    order_type: &'static str,
    side: Side,
    product_id: &'a str,
    price: String,
    size: String,
    post_only: bool,
}

#[derive(Debug, Deserialize)]
struct GdaxOrder {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct GdaxTrade {
    trade_id: TradeId,
    time: DateTime<Utc>,
    price: String,
    size: String,
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::ParseError(format!("Failed to parse GDAX {} '{}': {}", field, value, e)))
}

/// A balance we can't read means we don't know what we own, asking again
/// won't help.
fn to_portfolio(accounts: Vec<GdaxAccount>) -> Result<Vec<PortfolioEntry>> {
    accounts
        .into_iter()
        .map(|account| {
            let amount = parse_number("available", &account.available)
                .map_err(|e| Error::Fatal(format!("GDAX returned an unreadable portfolio: {}", e)))?;
            Ok(PortfolioEntry {
                amount,
                name: account.currency.to_uppercase(),
            })
        })
        .collect()
}

fn to_trades(trades: Vec<GdaxTrade>) -> Result<Vec<Trade>> {
    trades
        .into_iter()
        .map(|trade| {
            Ok(Trade {
                tid: trade.trade_id,
                date: trade.time.timestamp(),
                price: parse_number("price", &trade.price)?,
                amount: parse_number("size", &trade.size)?,
            })
        })
        .collect()
}

/// `open`, `pending` and `active` orders may still fill
fn is_done(order: &GdaxOrder) -> bool {
    matches!(order.status.as_str(), "done" | "rejected")
}

#[async_trait]
impl ExchangeAdapter for GdaxAdapter {
    fn name(&self) -> &str {
        "GDAX"
    }

    async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        debug!("Fetching GDAX accounts");
        let accounts: Vec<GdaxAccount> =
            http::send_json("GDAX", self.signed(Method::GET, "/accounts", None)?).await?;
        to_portfolio(accounts)
    }

    async fn get_ticker(&self) -> Result<Ticker> {
        let path = format!("/products/{}/ticker", self.product_id);
        debug!("Fetching GDAX ticker: {}", path);

        let ticker: GdaxTicker = http::send_json("GDAX", self.public(&path)).await?;
        Ok(Ticker {
            bid: parse_number("bid", &ticker.bid)?,
            ask: parse_number("ask", &ticker.ask)?,
        })
    }

    async fn get_fee(&self) -> Result<f64> {
        Ok(if self.post_only { 0.0 } else { TAKER_FEE })
    }

    async fn buy(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.submit_order(Side::Buy, amount, price).await
    }

    async fn sell(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.submit_order(Side::Sell, amount, price).await
    }

    async fn check_order(&self, order: &OrderId) -> Result<bool> {
        let path = format!("/orders/{}", order);
        let order: GdaxOrder =
            http::send_json("GDAX", self.signed(Method::GET, &path, None)?).await?;
        debug!("GDAX order {} is {}", order.id, order.status);
        Ok(is_done(&order))
    }

    async fn cancel_order(&self, order: &OrderId) -> Result<()> {
        let path = format!("/orders/{}", order);
        let _: serde_json::Value =
            http::send_json("GDAX", self.signed(Method::DELETE, &path, None)?).await?;
        Ok(())
    }

    async fn recent_trades(&self, _since: Option<i64>) -> Result<Vec<Trade>> {
        self.fetch_page(None, BATCH_SIZE).await
    }

    fn pager(&self) -> Option<&dyn TradePager> {
        Some(self)
    }
}

#[async_trait]
impl TradePager for GdaxAdapter {
    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    async fn fetch_page(&self, after: Option<TradeId>, limit: usize) -> Result<Vec<Trade>> {
        let path = format!("/products/{}/trades", self.product_id);
        let mut params = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            params.push(("after", after.to_string()));
        }

        debug!("Fetching GDAX trades: {} {:?}", path, params);

        let trades: Vec<GdaxTrade> = http::send_json("GDAX", self.public(&path).query(&params)).await?;
        to_trades(trades)
    }
}
