use crate::{http, truncate_amount, ExchangeAdapter};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use common::{
    models::{OrderId, PortfolioEntry, Side, Ticker, Trade, TradeId, TraderConfig},
    Error, Result,
};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;
use std::collections::HashMap;
use tracing::{debug, error, info};

const POLONIEX_PUBLIC_URL: &str = "https://poloniex.com/public";
const POLONIEX_TRADING_URL: &str = "https://poloniex.com/tradingApi";

/// Most rows returnTradeHistory returns. Getting exactly this many back
/// most likely means the window was cut off.
const HISTORY_LIMIT: usize = 50_000;

type HmacSha512 = Hmac<Sha512>;

pub struct PoloniexAdapter {
    client: reqwest::Client,
    key: String,
    secret: String,
    currency: String,
    asset: String,
    pair: String,
}

impl PoloniexAdapter {
    pub fn new(config: &TraderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: config.key.clone(),
            secret: config.secret.clone(),
            currency: config.currency.to_uppercase(),
            asset: config.asset.to_uppercase(),
            pair: format_pair(&config.currency, &config.asset),
        }
    }

    async fn public<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T> {
        debug!("Calling Poloniex public API: {:?}", params);
        let value: Value =
            http::send_json("Poloniex", self.client.get(POLONIEX_PUBLIC_URL).query(params)).await?;
        from_reply(value, Reply::Read)
    }

    async fn private<T: DeserializeOwned>(&self, command: &str, params: &[(&str, String)]) -> Result<T> {
        let nonce = Utc::now().timestamp_micros().to_string();
        let mut form = vec![("command", command.to_string()), ("nonce", nonce)];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let body = encode_form(&form);
        let signature = sign(&self.secret, &body)?;

        debug!("Calling Poloniex trading API: {}", command);

        let request = self
            .client
            .post(POLONIEX_TRADING_URL)
            .header("Key", &self.key)
            .header("Sign", signature)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body);

        let value: Value = http::send_json("Poloniex", request).await?;
        from_reply(value, Reply::for_command(command))
    }

    async fn submit_order(&self, side: Side, amount: f64, price: f64) -> Result<OrderId> {
        let params = [
            ("currencyPair", self.pair.clone()),
            ("rate", price.to_string()),
            ("amount", truncate_amount(amount).to_string()),
        ];
        let command = match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };

        let placed: PoloniexPlaced = self.private(command, &params).await.map_err(|e| {
            error!("unable to {}: {}", side, e);
            e
        })?;
        Ok(OrderId::new(placed.order_number))
    }
}

fn format_pair(currency: &str, asset: &str) -> String {
    format!("{}_{}", currency, asset).to_uppercase()
}

/// `Sign`: hex HMAC-SHA512 of the form body
fn sign(secret: &str, body: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::ConfigError(format!("Invalid Poloniex secret: {}", e)))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn encode_form(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(raw: &str) -> String {
    raw.bytes()
        .map(|b| {
            let c = b as char;
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}

/// How an `{"error": "..."}` reply to a command is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    /// Rate limits, nonce clashes and the like, worth asking again
    Read,
    /// The exchange said no to this order or account request
    Final,
}

impl Reply {
    fn for_command(command: &str) -> Self {
        match command {
            "buy" | "sell" | "cancelOrder" | "returnFeeInfo" => Reply::Final,
            _ => Reply::Read,
        }
    }
}

/// Poloniex reports most failures as `{"error": "..."}` with a 200 status
fn from_reply<T: DeserializeOwned>(value: Value, reply: Reply) -> Result<T> {
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        error!("Poloniex API error: {}", message);
        return Err(match reply {
            Reply::Final => Error::Rejected(message.to_string()),
            Reply::Read => Error::ExchangeError(format!("Poloniex API error: {}", message)),
        });
    }
    serde_json::from_value(value)
        .map_err(|e| Error::ParseError(format!("Failed to parse Poloniex response: {}", e)))
}

#[derive(Debug, Deserialize)]
struct PoloniexTick {
    #[serde(rename = "highestBid")]
    highest_bid: String,
    #[serde(rename = "lowestAsk")]
    lowest_ask: String,
}

#[derive(Debug, Deserialize)]
struct PoloniexFees {
    #[serde(rename = "takerFee")]
    taker_fee: String,
}

#[derive(Debug, Deserialize)]
struct PoloniexPlaced {
    #[serde(rename = "orderNumber")]
    order_number: String,
}

#[derive(Debug, Deserialize)]
struct PoloniexOpenOrder {
    #[serde(rename = "orderNumber")]
    order_number: String,
}

#[derive(Debug, Deserialize)]
struct PoloniexCancel {
    #[serde(default)]
    success: i64,
}

#[derive(Debug, Deserialize)]
struct PoloniexTrade {
    #[serde(rename = "tradeID")]
    trade_id: TradeId,
    date: String,
    rate: String,
    amount: String,
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|e| {
        Error::ParseError(format!("Failed to parse Poloniex {} '{}': {}", field, value, e))
    })
}

/// Balances of the configured asset and currency. Anything unexpected here
/// means we can't know what we own, which is not worth retrying.
fn to_portfolio(
    balances: &HashMap<String, String>,
    asset: &str,
    currency: &str,
) -> Result<Vec<PortfolioEntry>> {
    let amount = |code: &str| -> Result<f64> {
        balances
            .get(code)
            .and_then(|b| b.parse::<f64>().ok())
            .filter(|b| b.is_finite())
            .ok_or_else(|| {
                info!("asset: {}", asset);
                info!("currency: {}", currency);
                info!("exchange data: {:?}", balances);
                Error::Fatal("Poloniex returned a portfolio that can't be read".to_string())
            })
    };

    Ok(vec![
        PortfolioEntry {
            name: asset.to_string(),
            amount: amount(asset)?,
        },
        PortfolioEntry {
            name: currency.to_string(),
            amount: amount(currency)?,
        },
    ])
}

fn to_trades(trades: Vec<PoloniexTrade>) -> Result<Vec<Trade>> {
    trades
        .into_iter()
        .map(|trade| {
            let date = NaiveDateTime::parse_from_str(&trade.date, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| {
                    Error::ParseError(format!("Failed to parse Poloniex date '{}': {}", trade.date, e))
                })?;
            Ok(Trade {
                tid: trade.trade_id,
                date: Utc.from_utc_datetime(&date).timestamp(),
                price: parse_number("rate", &trade.rate)?,
                amount: parse_number("amount", &trade.amount)?,
            })
        })
        .collect()
}

#[async_trait]
impl ExchangeAdapter for PoloniexAdapter {
    fn name(&self) -> &str {
        "Poloniex"
    }

    async fn get_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        let balances: HashMap<String, String> = self.private("returnBalances", &[]).await?;
        to_portfolio(&balances, &self.asset, &self.currency)
    }

    async fn get_ticker(&self) -> Result<Ticker> {
        let mut ticks: HashMap<String, PoloniexTick> = self
            .public(&[("command", "returnTicker".to_string())])
            .await?;
        let tick = ticks
            .remove(&self.pair)
            .ok_or_else(|| Error::ParseError(format!("Poloniex has no ticker for {}", self.pair)))?;

        Ok(Ticker {
            bid: parse_number("highestBid", &tick.highest_bid)?,
            ask: parse_number("lowestAsk", &tick.lowest_ask)?,
        })
    }

    async fn get_fee(&self) -> Result<f64> {
        let fees: PoloniexFees = self.private("returnFeeInfo", &[]).await?;
        parse_number("takerFee", &fees.taker_fee)
    }

    async fn buy(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.submit_order(Side::Buy, amount, price).await
    }

    async fn sell(&self, amount: f64, price: f64) -> Result<OrderId> {
        self.submit_order(Side::Sell, amount, price).await
    }

    async fn check_order(&self, order: &OrderId) -> Result<bool> {
        let open: Vec<PoloniexOpenOrder> = self
            .private("returnOpenOrders", &[("currencyPair", self.pair.clone())])
            .await?;
        Ok(!open.iter().any(|o| o.order_number == order.as_str()))
    }

    async fn cancel_order(&self, order: &OrderId) -> Result<()> {
        let result: PoloniexCancel = self
            .private("cancelOrder", &[("orderNumber", order.to_string())])
            .await?;
        if result.success != 1 {
            error!("unable to cancel order {}", order);
        }
        Ok(())
    }

    async fn recent_trades(&self, since: Option<i64>) -> Result<Vec<Trade>> {
        let mut params = vec![
            ("command", "returnTradeHistory".to_string()),
            ("currencyPair", self.pair.clone()),
        ];
        if let Some(since) = since {
            params.push(("start", since.to_string()));
            params.push(("end", Utc::now().timestamp().to_string()));
        }

        let trades: Vec<PoloniexTrade> = self.public(&params).await?;
        to_trades(trades)
    }

    fn truncation_limit(&self) -> Option<usize> {
        Some(HISTORY_LIMIT)
    }
}
