//! Static table of the exchanges we know how to talk to.
//!
//! The table never touches the network. It is the only source of truth for
//! what can be monitored or traded where.

use crate::models::{ExchangeDescriptor, Market};
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Registry {
    exchanges: Vec<ExchangeDescriptor>,
}

impl Registry {
    pub fn new(exchanges: Vec<ExchangeDescriptor>) -> Self {
        Self { exchanges }
    }

    /// The process wide table of built in exchanges
    pub fn builtin() -> &'static Registry {
        static BUILTIN: OnceLock<Registry> = OnceLock::new();
        BUILTIN.get_or_init(|| Registry::new(vec![gdax(), bitfinex(), poloniex()]))
    }

    /// Look up an exchange by slug, ignoring case
    pub fn find(&self, slug: &str) -> Option<&ExchangeDescriptor> {
        self.exchanges
            .iter()
            .find(|e| e.slug.eq_ignore_ascii_case(slug))
    }

    pub fn all(&self) -> impl Iterator<Item = &ExchangeDescriptor> {
        self.exchanges.iter()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn markets(pairs: &[(&str, &str)]) -> Vec<Market> {
    pairs.iter().map(|(c, a)| Market::new(c, a)).collect()
}

fn gdax() -> ExchangeDescriptor {
    ExchangeDescriptor {
        slug: "gdax".to_string(),
        name: "GDAX".to_string(),
        currencies: strings(&["USD", "EUR", "GBP", "BTC"]),
        assets: strings(&["BTC", "LTC", "ETH"]),
        markets: markets(&[
            ("USD", "BTC"),
            ("USD", "LTC"),
            ("USD", "ETH"),
            ("EUR", "BTC"),
            ("EUR", "LTC"),
            ("EUR", "ETH"),
            ("GBP", "BTC"),
            ("BTC", "LTC"),
            ("BTC", "ETH"),
        ]),
        requires: strings(&["key", "secret", "passphrase"]),
        monitor_error: None,
        trade_error: None,
        provides_full_history: true,
    }
}

fn bitfinex() -> ExchangeDescriptor {
    ExchangeDescriptor {
        slug: "bitfinex".to_string(),
        name: "Bitfinex".to_string(),
        currencies: strings(&["USD", "BTC"]),
        assets: strings(&["BTC", "LTC", "ETH", "ETC", "XMR", "ZEC", "DSH", "XRP", "EOS"]),
        markets: markets(&[
            ("USD", "BTC"),
            ("USD", "LTC"),
            ("USD", "ETH"),
            ("USD", "ETC"),
            ("USD", "XMR"),
            ("USD", "ZEC"),
            ("USD", "DSH"),
            ("USD", "XRP"),
            ("USD", "EOS"),
            ("BTC", "LTC"),
            ("BTC", "ETH"),
            ("BTC", "ETC"),
            ("BTC", "XMR"),
            ("BTC", "ZEC"),
            ("BTC", "DSH"),
            ("BTC", "XRP"),
            ("BTC", "EOS"),
        ]),
        requires: strings(&["key", "secret"]),
        monitor_error: None,
        trade_error: None,
        provides_full_history: false,
    }
}

fn poloniex() -> ExchangeDescriptor {
    ExchangeDescriptor {
        slug: "poloniex".to_string(),
        name: "Poloniex".to_string(),
        currencies: strings(&["BTC", "USDT", "ETH", "XMR"]),
        assets: strings(&[
            "BTC", "ETH", "LTC", "XMR", "XRP", "DASH", "ETC", "ZEC", "STR", "DOGE", "BTS",
        ]),
        markets: markets(&[
            ("USDT", "BTC"),
            ("USDT", "ETH"),
            ("USDT", "LTC"),
            ("USDT", "XMR"),
            ("USDT", "XRP"),
            ("USDT", "DASH"),
            ("USDT", "ETC"),
            ("USDT", "ZEC"),
            ("USDT", "STR"),
            ("BTC", "ETH"),
            ("BTC", "LTC"),
            ("BTC", "XMR"),
            ("BTC", "XRP"),
            ("BTC", "DASH"),
            ("BTC", "ETC"),
            ("BTC", "ZEC"),
            ("BTC", "STR"),
            ("BTC", "DOGE"),
            ("BTC", "BTS"),
            ("ETH", "ETC"),
            ("ETH", "ZEC"),
            ("XMR", "LTC"),
            ("XMR", "DASH"),
            ("XMR", "ZEC"),
        ]),
        requires: strings(&["key", "secret"]),
        monitor_error: None,
        trade_error: None,
        provides_full_history: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_ignores_case() {
        let registry = Registry::builtin();
        assert_eq!(registry.find("GDAX").map(|e| e.name.as_str()), Some("GDAX"));
        assert_eq!(registry.find("Poloniex").map(|e| e.slug.as_str()), Some("poloniex"));
        assert!(registry.find("mtgox").is_none());
    }

    #[test]
    fn builtin_markets_are_consistent() {
        for exchange in Registry::builtin().all() {
            assert_eq!(exchange.slug, exchange.slug.to_lowercase());
            for market in &exchange.markets {
                assert!(
                    exchange.currencies.contains(&market.currency),
                    "{} lists market currency {} it does not support",
                    exchange.slug,
                    market.currency
                );
                assert!(
                    exchange.assets.contains(&market.asset),
                    "{} lists market asset {} it does not support",
                    exchange.slug,
                    market.asset
                );
            }
        }
    }
}
