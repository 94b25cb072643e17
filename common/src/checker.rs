//! Decides whether a [`TraderConfig`] can be used for monitoring, trading or
//! importing history, before anything talks to an exchange.

use crate::models::{ExchangeDescriptor, TraderConfig};
use crate::registry::Registry;
use serde::Serialize;

/// What class of problem a [`Rejection`] describes
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    UnknownExchange,
    MonitorDisabled,
    UnsupportedCurrency,
    UnsupportedAsset,
    UnsupportedMarket,
    TradeDisabled,
    PlaceholderKey,
    PlaceholderSecret,
    MissingField,
    NoFullHistory,
}

/// Human readable reason a config is unusable
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl Rejection {
    fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Config validation against a [`Registry`]. `None` means "no problem".
#[derive(Debug, Clone, Copy)]
pub struct Checker<'a> {
    registry: &'a Registry,
}

impl Default for Checker<'static> {
    fn default() -> Self {
        Self::new(Registry::builtin())
    }
}

impl<'a> Checker<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Validate for trading when the config has trading enabled, for
    /// monitoring otherwise.
    pub fn not_valid(&self, config: &TraderConfig) -> Option<Rejection> {
        if config.trading_enabled {
            self.cant_trade(config)
        } else {
            self.cant_monitor(config)
        }
    }

    pub fn cant_monitor(&self, config: &TraderConfig) -> Option<Rejection> {
        let slug = config.slug();
        let exchange = match self.registry.find(&slug) {
            Some(exchange) => exchange,
            None => {
                return Some(Rejection::new(
                    RejectionKind::UnknownExchange,
                    format!("The exchange {} is not supported", slug),
                ))
            }
        };
        let name = &exchange.name;

        if let Some(reason) = &exchange.monitor_error {
            return Some(Rejection::new(
                RejectionKind::MonitorDisabled,
                format!(
                    "At this moment {} can't be monitored, find out more info here:\n\n{}",
                    name, reason
                ),
            ));
        }

        if !exchange.currencies.contains(&config.currency) {
            return Some(Rejection::new(
                RejectionKind::UnsupportedCurrency,
                format!(
                    "Only the currencies [ {} ] are supported at {} (not {})",
                    exchange.currencies.join(", "),
                    name,
                    config.currency
                ),
            ));
        }

        if !exchange.assets.contains(&config.asset) {
            return Some(Rejection::new(
                RejectionKind::UnsupportedAsset,
                format!(
                    "Only the assets [ {} ] are supported at {} (not {})",
                    exchange.assets.join(", "),
                    name,
                    config.asset
                ),
            ));
        }

        if !exchange.has_market(&config.currency, &config.asset) {
            return Some(Rejection::new(
                RejectionKind::UnsupportedMarket,
                format!("This currency/asset pair is not supported at {}", name),
            ));
        }

        None
    }

    pub fn cant_trade(&self, config: &TraderConfig) -> Option<Rejection> {
        if let Some(rejection) = self.cant_monitor(config) {
            return Some(rejection);
        }

        let exchange = self.settings(config)?;
        let name = &exchange.name;

        if let Some(reason) = &exchange.trade_error {
            return Some(Rejection::new(
                RejectionKind::TradeDisabled,
                format!(
                    "At this moment trading at {} is not possible, find out more info here:\n\n{}",
                    name, reason
                ),
            ));
        }

        if config.key == "your-key" {
            return Some(Rejection::new(
                RejectionKind::PlaceholderKey,
                "\"your-key\" is not a valid API key",
            ));
        }

        if config.secret == "your-secret" {
            return Some(Rejection::new(
                RejectionKind::PlaceholderSecret,
                "\"your-secret\" is not a valid API secret",
            ));
        }

        // every required field is checked, the last missing one is reported
        let mut missing = None;
        for field in &exchange.requires {
            if !config.is_set(field) {
                missing = Some(Rejection::new(
                    RejectionKind::MissingField,
                    format!("{} requires \"{}\" to be set in the config", name, field),
                ));
            }
        }

        missing
    }

    /// Whether the exchange can deliver history far enough back to import it
    pub fn cant_fetch_full_history(&self, config: &TraderConfig) -> Option<Rejection> {
        if let Some(rejection) = self.cant_monitor(config) {
            return Some(rejection);
        }

        let exchange = self.settings(config)?;
        if !exchange.provides_full_history {
            return Some(Rejection::new(
                RejectionKind::NoFullHistory,
                format!(
                    "The exchange {} does not provide full history (or importing it is not supported)",
                    exchange.name
                ),
            ));
        }

        None
    }

    pub fn settings(&self, config: &TraderConfig) -> Option<&'a ExchangeDescriptor> {
        self.registry.find(&config.slug())
    }
}
