use common::{models::TraderConfig, Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("API_HOST").unwrap_or(defaults.host);
        let port = std::env::var("API_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        Self { host, port }
    }
}

/// The trader this instance serves, from `TRADER_*` variables
pub fn trader_config_from_env() -> Result<TraderConfig> {
    trader_config(|name| std::env::var(name).ok())
}

fn trader_config(var: impl Fn(&str) -> Option<String>) -> Result<TraderConfig> {
    let required = |name: &str| {
        var(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::ConfigError(format!("{} environment variable not set", name)))
    };
    let flag = |name: &str| {
        var(name).map_or(false, |v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
    };

    let mut config = TraderConfig::new(
        &required("TRADER_EXCHANGE")?,
        &required("TRADER_CURRENCY")?.to_uppercase(),
        &required("TRADER_ASSET")?.to_uppercase(),
    );
    config.key = var("TRADER_KEY").unwrap_or_default();
    config.secret = var("TRADER_SECRET").unwrap_or_default();
    config.passphrase = var("TRADER_PASSPHRASE").filter(|p| !p.is_empty());
    config.sandbox = flag("TRADER_SANDBOX");
    config.post_only = flag("TRADER_POST_ONLY");
    config.trading_enabled = flag("TRADER_TRADING_ENABLED");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<TraderConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        trader_config(|name| vars.get(name).cloned())
    }

    #[test]
    fn reads_the_trader_from_variables() {
        let config = from_vars(&[
            ("TRADER_EXCHANGE", "gdax"),
            ("TRADER_CURRENCY", "usd"),
            ("TRADER_ASSET", "btc"),
            ("TRADER_KEY", "k"),
            ("TRADER_SECRET", "s"),
            ("TRADER_PASSPHRASE", "p"),
            ("TRADER_TRADING_ENABLED", "true"),
        ])
        .unwrap();

        assert_eq!(config.exchange, "gdax");
        assert_eq!(config.currency, "USD");
        assert_eq!(config.asset, "BTC");
        assert_eq!(config.passphrase.as_deref(), Some("p"));
        assert!(config.trading_enabled);
        assert!(!config.sandbox);
    }

    #[test]
    fn exchange_and_pair_are_required() {
        let err = from_vars(&[("TRADER_EXCHANGE", "gdax"), ("TRADER_CURRENCY", "USD")]).unwrap_err();
        assert!(matches!(err, Error::ConfigError(msg) if msg.contains("TRADER_ASSET")));
    }
}
