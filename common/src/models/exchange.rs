use serde::{Deserialize, Serialize};

/// A legal trading pair at an exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Market {
    /// The currency the asset is priced in (e.g. USD)
    pub currency: String,
    /// The asset being bought and sold (e.g. BTC)
    pub asset: String,
}

impl Market {
    pub fn new(currency: &str, asset: &str) -> Self {
        Self {
            currency: currency.to_string(),
            asset: asset.to_string(),
        }
    }
}

/// Static capability record for one exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeDescriptor {
    /// Lowercase unique identifier (e.g. "gdax")
    pub slug: String,
    /// Display name (e.g. "GDAX")
    pub name: String,
    pub currencies: Vec<String>,
    pub assets: Vec<String>,
    pub markets: Vec<Market>,
    /// Config fields that must be set before trading
    pub requires: Vec<String>,
    /// When set, monitoring this exchange is disabled with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_error: Option<String>,
    /// When set, trading at this exchange is disabled with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_error: Option<String>,
    pub provides_full_history: bool,
}

impl ExchangeDescriptor {
    pub fn has_market(&self, currency: &str, asset: &str) -> bool {
        self.markets
            .iter()
            .any(|m| m.currency == currency && m.asset == asset)
    }
}
