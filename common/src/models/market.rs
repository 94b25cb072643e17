use serde::{Deserialize, Serialize};

/// Exchange-native trade identifier. Only comparable within one exchange.
pub type TradeId = u64;

/// A single public trade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub tid: TradeId,
    /// Unix timestamp in seconds
    pub date: i64,
    pub price: f64,
    pub amount: f64,
}

/// Best bid/ask for a pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
}

/// Balance of one asset or currency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioEntry {
    /// Uppercase asset/currency code
    pub name: String,
    pub amount: f64,
}

/// Opaque handle of a placed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    #[serde(rename = "buy")]
    Buy,
    #[serde(rename = "sell")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}
