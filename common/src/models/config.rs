use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything needed to monitor or trade one pair at one exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraderConfig {
    /// Exchange slug, matched case-insensitively
    pub exchange: String,
    pub currency: String,
    pub asset: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub post_only: bool,
    /// Validate for trading instead of monitoring only
    #[serde(default)]
    pub trading_enabled: bool,
    /// Any other exchange specific settings
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TraderConfig {
    pub fn new(exchange: &str, currency: &str, asset: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            asset: asset.to_string(),
            ..Default::default()
        }
    }

    pub fn slug(&self) -> String {
        self.exchange.to_lowercase()
    }

    /// Whether the named setting is present and truthy.
    pub fn is_set(&self, field: &str) -> bool {
        match field {
            "exchange" => !self.exchange.is_empty(),
            "currency" => !self.currency.is_empty(),
            "asset" => !self.asset.is_empty(),
            "key" => !self.key.is_empty(),
            "secret" => !self.secret.is_empty(),
            "passphrase" => self.passphrase.as_deref().map_or(false, |p| !p.is_empty()),
            "sandbox" => self.sandbox,
            "post_only" => self.post_only,
            "trading_enabled" => self.trading_enabled,
            other => self.extra.get(other).map_or(false, truthy),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
