use crate::StoreError;

/// Configuration for the InfluxDB store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// InfluxDB server URL
    pub url: String,
    /// InfluxDB authentication token
    pub token: String,
    /// InfluxDB organization
    pub org: String,
    /// InfluxDB bucket imported trades are written to
    pub bucket: String,
}

impl StoreConfig {
    /// Create a new store configuration from environment variables
    pub fn from_env() -> Result<Self, StoreError> {
        Ok(Self {
            url: required("INFLUXDB_URL")?,
            token: required("INFLUXDB_TOKEN")?,
            org: required("INFLUXDB_ORG")?,
            bucket: required("INFLUXDB_BUCKET")?,
        })
    }
}

fn required(name: &str) -> Result<String, StoreError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StoreError::ConfigError(format!("{} environment variable not set", name)))
}
