use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Exchange API error: {0}")]
    ExchangeError(String),

    #[error("Parsing error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The exchange refused the request (order rejected, insufficient funds, ...).
    #[error("Rejected by exchange: {0}")]
    Rejected(String),

    #[error("EMPTY ORDER_ID")]
    EmptyOrderId,

    /// The exchange returned an ambiguous amount of history. Continuing would
    /// mean working on silently truncated data.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Unrecoverable error: {0}")]
    Fatal(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Whether the failure is expected to go away when the same call is made again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::HttpError(_) | Error::ExchangeError(_) | Error::ParseError(_)
        )
    }

    /// Whether the failure means the data we got can't be trusted and the
    /// calling workflow has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InsufficientData(_) | Error::Fatal(_))
    }
}
