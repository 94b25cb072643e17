use common::{Error, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::error;

/// Send a request and decode its JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(exchange: &str, request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(Error::HttpError)?;

    let status = response.status();
    let body = response.text().await.map_err(Error::HttpError)?;

    if !status.is_success() {
        error!("{} API error: {} - {}", exchange, status, body);
        return Err(status_error(exchange, status, &body));
    }

    parse_json(exchange, &body)
}

pub(crate) fn parse_json<T: DeserializeOwned>(exchange: &str, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::ParseError(format!("Failed to parse {} response: {}", exchange, e)))
}

/// Client errors other than rate limits won't go away by asking again.
fn status_error(exchange: &str, status: StatusCode, body: &str) -> Error {
    let transient = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT;

    if transient {
        Error::ExchangeError(format!("{} API error: {} - {}", exchange, status, body))
    } else {
        Error::Rejected(error_message(body).unwrap_or_else(|| format!("{} - {}", status, body)))
    }
}

/// The human readable message exchanges put in their error bodies
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| value.get(field).and_then(|m| m.as_str()))
        .map(str::to_string)
}
