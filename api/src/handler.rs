use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use common::{
    models::{ExchangeDescriptor, OrderId, PortfolioEntry, Side, Ticker, Trade, TraderConfig},
    Error as CommonError, RejectionKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::service::{CheckMode, TraderService};

pub type SharedService = Arc<TraderService>;

pub struct ApiError(CommonError);

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        ApiError(err)
    }
}

fn status_of(err: &CommonError) -> StatusCode {
    match err {
        CommonError::NotFound(_) => StatusCode::NOT_FOUND,
        CommonError::ConfigError(_) | CommonError::EmptyOrderId => StatusCode::BAD_REQUEST,
        CommonError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommonError::HttpError(_)
        | CommonError::ExchangeError(_)
        | CommonError::ParseError(_)
        | CommonError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
        CommonError::DbError(_)
        | CommonError::InsufficientData(_)
        | CommonError::Fatal(_)
        | CommonError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let status = status_of(&self.0);
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

pub async fn list_exchanges(State(service): State<SharedService>) -> Json<Vec<ExchangeDescriptor>> {
    Json(service.list_exchanges())
}

pub async fn get_exchange(
    State(service): State<SharedService>,
    Path(slug): Path<String>,
) -> Result<Json<ExchangeDescriptor>, ApiError> {
    Ok(Json(service.get_exchange(&slug)?))
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub mode: Option<CheckMode>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CheckResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RejectionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub async fn check_config(
    State(service): State<SharedService>,
    Query(params): Query<CheckParams>,
    Json(config): Json<TraderConfig>,
) -> Json<CheckResponse> {
    let rejection = service.check(&config, params.mode);
    Json(CheckResponse {
        valid: rejection.is_none(),
        kind: rejection.as_ref().map(|r| r.kind),
        reason: rejection.map(|r| r.message),
    })
}

pub async fn get_portfolio(
    State(service): State<SharedService>,
) -> Result<Json<Vec<PortfolioEntry>>, ApiError> {
    Ok(Json(service.get_portfolio().await?))
}

pub async fn get_ticker(State(service): State<SharedService>) -> Result<Json<Ticker>, ApiError> {
    Ok(Json(service.get_ticker().await?))
}

#[derive(Debug, Serialize)]
pub struct FeeResponse {
    pub fee: f64,
}

pub async fn get_fee(State(service): State<SharedService>) -> Result<Json<FeeResponse>, ApiError> {
    let fee = service.get_fee().await?;
    Ok(Json(FeeResponse { fee }))
}

#[derive(Debug, Deserialize)]
pub struct TradesParams {
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub descending: bool,
}

pub async fn get_trades(
    State(service): State<SharedService>,
    Query(params): Query<TradesParams>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let trades = service.get_trades(params.since, params.descending).await?;
    Ok(Json(trades))
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    pub amount: f64,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

pub async fn place_order(
    State(service): State<SharedService>,
    Json(order): Json<OrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    if !(order.amount > 0.0 && order.price > 0.0) {
        return Err(CommonError::ConfigError("amount and price must be positive".to_string()).into());
    }

    let id = service
        .place_order(order.side, order.amount, order.price)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse { id, done: None })))
}

pub async fn check_order(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = OrderId::new(id);
    let done = service.check_order(&id).await?;
    Ok(Json(OrderResponse { id, done: Some(done) }))
}

pub async fn cancel_order(State(service): State<SharedService>, Path(id): Path<String>) -> StatusCode {
    service.cancel_order(&OrderId::new(id)).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    pub since: DateTime<Utc>,
}

pub async fn start_import(
    State(service): State<SharedService>,
    Query(params): Query<ImportParams>,
) -> Result<StatusCode, ApiError> {
    service.start_import(params.since)?;
    Ok(StatusCode::ACCEPTED)
}
