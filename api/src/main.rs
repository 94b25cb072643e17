mod config;
mod handler;
mod importer;
mod service;
#[cfg(test)]
mod testing;

use axum::{
    routing::{get, post},
    Router,
};
use common::{Checker, Registry};
use config::ApiConfig;
use connectors::{RetryPolicy, Trader};
use service::TraderService;
use std::net::SocketAddr;
use std::sync::Arc;
use store::{StoreConfig, TradeSink, TradeStore};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    info!("Starting tradebridge API");

    let api_config = ApiConfig::from_env();
    let trader_config = config::trader_config_from_env()?;
    let registry = Registry::builtin();

    if let Some(rejection) = Checker::new(registry).not_valid(&trader_config) {
        error!("Invalid trader config: {}", rejection);
        return Err(rejection.message.into());
    }

    let retry = RetryPolicy::from_env();
    let trader = Trader::from_config(&trader_config, registry, retry)?;
    let history = Trader::from_config(&trader_config, registry, retry)?;

    // imports are unavailable without a store, everything else still works
    let store: Option<Arc<dyn TradeSink>> = match StoreConfig::from_env() {
        Ok(store_config) => Some(Arc::new(TradeStore::new(store_config)?)),
        Err(e) => {
            warn!("Trade store disabled: {}", e);
            None
        }
    };

    let service = Arc::new(TraderService::new(
        registry,
        trader_config,
        retry,
        trader,
        history,
        store,
    ));

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/exchanges", get(handler::list_exchanges))
        .route("/api/v1/exchanges/:slug", get(handler::get_exchange))
        .route("/api/v1/check", post(handler::check_config))
        .route("/api/v1/portfolio", get(handler::get_portfolio))
        .route("/api/v1/ticker", get(handler::get_ticker))
        .route("/api/v1/fee", get(handler::get_fee))
        .route("/api/v1/trades", get(handler::get_trades))
        .route("/api/v1/orders", post(handler::place_order))
        .route(
            "/api/v1/orders/:id",
            get(handler::check_order).delete(handler::cancel_order),
        )
        .route("/api/v1/import", post(handler::start_import))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service);

    let addr: SocketAddr = format!("{}:{}", api_config.host, api_config.port).parse()?;
    info!("Listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
