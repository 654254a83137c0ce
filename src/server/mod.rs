pub mod routes;

use crate::state::AppState;
use axum::routing::{delete, get, post};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/api/price", post(routes::price_option))
        .route("/api/implied-volatility", post(routes::implied_volatility))
        .route("/api/implied-volatility/tranche", post(routes::implied_volatility_tranche))
        .route("/api/chain/extended", post(routes::extended_chain))
        .route("/api/strategies/{name}", post(routes::evaluate_strategy))
        .route("/api/contracts", post(routes::register_contract).get(routes::list_contracts))
        .route("/api/contracts/{name}", delete(routes::remove_contract))
        .route("/api/contracts/{name}/purchase", post(routes::purchase_contract))
        .route("/api/contracts/{name}/expire", post(routes::expire_contract))
        .route("/api/receipts/{id}/exercise", post(routes::exercise_receipt))
        .route("/api/counters", get(routes::get_counters))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
