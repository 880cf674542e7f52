pub mod config;
pub mod conversation;
pub mod date_plan;
pub mod drink_perk;
pub mod engine;
pub mod events;
pub mod geo;
pub mod jobs;
pub mod ledger;
pub mod location;
pub mod matches;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;
pub mod transcript;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::clients::redis::RedisClient;

pub struct AppState {
    pub lifecycle: engine::Lifecycle,
    pub config: config::AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub redis: RedisClient,
    pub locations: location::LocationCache,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/matches/:id", delete(routes::conversations::unmatch))
        .route("/matches/:id/open", post(routes::conversations::open_conversation))
        .route("/matches/:id/messages", post(routes::conversations::send_message))
        .route("/matches/:id/chat/start", post(routes::conversations::start_chat))
        .route("/matches/:id/end", post(routes::conversations::end_conversation))
        .route("/matches/:id/archive", post(routes::conversations::archive_thread))
        .route("/matches/:id/date", get(routes::dates::get_date).post(routes::dates::propose_date))
        .route("/matches/:id/date/respond", post(routes::dates::respond_to_date))
        .route("/matches/:id/date/cancel", post(routes::dates::cancel_date))
        .route("/matches/:id/perk", get(routes::perks::get_perk))
        .route("/wallet", get(routes::wallet::get_wallet))
        .route("/location", post(routes::location::report_location))
        // Service-to-service endpoints (service token)
        .route("/internal/matches/:id/perk/redeem", post(routes::perks::redeem_perk))
        .route("/internal/wallets/:user_id/credit", post(routes::wallet::credit_wallet))
        .layer(axum::middleware::from_fn(amora_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
