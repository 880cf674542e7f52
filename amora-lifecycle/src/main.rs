use std::sync::Arc;

use amora_lifecycle::config::AppConfig;
use amora_lifecycle::engine::Lifecycle;
use amora_lifecycle::location::LocationCache;
use amora_lifecycle::store::pg::PgStore;
use amora_lifecycle::{events, jobs, router, AppState};
use amora_shared::clients::db::create_pool;
use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    amora_shared::middleware::init_tracing("amora-lifecycle");

    let config = AppConfig::load()?;
    let port = config.port;

    // The shared auth extractor reads the secret from the environment.
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let db = create_pool(&config.database_url, config.db_pool_size)?;
    let lifecycle = Lifecycle::new(Arc::new(PgStore::new(db)), config.policy.clone());

    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;
    let locations = LocationCache::new(redis.clone(), config.location_ttl_secs);
    let metrics_handle = amora_shared::middleware::init_metrics()?;

    let state = Arc::new(AppState { lifecycle, config, rabbitmq, redis, locations, metrics_handle });

    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_match_events(sub_state).await {
            tracing::error!(error = %e, "matching.match subscriber failed");
        }
    });

    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_block_created(sub_state).await {
            tracing::error!(error = %e, "user.block.created subscriber failed");
        }
    });

    jobs::spawn_sweep(state.clone());

    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "amora-lifecycle starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
