use std::sync::Arc;

use chrono::Utc;

use crate::events::publisher;
use crate::AppState;

const SWEEP_BATCH: i64 = 500;

/// Spawn a background task that settles finished dates nobody is polling.
pub fn spawn_sweep(state: Arc<AppState>) {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(state.config.sweep_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            match state.lifecycle.sweep_due_dates(Utc::now(), SWEEP_BATCH) {
                Ok((0, _)) => {}
                Ok((settled, effects)) => {
                    tracing::info!(settled, "date sweep completed");
                    publisher::dispatch(&state.rabbitmq, effects).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "date sweep failed");
                }
            }
        }
    });
}
