use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;
use serde::de::DeserializeOwned;
use serde::Serialize;

use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::events::publisher;
use crate::AppState;

fn decode<T: DeserializeOwned + Serialize>(data: &[u8]) -> Result<Event<T>, serde_json::Error> {
    serde_json::from_slice::<Event<T>>(data)
}

/// Keeps the local match registry in sync with the matching service.
pub async fn listen_match_events(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state
        .rabbitmq
        .subscribe(
            "amora-lifecycle.matching.match",
            &[routing_keys::MATCHING_MATCH_CREATED, routing_keys::MATCHING_MATCH_REMOVED],
        )
        .await?;

    tracing::info!("listening for matching.match events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match delivery.routing_key.as_str() {
                    routing_keys::MATCHING_MATCH_CREATED => {
                        match decode::<payloads::MatchCreated>(&delivery.data) {
                            Ok(event) => {
                                tracing::info!(match_id = %event.data.match_id, "received match.created event");
                                if let Err(e) = state.lifecycle.register_match(&event.data) {
                                    tracing::error!(error = %e, match_id = %event.data.match_id, "failed to register match");
                                }
                            }
                            Err(e) => tracing::error!(error = %e, "failed to deserialize match.created event"),
                        }
                    }
                    routing_keys::MATCHING_MATCH_REMOVED => {
                        match decode::<payloads::MatchRemoved>(&delivery.data) {
                            Ok(event) => {
                                tracing::info!(match_id = %event.data.match_id, "received match.removed event");
                                match state.lifecycle.remove_match(event.data.match_id) {
                                    Ok(effects) => publisher::dispatch(&state.rabbitmq, effects).await,
                                    Err(e) => tracing::error!(error = %e, match_id = %event.data.match_id, "failed to remove match"),
                                }
                            }
                            Err(e) => tracing::error!(error = %e, "failed to deserialize match.removed event"),
                        }
                    }
                    other => tracing::warn!(routing_key = %other, "unexpected routing key"),
                }
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
            }
        }
    }

    Ok(())
}

/// Blocks make the match invisible to both sides.
pub async fn listen_block_created(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state
        .rabbitmq
        .subscribe("amora-lifecycle.user.block.created", &[routing_keys::USER_BLOCK_CREATED])
        .await?;

    tracing::info!("listening for user.block.created events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match decode::<payloads::BlockCreated>(&delivery.data) {
                    Ok(event) => {
                        tracing::info!(
                            blocker_id = %event.data.blocker_id,
                            blocked_id = %event.data.blocked_id,
                            "received block.created event"
                        );
                        if let Err(e) = state.lifecycle.register_block(&event.data) {
                            tracing::error!(error = %e, "failed to record block");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to deserialize block.created event"),
                }
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
            }
        }
    }

    Ok(())
}
